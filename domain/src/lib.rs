//! Domain library for the shopping list service.
//!
//! This crate is dependency-free (inherits workspace metadata only) and holds
//! the domain types, ports (traits), and error definitions. Keep adapters and
//! IO concerns out of this crate.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::SystemTime;

/// Identifier of a stored document: a shopping list, a product or a site.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        validate::validate_document_id(&val)?;
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A shopping list. Products live underneath it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShoppingList {
    pub id: DocumentId,
    pub registered_at: SystemTime,
}

/// Stored product entry of a shopping list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Product {
    pub id: DocumentId,
    pub name: String,
    /// Name of the site where the product should be bought.
    pub site: Option<String>,
    pub quantity: Option<u32>,
    pub purchased: bool,
}

/// Product as submitted by a client. A present `id` means an edit of an
/// existing entry; `None` creates a new one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductInput {
    pub id: Option<DocumentId>,
    pub name: String,
    pub site: Option<String>,
    pub quantity: Option<u32>,
    pub purchased: bool,
}

/// Validated payload for inserting a product; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub site: Option<String>,
    pub quantity: Option<u32>,
    pub purchased: bool,
}

impl NewProduct {
    /// Attach the id assigned by the store.
    pub fn with_id(self, id: DocumentId) -> Product {
        Product {
            id,
            name: self.name,
            site: self.site,
            quantity: self.quantity,
            purchased: self.purchased,
        }
    }
}

/// A place where products are bought (market, store, ...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Site {
    pub id: DocumentId,
    pub name: String,
}

/// Input data for registering a new site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewSite {
    pub name: String,
}

/// Time source abstraction to make code testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Repository port for shopping lists and their products.
pub trait ShoppingListRepository: Send + Sync {
    /// The list with the most recent `registered_at`, if any.
    fn latest_list(&self) -> Result<Option<ShoppingList>, CoreError>;
    /// Lists ordered by `registered_at` descending.
    fn recent_lists(&self, limit: usize) -> Result<Vec<ShoppingList>, CoreError>;
    fn get_list(&self, id: &DocumentId) -> Result<Option<ShoppingList>, CoreError>;
    /// Create a list document. Fails with `AlreadyExists` if the id is taken.
    fn create_list(&self, list: ShoppingList) -> Result<(), CoreError>;
    fn list_products(&self, list_id: &DocumentId) -> Result<Vec<Product>, CoreError>;
    fn get_product(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
    ) -> Result<Option<Product>, CoreError>;
    /// Insert a product under the list; the store generates the id and also
    /// persists it inside the document.
    fn insert_product(
        &self,
        list_id: &DocumentId,
        product: NewProduct,
    ) -> Result<Product, CoreError>;
    /// Overwrite an existing product. `NotFound` if it does not exist.
    fn update_product(&self, list_id: &DocumentId, product: &Product) -> Result<(), CoreError>;
    /// Set only the purchased flag. `NotFound` if the product does not exist.
    fn set_purchased(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
        purchased: bool,
    ) -> Result<(), CoreError>;
    /// Remove a product. `NotFound` if it does not exist.
    fn delete_product(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
    ) -> Result<(), CoreError>;
}

/// Repository port for purchase sites.
pub trait SiteRepository: Send + Sync {
    fn insert_site(&self, site: NewSite) -> Result<Site, CoreError>;
    fn list_sites(&self) -> Result<Vec<Site>, CoreError>;
}

/// Core domain errors (no external error crates to keep deps at zero).
#[derive(Debug)]
pub enum CoreError {
    InvalidId(String),
    InvalidName(String),
    InvalidQuantity,
    NotFound,
    AlreadyExists,
    /// Purchased products are kept as a record and cannot be deleted.
    ProductPurchased,
    Repository(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidId(msg) => write!(f, "invalid id: {}", msg),
            CoreError::InvalidName(msg) => write!(f, "invalid name: {}", msg),
            CoreError::InvalidQuantity => write!(f, "quantity must be at least 1"),
            CoreError::NotFound => write!(f, "not found"),
            CoreError::AlreadyExists => write!(f, "resource already exists"),
            CoreError::ProductPurchased => write!(f, "product already purchased"),
            CoreError::Repository(msg) => write!(f, "repository error: {}", msg),
        }
    }
}

impl Error for CoreError {}

pub mod adapters;
pub mod base62;
pub mod id;
pub mod service;
pub mod validate;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_accepts_simple_values() {
        let id = DocumentId::new("primeralista").expect("valid id");
        assert_eq!(id.as_str(), "primeralista");
        assert_eq!(id.to_string(), "primeralista");
    }

    #[test]
    fn document_id_rejects_empty_and_slash() {
        assert!(matches!(DocumentId::new(""), Err(CoreError::InvalidId(_))));
        assert!(matches!(DocumentId::new("a/b"), Err(CoreError::InvalidId(_))));
    }

    #[test]
    fn new_product_with_id_keeps_fields() {
        let p = NewProduct {
            name: "Milk".into(),
            site: Some("Market".into()),
            quantity: Some(2),
            purchased: false,
        }
        .with_id(DocumentId::new("p1").unwrap());
        assert_eq!(p.id.as_str(), "p1");
        assert_eq!(p.name, "Milk");
        assert_eq!(p.site.as_deref(), Some("Market"));
        assert_eq!(p.quantity, Some(2));
        assert!(!p.purchased);
    }
}
