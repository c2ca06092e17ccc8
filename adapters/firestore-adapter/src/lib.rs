//! Firestore adapter implementing the shopping list ports over the REST API.
//!
//! - Lists live in the `listacompras` collection; each list holds its
//!   products in the `elementoslista` subcollection. Sites live in `sitios`.
//! - New products and sites get server-assigned ids; the id is then written
//!   back into the document's `id` field.
//! - Provides `from_env()` wiring using `FIRESTORE_PROJECT_ID`,
//!   `FIRESTORE_DATABASE`, `FIRESTORE_EMULATOR_HOST` and
//!   `FIRESTORE_ACCESS_TOKEN`.
//!
//! Notes:
//! - The domain ports are synchronous. We bridge to async `reqwest` using an
//!   owned `tokio::runtime::Runtime`, or `block_in_place` on the current one.

pub mod document;

use std::sync::Arc;

use domain::{
    CoreError, DocumentId, NewProduct, NewSite, Product, ShoppingList, ShoppingListRepository,
    Site, SiteRepository,
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::document::{
    Document, Fields, ListDocumentsPage, RunQueryItem, PRODUCT_FIELDS,
};

const PUBLIC_ENDPOINT: &str = "https://firestore.googleapis.com";
const PAGE_SIZE: &str = "300";

/// Collection names used by the adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirestoreCollections {
    pub lists: String,
    pub products: String,
    pub sites: String,
}

impl Default for FirestoreCollections {
    fn default() -> Self {
        Self {
            lists: "listacompras".into(),
            products: "elementoslista".into(),
            sites: "sitios".into(),
        }
    }
}

/// Connection settings for a Firestore database.
#[derive(Clone, Debug)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    /// `host:port` of a local emulator; plain HTTP and no auth when set.
    pub emulator_host: Option<String>,
    /// OAuth2 bearer token sent with every request.
    pub access_token: Option<String>,
    pub collections: FirestoreCollections,
}

impl FirestoreConfig {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database: "(default)".into(),
            emulator_host: None,
            access_token: None,
            collections: FirestoreCollections::default(),
        }
    }

    /// Build from environment variables.
    pub fn from_env() -> Result<Self, CoreError> {
        let project_id = std::env::var("FIRESTORE_PROJECT_ID")
            .map_err(|_| CoreError::Repository("missing FIRESTORE_PROJECT_ID".into()))?;
        let non_empty = |k: &str| std::env::var(k).ok().filter(|s| !s.is_empty());
        Ok(Self {
            project_id,
            database: non_empty("FIRESTORE_DATABASE").unwrap_or_else(|| "(default)".into()),
            emulator_host: non_empty("FIRESTORE_EMULATOR_HOST"),
            access_token: non_empty("FIRESTORE_ACCESS_TOKEN"),
            collections: FirestoreCollections {
                lists: non_empty("FIRESTORE_COLLECTION_LISTS")
                    .unwrap_or_else(|| "listacompras".into()),
                products: non_empty("FIRESTORE_COLLECTION_PRODUCTS")
                    .unwrap_or_else(|| "elementoslista".into()),
                sites: non_empty("FIRESTORE_COLLECTION_SITES").unwrap_or_else(|| "sitios".into()),
            },
        })
    }

    /// Root URL of the database's document tree.
    pub fn documents_root(&self) -> String {
        let origin = match &self.emulator_host {
            Some(host) => format!("http://{}", host.trim_end_matches('/')),
            None => PUBLIC_ENDPOINT.to_string(),
        };
        format!(
            "{}/v1/projects/{}/databases/{}/documents",
            origin,
            urlencoding::encode(&self.project_id),
            urlencoding::encode(&self.database),
        )
    }
}

/// Adapter-internal errors before they are folded into `CoreError`.
#[derive(Debug, thiserror::Error)]
pub enum FirestoreError {
    #[error("http transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("firestore returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Malformed(String),
    #[error("tokio runtime init: {0}")]
    Runtime(#[from] std::io::Error),
}

impl From<FirestoreError> for CoreError {
    fn from(e: FirestoreError) -> Self {
        match e {
            FirestoreError::Status { status: 404, .. } => CoreError::NotFound,
            FirestoreError::Status { status: 409, .. } => CoreError::AlreadyExists,
            other => CoreError::Repository(other.to_string()),
        }
    }
}

/// Join already-validated path segments, percent-encoding each one.
fn doc_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| urlencoding::encode(s).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Repository backed by Firestore.
///
/// Supports both standalone mode (creates its own Tokio runtime) and server
/// mode (reuses the existing runtime via `Handle::current()`).
#[derive(Clone)]
pub struct FirestoreRepo {
    root: String,
    collections: FirestoreCollections,
    access_token: Option<String>,
    client: reqwest::Client,
    // None when running inside an existing runtime
    rt: Option<Arc<tokio::runtime::Runtime>>,
}

impl FirestoreRepo {
    pub fn new(config: FirestoreConfig) -> Result<Self, CoreError> {
        let rt = Self::maybe_create_runtime()?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CoreError::from(FirestoreError::from(e)))?;
        let access_token = if config.emulator_host.is_some() {
            None
        } else {
            config.access_token.clone()
        };
        Ok(Self {
            root: config.documents_root(),
            collections: config.collections,
            access_token,
            client,
            rt,
        })
    }

    pub fn from_env() -> Result<Self, CoreError> {
        Self::new(FirestoreConfig::from_env()?)
    }

    fn maybe_create_runtime() -> Result<Option<Arc<tokio::runtime::Runtime>>, CoreError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            Ok(None)
        } else {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .map_err(|e| CoreError::from(FirestoreError::from(e)))?;
            Ok(Some(Arc::new(rt)))
        }
    }

    /// Run an async future, using either our owned runtime or the current runtime.
    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        match &self.rt {
            Some(rt) => rt.block_on(fut),
            None => tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.root, path)
    }

    fn list_path(&self, list_id: &DocumentId) -> String {
        doc_path(&[self.collections.lists.as_str(), list_id.as_str()])
    }

    fn products_path(&self, list_id: &DocumentId) -> String {
        doc_path(&[
            self.collections.lists.as_str(),
            list_id.as_str(),
            self.collections.products.as_str(),
        ])
    }

    fn product_path(&self, list_id: &DocumentId, product_id: &DocumentId) -> String {
        doc_path(&[
            self.collections.lists.as_str(),
            list_id.as_str(),
            self.collections.products.as_str(),
            product_id.as_str(),
        ])
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, FirestoreError> {
        let resp = self.authed(req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FirestoreError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(resp.json::<T>().await?)
    }

    async fn get_document(&self, path: &str) -> Result<Option<Document>, FirestoreError> {
        debug!(%path, "firestore get");
        match self.send(self.client.get(self.url(path))).await {
            Ok(doc) => Ok(Some(doc)),
            Err(FirestoreError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create a document in a collection. Without `doc_id` the server picks one.
    async fn create_document(
        &self,
        collection_path: &str,
        doc_id: Option<&str>,
        fields: Fields,
    ) -> Result<Document, FirestoreError> {
        debug!(%collection_path, ?doc_id, "firestore create");
        let mut req = self
            .client
            .post(self.url(collection_path))
            .json(&Document::from_fields(fields));
        if let Some(id) = doc_id {
            req = req.query(&[("documentId", id)]);
        }
        self.send(req).await
    }

    /// Patch only the masked fields of an existing document.
    async fn update_fields(
        &self,
        path: &str,
        fields: Fields,
        mask: &[&str],
    ) -> Result<(), FirestoreError> {
        debug!(%path, ?mask, "firestore update");
        let mut query: Vec<(&str, &str)> = mask.iter().map(|f| ("updateMask.fieldPaths", *f)).collect();
        query.push(("currentDocument.exists", "true"));
        let req = self
            .client
            .patch(self.url(path))
            .query(&query)
            .json(&Document::from_fields(fields));
        self.send::<Document>(req).await.map(|_| ())
    }

    async fn delete_document(&self, path: &str) -> Result<(), FirestoreError> {
        debug!(%path, "firestore delete");
        let req = self
            .client
            .delete(self.url(path))
            .query(&[("currentDocument.exists", "true")]);
        self.send::<serde_json::Value>(req).await.map(|_| ())
    }

    /// Read every document of a collection, following page tokens.
    async fn list_documents(&self, collection_path: &str) -> Result<Vec<Document>, FirestoreError> {
        let mut out = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(t) = &token {
                query.push(("pageToken", t.clone()));
            }
            let page: ListDocumentsPage = self
                .send(self.client.get(self.url(collection_path)).query(&query))
                .await?;
            out.extend(page.documents);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(t) => token = Some(t),
                None => break,
            }
        }
        debug!(%collection_path, count = out.len(), "firestore list");
        Ok(out)
    }

    async fn newest_lists(&self, limit: usize) -> Result<Vec<Document>, FirestoreError> {
        let body = document::newest_lists_query(self.collections.lists.as_str(), limit);
        let url = format!("{}:runQuery", self.root);
        let items: Vec<RunQueryItem> = self.send(self.client.post(url).json(&body)).await?;
        Ok(items.into_iter().filter_map(|i| i.document).collect())
    }

    /// Insert with a server-assigned id, then stamp the id into the document.
    async fn insert_with_id(
        &self,
        collection_path: &str,
        fields: Fields,
    ) -> Result<String, FirestoreError> {
        let created = self.create_document(collection_path, None, fields).await?;
        let id = created
            .name_id()
            .map(str::to_string)
            .ok_or_else(|| FirestoreError::Malformed("created document has no name".into()))?;
        let path = format!("{}/{}", collection_path, urlencoding::encode(&id));
        self.update_fields(&path, document::id_fields(&id), &[document::FIELD_ID])
            .await?;
        Ok(id)
    }
}

fn logged<T>(op: &'static str, res: Result<T, FirestoreError>) -> Result<T, CoreError> {
    res.map_err(|e| {
        if !matches!(e, FirestoreError::Status { status: 404 | 409, .. }) {
            warn!(op, err = %e, "firestore request failed");
        }
        CoreError::from(e)
    })
}

fn new_id(raw: String) -> Result<DocumentId, CoreError> {
    DocumentId::new(raw).map_err(|e| CoreError::Repository(format!("server id rejected: {e}")))
}

impl ShoppingListRepository for FirestoreRepo {
    fn latest_list(&self) -> Result<Option<ShoppingList>, CoreError> {
        Ok(self.recent_lists(1)?.into_iter().next())
    }

    fn recent_lists(&self, limit: usize) -> Result<Vec<ShoppingList>, CoreError> {
        let docs = logged("recent_lists", self.block_on(self.newest_lists(limit)))?;
        docs.iter().map(document::document_to_list).collect()
    }

    fn get_list(&self, id: &DocumentId) -> Result<Option<ShoppingList>, CoreError> {
        let path = self.list_path(id);
        let doc = logged("get_list", self.block_on(self.get_document(&path)))?;
        match doc {
            // A list document without a timestamp still counts as existing.
            Some(d) => Ok(Some(document::document_to_list(&d).unwrap_or(ShoppingList {
                id: id.clone(),
                registered_at: std::time::UNIX_EPOCH,
            }))),
            None => Ok(None),
        }
    }

    fn create_list(&self, list: ShoppingList) -> Result<(), CoreError> {
        let collection = doc_path(&[self.collections.lists.as_str()]);
        let fields = document::list_to_fields(&list);
        logged(
            "create_list",
            self.block_on(self.create_document(&collection, Some(list.id.as_str()), fields)),
        )?;
        debug!(list_id = %list.id, "list created");
        Ok(())
    }

    fn list_products(&self, list_id: &DocumentId) -> Result<Vec<Product>, CoreError> {
        let path = self.products_path(list_id);
        let docs = logged("list_products", self.block_on(self.list_documents(&path)))?;
        docs.iter().map(document::document_to_product).collect()
    }

    fn get_product(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
    ) -> Result<Option<Product>, CoreError> {
        let path = self.product_path(list_id, product_id);
        let doc = logged("get_product", self.block_on(self.get_document(&path)))?;
        doc.as_ref().map(document::document_to_product).transpose()
    }

    fn insert_product(
        &self,
        list_id: &DocumentId,
        product: NewProduct,
    ) -> Result<Product, CoreError> {
        let path = self.products_path(list_id);
        let fields = document::new_product_to_fields(&product);
        let id = logged("insert_product", self.block_on(self.insert_with_id(&path, fields)))?;
        Ok(product.with_id(new_id(id)?))
    }

    fn update_product(&self, list_id: &DocumentId, product: &Product) -> Result<(), CoreError> {
        let path = self.product_path(list_id, &product.id);
        let fields = document::product_to_fields(product);
        logged(
            "update_product",
            self.block_on(self.update_fields(&path, fields, &PRODUCT_FIELDS)),
        )
    }

    fn set_purchased(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
        purchased: bool,
    ) -> Result<(), CoreError> {
        let path = self.product_path(list_id, product_id);
        let mut fields = Fields::new();
        fields.insert(
            document::FIELD_PURCHASED.into(),
            document::bool_value(purchased),
        );
        logged(
            "set_purchased",
            self.block_on(self.update_fields(&path, fields, &[document::FIELD_PURCHASED])),
        )
    }

    fn delete_product(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
    ) -> Result<(), CoreError> {
        let path = self.product_path(list_id, product_id);
        logged("delete_product", self.block_on(self.delete_document(&path)))
    }
}

impl SiteRepository for FirestoreRepo {
    fn insert_site(&self, site: NewSite) -> Result<Site, CoreError> {
        let path = doc_path(&[self.collections.sites.as_str()]);
        let fields = document::new_site_to_fields(&site);
        let id = logged("insert_site", self.block_on(self.insert_with_id(&path, fields)))?;
        Ok(Site {
            id: new_id(id)?,
            name: site.name,
        })
    }

    fn list_sites(&self) -> Result<Vec<Site>, CoreError> {
        let path = doc_path(&[self.collections.sites.as_str()]);
        let docs = logged("list_sites", self.block_on(self.list_documents(&path)))?;
        docs.iter().map(document::document_to_site).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_root_public_and_emulator() {
        let mut cfg = FirestoreConfig::new("my-proj");
        assert_eq!(
            cfg.documents_root(),
            "https://firestore.googleapis.com/v1/projects/my-proj/databases/%28default%29/documents"
        );
        cfg.emulator_host = Some("localhost:8080/".into());
        assert_eq!(
            cfg.documents_root(),
            "http://localhost:8080/v1/projects/my-proj/databases/%28default%29/documents"
        );
    }

    #[test]
    fn paths_encode_segments() {
        let repo = FirestoreRepo::new(FirestoreConfig::new("p")).unwrap();
        let list = DocumentId::new("mi lista").unwrap();
        let product = DocumentId::new("a?b").unwrap();
        assert_eq!(repo.list_path(&list), "listacompras/mi%20lista");
        assert_eq!(
            repo.product_path(&list, &product),
            "listacompras/mi%20lista/elementoslista/a%3Fb"
        );
    }

    #[test]
    fn emulator_drops_access_token() {
        let mut cfg = FirestoreConfig::new("p");
        cfg.access_token = Some("secret".into());
        cfg.emulator_host = Some("localhost:8080".into());
        let repo = FirestoreRepo::new(cfg).unwrap();
        assert!(repo.access_token.is_none());
    }

    #[test]
    fn status_errors_map_to_core_errors() {
        let nf = FirestoreError::Status {
            status: 404,
            message: "NOT_FOUND".into(),
        };
        assert!(matches!(CoreError::from(nf), CoreError::NotFound));
        let exists = FirestoreError::Status {
            status: 409,
            message: "ALREADY_EXISTS".into(),
        };
        assert!(matches!(CoreError::from(exists), CoreError::AlreadyExists));
        let denied = FirestoreError::Status {
            status: 403,
            message: "PERMISSION_DENIED".into(),
        };
        assert!(matches!(CoreError::from(denied), CoreError::Repository(_)));
    }
}
