use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::id::Base62IdGenerator;
use crate::{
    CoreError, DocumentId, NewProduct, NewSite, Product, ShoppingList, ShoppingListRepository,
    Site, SiteRepository,
};

type ProductKey = (String, String);

/// Simple in-memory list repository. Products are keyed by (list id, product
/// id) and may exist before their parent list, as in a document store.
pub struct InMemoryShoppingRepo {
    lists: Mutex<BTreeMap<String, ShoppingList>>,
    products: Mutex<BTreeMap<ProductKey, Product>>,
    next_id: AtomicU64,
    ids: Base62IdGenerator,
}

/// In-memory site repository.
pub struct InMemorySiteRepo {
    sites: Mutex<BTreeMap<String, Site>>,
    next_id: AtomicU64,
    ids: Base62IdGenerator,
}

fn poisoned<T>(_: T) -> CoreError {
    CoreError::Repository("mutex poisoned".into())
}

fn key(list_id: &DocumentId, product_id: &DocumentId) -> ProductKey {
    (list_id.as_str().to_string(), product_id.as_str().to_string())
}

impl InMemoryShoppingRepo {
    pub fn new() -> Self {
        Self {
            lists: Mutex::new(BTreeMap::new()),
            products: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            ids: Base62IdGenerator::default(),
        }
    }
}

impl Default for InMemoryShoppingRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl ShoppingListRepository for InMemoryShoppingRepo {
    fn latest_list(&self) -> Result<Option<ShoppingList>, CoreError> {
        Ok(self.recent_lists(1)?.into_iter().next())
    }

    fn recent_lists(&self, limit: usize) -> Result<Vec<ShoppingList>, CoreError> {
        let lists = self.lists.lock().map_err(poisoned)?;
        let mut items: Vec<_> = lists.values().cloned().collect();
        items.sort_by(|a, b| b.registered_at.cmp(&a.registered_at));
        items.truncate(limit);
        Ok(items)
    }

    fn get_list(&self, id: &DocumentId) -> Result<Option<ShoppingList>, CoreError> {
        let lists = self.lists.lock().map_err(poisoned)?;
        Ok(lists.get(id.as_str()).cloned())
    }

    fn create_list(&self, list: ShoppingList) -> Result<(), CoreError> {
        let mut lists = self.lists.lock().map_err(poisoned)?;
        let k = list.id.as_str().to_string();
        if lists.contains_key(&k) {
            return Err(CoreError::AlreadyExists);
        }
        lists.insert(k, list);
        Ok(())
    }

    fn list_products(&self, list_id: &DocumentId) -> Result<Vec<Product>, CoreError> {
        let products = self.products.lock().map_err(poisoned)?;
        Ok(products
            .iter()
            .filter(|((l, _), _)| l == list_id.as_str())
            .map(|(_, p)| p.clone())
            .collect())
    }

    fn get_product(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
    ) -> Result<Option<Product>, CoreError> {
        let products = self.products.lock().map_err(poisoned)?;
        Ok(products.get(&key(list_id, product_id)).cloned())
    }

    fn insert_product(
        &self,
        list_id: &DocumentId,
        product: NewProduct,
    ) -> Result<Product, CoreError> {
        let id = self.ids.id_for(self.next_id.fetch_add(1, Ordering::Relaxed));
        let product = product.with_id(id);
        let mut products = self.products.lock().map_err(poisoned)?;
        products.insert(key(list_id, &product.id), product.clone());
        Ok(product)
    }

    fn update_product(&self, list_id: &DocumentId, product: &Product) -> Result<(), CoreError> {
        let mut products = self.products.lock().map_err(poisoned)?;
        match products.get_mut(&key(list_id, &product.id)) {
            Some(slot) => {
                *slot = product.clone();
                Ok(())
            }
            None => Err(CoreError::NotFound),
        }
    }

    fn set_purchased(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
        purchased: bool,
    ) -> Result<(), CoreError> {
        let mut products = self.products.lock().map_err(poisoned)?;
        match products.get_mut(&key(list_id, product_id)) {
            Some(p) => {
                p.purchased = purchased;
                Ok(())
            }
            None => Err(CoreError::NotFound),
        }
    }

    fn delete_product(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
    ) -> Result<(), CoreError> {
        let mut products = self.products.lock().map_err(poisoned)?;
        products
            .remove(&key(list_id, product_id))
            .map(|_| ())
            .ok_or(CoreError::NotFound)
    }
}

// ============ InMemorySiteRepo ============

impl InMemorySiteRepo {
    pub fn new() -> Self {
        Self {
            sites: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            ids: Base62IdGenerator::default(),
        }
    }
}

impl Default for InMemorySiteRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl SiteRepository for InMemorySiteRepo {
    fn insert_site(&self, site: NewSite) -> Result<Site, CoreError> {
        let id = self.ids.id_for(self.next_id.fetch_add(1, Ordering::Relaxed));
        let site = Site { id, name: site.name };
        let mut sites = self.sites.lock().map_err(poisoned)?;
        sites.insert(site.id.as_str().to_string(), site.clone());
        Ok(site)
    }

    fn list_sites(&self) -> Result<Vec<Site>, CoreError> {
        let sites = self.sites.lock().map_err(poisoned)?;
        Ok(sites.values().cloned().collect())
    }
}
