use crate::validate::{validate_product, validate_site};
use crate::{
    Clock, CoreError, DocumentId, NewSite, Product, ProductInput, ShoppingList,
    ShoppingListRepository, SiteRepository,
};

/// Application service orchestrating shopping list operations.
///
/// Generic over the list repository, the site repository and the clock so
/// the same orchestration runs against memory, SQLite or the hosted document
/// store.
pub struct ShoppingService<R: ShoppingListRepository, S: SiteRepository, C: Clock> {
    lists: R,
    sites: S,
    clock: C,
}

/// Result of an upsert: which id was written and whether it was a new entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upserted {
    pub id: DocumentId,
    pub created: bool,
}

impl<R: ShoppingListRepository, S: SiteRepository, C: Clock> ShoppingService<R, S, C> {
    pub fn new(lists: R, sites: S, clock: C) -> Self {
        Self {
            lists,
            sites,
            clock,
        }
    }

    /// Products of the most recently registered list; empty when no list exists.
    pub fn latest_products(&self) -> Result<Vec<Product>, CoreError> {
        match self.lists.latest_list()? {
            Some(list) => self.lists.list_products(&list.id),
            None => Ok(Vec::new()),
        }
    }

    /// Products of a specific list.
    pub fn list_products(&self, list_id: &DocumentId) -> Result<Vec<Product>, CoreError> {
        self.lists.list_products(list_id)
    }

    /// Lists ordered newest first.
    pub fn recent_lists(&self, limit: usize) -> Result<Vec<ShoppingList>, CoreError> {
        self.lists.recent_lists(limit)
    }

    /// Create or edit a product. The parent list is created on first write.
    pub fn upsert_product(
        &self,
        list_id: &DocumentId,
        input: ProductInput,
    ) -> Result<Upserted, CoreError> {
        let (id, product) = validate_product(input)?;
        self.ensure_list(list_id)?;

        match id {
            Some(id) => {
                let product = product.with_id(id);
                self.lists.update_product(list_id, &product)?;
                Ok(Upserted {
                    id: product.id,
                    created: false,
                })
            }
            None => {
                let stored = self.lists.insert_product(list_id, product)?;
                Ok(Upserted {
                    id: stored.id,
                    created: true,
                })
            }
        }
    }

    fn ensure_list(&self, list_id: &DocumentId) -> Result<(), CoreError> {
        if self.lists.get_list(list_id)?.is_some() {
            return Ok(());
        }
        let list = ShoppingList {
            id: list_id.clone(),
            registered_at: self.clock.now(),
        };
        match self.lists.create_list(list) {
            // Lost a race with a concurrent writer; the list exists either way.
            Ok(()) | Err(CoreError::AlreadyExists) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Register a purchase site and return its generated id.
    pub fn add_site(&self, site: NewSite) -> Result<DocumentId, CoreError> {
        let site = validate_site(site)?;
        Ok(self.sites.insert_site(site)?.id)
    }

    pub fn sites(&self) -> Result<Vec<crate::Site>, CoreError> {
        self.sites.list_sites()
    }

    /// Mark a product as purchased. Returns `false` when it does not exist.
    pub fn mark_purchased(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
    ) -> Result<bool, CoreError> {
        if self.lists.get_product(list_id, product_id)?.is_none() {
            return Ok(false);
        }
        self.lists.set_purchased(list_id, product_id, true)?;
        Ok(true)
    }

    /// Delete a product that has not been purchased yet. Returns `false` when
    /// it does not exist.
    pub fn delete_product(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
    ) -> Result<bool, CoreError> {
        match self.lists.get_product(list_id, product_id)? {
            None => Ok(false),
            Some(p) if p.purchased => Err(CoreError::ProductPurchased),
            Some(_) => {
                self.lists.delete_product(list_id, product_id)?;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::{InMemoryShoppingRepo, InMemorySiteRepo};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{Duration, SystemTime};

    /// Advances one second per call so lists get distinct timestamps.
    struct TickClock(AtomicU64);
    impl Clock for TickClock {
        fn now(&self) -> SystemTime {
            let n = self.0.fetch_add(1, Ordering::Relaxed);
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + n)
        }
    }

    type Svc = ShoppingService<InMemoryShoppingRepo, InMemorySiteRepo, TickClock>;

    fn svc() -> Svc {
        ShoppingService::new(
            InMemoryShoppingRepo::new(),
            InMemorySiteRepo::new(),
            TickClock(AtomicU64::new(0)),
        )
    }

    fn id(s: &str) -> DocumentId {
        DocumentId::new(s).unwrap()
    }

    fn milk() -> ProductInput {
        ProductInput {
            name: "Milk".into(),
            site: Some("Market".into()),
            quantity: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn latest_products_empty_without_lists() {
        assert!(svc().latest_products().unwrap().is_empty());
    }

    #[test]
    fn upsert_creates_list_and_product() {
        let svc = svc();
        let list = id("primeralista");
        let res = svc.upsert_product(&list, milk()).unwrap();
        assert!(res.created);

        let lists = svc.recent_lists(10).unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].id, list);

        let products = svc.latest_products().unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, res.id);
        assert_eq!(products[0].name, "Milk");
    }

    #[test]
    fn upsert_with_id_updates_in_place() {
        let svc = svc();
        let list = id("l1");
        let created = svc.upsert_product(&list, milk()).unwrap();

        let mut edit = milk();
        edit.id = Some(created.id.clone());
        edit.name = "Oat milk".into();
        let updated = svc.upsert_product(&list, edit).unwrap();
        assert!(!updated.created);
        assert_eq!(updated.id, created.id);

        let products = svc.list_products(&list).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Oat milk");
    }

    #[test]
    fn upsert_with_unknown_id_is_not_found() {
        let svc = svc();
        let mut edit = milk();
        edit.id = Some(id("ghost"));
        let err = svc.upsert_product(&id("l1"), edit).unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    #[test]
    fn latest_products_follow_newest_list() {
        let svc = svc();
        svc.upsert_product(&id("older"), milk()).unwrap();
        let mut bread = milk();
        bread.name = "Bread".into();
        svc.upsert_product(&id("newer"), bread).unwrap();

        let products = svc.latest_products().unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Bread");
    }

    #[test]
    fn mark_purchased_reports_missing() {
        let svc = svc();
        let list = id("l1");
        assert!(!svc.mark_purchased(&list, &id("nope")).unwrap());

        let p = svc.upsert_product(&list, milk()).unwrap();
        assert!(svc.mark_purchased(&list, &p.id).unwrap());
        assert!(svc.list_products(&list).unwrap()[0].purchased);
    }

    #[test]
    fn delete_refuses_purchased_products() {
        let svc = svc();
        let list = id("l1");
        let p = svc.upsert_product(&list, milk()).unwrap();
        svc.mark_purchased(&list, &p.id).unwrap();
        let err = svc.delete_product(&list, &p.id).unwrap_err();
        assert!(matches!(err, CoreError::ProductPurchased));
    }

    #[test]
    fn delete_removes_pending_product() {
        let svc = svc();
        let list = id("l1");
        let p = svc.upsert_product(&list, milk()).unwrap();
        assert!(svc.delete_product(&list, &p.id).unwrap());
        assert!(!svc.delete_product(&list, &p.id).unwrap());
        assert!(svc.list_products(&list).unwrap().is_empty());
    }

    #[test]
    fn sites_roundtrip_and_validation() {
        let svc = svc();
        let sid = svc
            .add_site(NewSite {
                name: " Corner shop ".into(),
            })
            .unwrap();
        let sites = svc.sites().unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].id, sid);
        assert_eq!(sites[0].name, "Corner shop");

        let err = svc.add_site(NewSite { name: "".into() }).unwrap_err();
        assert!(matches!(err, CoreError::InvalidName(_)));
    }

    /// Another writer creates the list between our `get_list` and
    /// `create_list`: reads miss, the create reports `AlreadyExists`.
    struct RacingRepo(InMemoryShoppingRepo);

    impl ShoppingListRepository for RacingRepo {
        fn latest_list(&self) -> Result<Option<ShoppingList>, CoreError> {
            self.0.latest_list()
        }
        fn recent_lists(&self, limit: usize) -> Result<Vec<ShoppingList>, CoreError> {
            self.0.recent_lists(limit)
        }
        fn get_list(&self, _id: &DocumentId) -> Result<Option<ShoppingList>, CoreError> {
            Ok(None)
        }
        fn create_list(&self, list: ShoppingList) -> Result<(), CoreError> {
            let _ = self.0.create_list(list);
            Err(CoreError::AlreadyExists)
        }
        fn list_products(&self, list_id: &DocumentId) -> Result<Vec<Product>, CoreError> {
            self.0.list_products(list_id)
        }
        fn get_product(
            &self,
            list_id: &DocumentId,
            product_id: &DocumentId,
        ) -> Result<Option<Product>, CoreError> {
            self.0.get_product(list_id, product_id)
        }
        fn insert_product(
            &self,
            list_id: &DocumentId,
            product: crate::NewProduct,
        ) -> Result<Product, CoreError> {
            self.0.insert_product(list_id, product)
        }
        fn update_product(&self, list_id: &DocumentId, product: &Product) -> Result<(), CoreError> {
            self.0.update_product(list_id, product)
        }
        fn set_purchased(
            &self,
            list_id: &DocumentId,
            product_id: &DocumentId,
            purchased: bool,
        ) -> Result<(), CoreError> {
            self.0.set_purchased(list_id, product_id, purchased)
        }
        fn delete_product(
            &self,
            list_id: &DocumentId,
            product_id: &DocumentId,
        ) -> Result<(), CoreError> {
            self.0.delete_product(list_id, product_id)
        }
    }

    #[test]
    fn upsert_succeeds_when_list_was_created_concurrently() {
        let svc = ShoppingService::new(
            RacingRepo(InMemoryShoppingRepo::new()),
            InMemorySiteRepo::new(),
            TickClock(AtomicU64::new(0)),
        );
        let list = id("shared");
        let res = svc.upsert_product(&list, milk()).unwrap();
        assert!(res.created);
        let products = svc.list_products(&list).unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id, res.id);
    }
}
