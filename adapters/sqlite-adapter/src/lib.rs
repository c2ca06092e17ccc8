//! sqlite-adapter: SQLite implementation of the shopping list ports for local/dev.
//!
//! Purpose
//! - Provide a lightweight, file-based repository to run the system locally
//!   without the hosted document store.
//! - Implements `ShoppingListRepository` and `SiteRepository` from the `domain` crate.
//! - Allocates document ids from a `counters` table, Base62-encoded, so ids
//!   survive restarts.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Stores timestamps as milliseconds since UNIX_EPOCH so lists registered
//!   within the same second still order correctly.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::id::Base62IdGenerator;
use domain::{
    CoreError, DocumentId, NewProduct, NewSite, Product, ShoppingList, ShoppingListRepository,
    Site, SiteRepository,
};
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite-backed repository for local development.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
    ids: Base62IdGenerator,
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ids: Base62IdGenerator::default(),
        })
    }

    /// Construct from env var `DB_PATH` (defaults to `./data/shopping.db`).
    pub fn from_env() -> Result<Self, CoreError> {
        let path = std::env::var("DB_PATH").unwrap_or_else(|_| "./data/shopping.db".to_string());
        if let Some(dir) = Path::new(&path).parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        Self::new(path)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))
    }

    /// Atomically increment the named counter and return the new value.
    fn next_counter(conn: &Connection, name: &str) -> Result<u64, CoreError> {
        let tx = conn.unchecked_transaction().map_err(map_sqerr)?;
        tx.execute(
            "INSERT OR IGNORE INTO counters(name, value) VALUES(?1, 0)",
            params![name],
        )
        .map_err(map_sqerr)?;
        tx.execute(
            "UPDATE counters SET value = value + 1 WHERE name = ?1",
            params![name],
        )
        .map_err(map_sqerr)?;
        let val: i64 = tx
            .query_row(
                "SELECT value FROM counters WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(map_sqerr)?;
        tx.commit().map_err(map_sqerr)?;
        Ok(val as u64)
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS shopping_lists (
            id TEXT PRIMARY KEY,
            registered_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_shopping_lists_registered_at ON shopping_lists(registered_at);
        CREATE TABLE IF NOT EXISTS products (
            list_id TEXT NOT NULL,
            id TEXT NOT NULL,
            name TEXT NOT NULL,
            site TEXT,
            quantity INTEGER,
            purchased INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (list_id, id)
        );
        CREATE TABLE IF NOT EXISTS sites (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS counters (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Repository(format!("sqlite error: {e}"))
}

fn system_time_to_millis(t: SystemTime) -> i64 {
    let ms = t
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis();
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn millis_to_system_time(ms: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64)
}

fn stored_id(raw: String) -> Result<DocumentId, CoreError> {
    DocumentId::new(raw).map_err(|e| CoreError::Repository(format!("bad id in db: {e}")))
}

fn row_to_list(row: &rusqlite::Row) -> Result<ShoppingList, CoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    let ts: i64 = row.get(1).map_err(map_sqerr)?;
    Ok(ShoppingList {
        id: stored_id(id)?,
        registered_at: millis_to_system_time(ts),
    })
}

fn row_to_product(row: &rusqlite::Row) -> Result<Product, CoreError> {
    let id: String = row.get(0).map_err(map_sqerr)?;
    let name: String = row.get(1).map_err(map_sqerr)?;
    let site: Option<String> = row.get(2).map_err(map_sqerr)?;
    let quantity: Option<i64> = row.get(3).map_err(map_sqerr)?;
    let purchased: i64 = row.get(4).map_err(map_sqerr)?;
    Ok(Product {
        id: stored_id(id)?,
        name,
        site,
        quantity: quantity.map(|q| q as u32),
        purchased: purchased != 0,
    })
}

impl ShoppingListRepository for SqliteRepo {
    fn latest_list(&self) -> Result<Option<ShoppingList>, CoreError> {
        Ok(self.recent_lists(1)?.into_iter().next())
    }

    fn recent_lists(&self, limit: usize) -> Result<Vec<ShoppingList>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, registered_at FROM shopping_lists ORDER BY registered_at DESC LIMIT ?1")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query(params![limit as i64]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            out.push(row_to_list(row)?);
        }
        Ok(out)
    }

    fn get_list(&self, id: &DocumentId) -> Result<Option<ShoppingList>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, registered_at FROM shopping_lists WHERE id = ?1")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query(params![id.as_str()]).map_err(map_sqerr)?;
        match rows.next().map_err(map_sqerr)? {
            Some(row) => Ok(Some(row_to_list(row)?)),
            None => Ok(None),
        }
    }

    fn create_list(&self, list: ShoppingList) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let res = conn.execute(
            "INSERT INTO shopping_lists(id, registered_at) VALUES (?1, ?2)",
            params![list.id.as_str(), system_time_to_millis(list.registered_at)],
        );
        match res {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(CoreError::AlreadyExists)
            }
            Err(e) => Err(map_sqerr(e)),
        }
    }

    fn list_products(&self, list_id: &DocumentId) -> Result<Vec<Product>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name, site, quantity, purchased FROM products WHERE list_id = ?1 ORDER BY id")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query(params![list_id.as_str()]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            out.push(row_to_product(row)?);
        }
        Ok(out)
    }

    fn get_product(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
    ) -> Result<Option<Product>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name, site, quantity, purchased FROM products WHERE list_id = ?1 AND id = ?2")
            .map_err(map_sqerr)?;
        let mut rows = stmt
            .query(params![list_id.as_str(), product_id.as_str()])
            .map_err(map_sqerr)?;
        match rows.next().map_err(map_sqerr)? {
            Some(row) => Ok(Some(row_to_product(row)?)),
            None => Ok(None),
        }
    }

    fn insert_product(
        &self,
        list_id: &DocumentId,
        product: NewProduct,
    ) -> Result<Product, CoreError> {
        let conn = self.lock()?;
        let id = self.ids.id_for(Self::next_counter(&conn, "products")?);
        let product = product.with_id(id);
        conn.execute(
            "INSERT INTO products(list_id, id, name, site, quantity, purchased) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                list_id.as_str(),
                product.id.as_str(),
                product.name,
                product.site,
                product.quantity.map(|q| q as i64),
                product.purchased as i64,
            ],
        )
        .map_err(map_sqerr)?;
        Ok(product)
    }

    fn update_product(&self, list_id: &DocumentId, product: &Product) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE products SET name = ?1, site = ?2, quantity = ?3, purchased = ?4 WHERE list_id = ?5 AND id = ?6",
                params![
                    product.name,
                    product.site,
                    product.quantity.map(|q| q as i64),
                    product.purchased as i64,
                    list_id.as_str(),
                    product.id.as_str(),
                ],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn set_purchased(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
        purchased: bool,
    ) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE products SET purchased = ?1 WHERE list_id = ?2 AND id = ?3",
                params![purchased as i64, list_id.as_str(), product_id.as_str()],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }

    fn delete_product(
        &self,
        list_id: &DocumentId,
        product_id: &DocumentId,
    ) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "DELETE FROM products WHERE list_id = ?1 AND id = ?2",
                params![list_id.as_str(), product_id.as_str()],
            )
            .map_err(map_sqerr)?;
        if changed == 0 {
            Err(CoreError::NotFound)
        } else {
            Ok(())
        }
    }
}

impl SiteRepository for SqliteRepo {
    fn insert_site(&self, site: NewSite) -> Result<Site, CoreError> {
        let conn = self.lock()?;
        let id = self.ids.id_for(Self::next_counter(&conn, "sites")?);
        conn.execute(
            "INSERT INTO sites(id, name) VALUES (?1, ?2)",
            params![id.as_str(), site.name],
        )
        .map_err(map_sqerr)?;
        Ok(Site {
            id,
            name: site.name,
        })
    }

    fn list_sites(&self) -> Result<Vec<Site>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name FROM sites ORDER BY id")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query([]).map_err(map_sqerr)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_sqerr)? {
            let id: String = row.get(0).map_err(map_sqerr)?;
            let name: String = row.get(1).map_err(map_sqerr)?;
            out.push(Site {
                id: stored_id(id)?,
                name,
            });
        }
        Ok(out)
    }
}

/// Number of lists stored; used by the server's startup log line.
pub fn count_lists(repo: &SqliteRepo) -> Result<u64, CoreError> {
    let conn = repo.lock()?;
    let n: Option<i64> = conn
        .query_row("SELECT COUNT(*) FROM shopping_lists", [], |r| r.get(0))
        .optional()
        .map_err(map_sqerr)?;
    Ok(n.unwrap_or(0) as u64)
}
