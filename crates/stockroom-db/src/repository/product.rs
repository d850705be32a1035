//! # Product Repository
//!
//! Database operations for the per-product aggregate.
//!
//! ## Two Calling Styles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  &self methods (pool)               associated fns (&mut SqliteConnection)│
//! │  ─────────────────────              ─────────────────────────────────── │
//! │  get_by_id, get_by_sku              fetch, fetch_cost_history           │
//! │  create, list, count                set_quantity, record_receipt        │
//! │                                                                         │
//! │  Standalone reads and writes.       Building blocks of ledger           │
//! │                                     operations; run inside the caller's │
//! │                                     transaction.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Version Guard
//! Every aggregate write is `... WHERE id = ? AND version = ?` and bumps the
//! version. Zero rows affected means someone else wrote first, reported as
//! `DbError::Conflict`.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::pool::begin_immediate;
use stockroom_core::validation::{
    validate_opening_quantity, validate_product_name, validate_sku, validate_unit_cost,
};
use stockroom_core::{CostHistoryEntry, Product};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    sku: String,
    name: String,
    quantity: f64,
    cost: f64,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProductRow {
    fn into_product(self, cost_history: Vec<CostHistoryEntry>) -> Product {
        Product {
            id: self.id,
            sku: self.sku,
            name: self.name,
            quantity: self.quantity,
            cost: self.cost,
            cost_history,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CostHistoryRow {
    cost: f64,
    quantity: f64,
    recorded_at: DateTime<Utc>,
}

impl From<CostHistoryRow> for CostHistoryEntry {
    fn from(row: CostHistoryRow) -> Self {
        CostHistoryEntry {
            cost: row.cost,
            quantity: row.quantity,
            recorded_at: row.recorded_at,
        }
    }
}

const PRODUCT_COLUMNS: &str =
    "id, sku, name, quantity, cost, version, created_at, updated_at";

// =============================================================================
// Input Types
// =============================================================================

/// Input for [`ProductRepository::create`].
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    /// Stock on hand before batch tracking; becomes legacy stock.
    pub opening_quantity: f64,
    /// Unit cost of the opening stock.
    pub opening_cost: f64,
}

impl NewProduct {
    pub fn new(sku: impl Into<String>, name: impl Into<String>) -> Self {
        NewProduct {
            sku: sku.into(),
            name: name.into(),
            opening_quantity: 0.0,
            opening_cost: 0.0,
        }
    }

    /// Sets opening (untracked) stock and its unit cost.
    pub fn opening_stock(mut self, quantity: f64, unit_cost: f64) -> Self {
        self.opening_quantity = quantity;
        self.opening_cost = unit_cost;
        self
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
/// let product = repo
///     .create(NewProduct::new("BEAN-1KG", "Beans 1kg").opening_stock(4.0, 6.5))
///     .await?;
/// let same = repo.get_by_sku("BEAN-1KG").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product (with its cost history) by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    /// Gets a product (with its cost history) by SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;

        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1"
        ))
        .bind(sku.trim())
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => {
                let history = Self::fetch_cost_history(&mut conn, &row.id).await?;
                Ok(Some(row.into_product(history)))
            }
            None => Ok(None),
        }
    }

    /// Creates a product.
    ///
    /// The opening quantity is not backed by a purchase batch, so the ledger
    /// treats it as legacy stock. A non-zero opening quantity seeds the cost
    /// history at `opening_cost`.
    ///
    /// ## Errors
    /// * `DbError::Core(Validation)` - bad SKU, name, quantity or cost
    /// * `DbError::UniqueViolation` - SKU already exists
    pub async fn create(&self, input: NewProduct) -> DbResult<Product> {
        validate_sku(&input.sku)?;
        validate_product_name(&input.name)?;
        validate_opening_quantity(input.opening_quantity)?;
        validate_unit_cost(input.opening_cost)?;

        let now = Utc::now();
        let sku = input.sku.trim().to_string();
        let mut cost_history = Vec::new();
        if input.opening_quantity > 0.0 {
            cost_history.push(CostHistoryEntry {
                cost: input.opening_cost,
                quantity: input.opening_quantity,
                recorded_at: now,
            });
        }

        let product = Product {
            id: generate_product_id(),
            sku,
            name: input.name.trim().to_string(),
            quantity: input.opening_quantity,
            cost: input.opening_cost,
            cost_history,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        debug!(sku = %product.sku, "Inserting product");

        let mut tx = begin_immediate(&self.pool).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, quantity, cost, version, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.quantity)
        .bind(product.cost)
        .bind(product.version)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await;

        if let Err(err) = inserted {
            return Err(match DbError::from(err) {
                DbError::UniqueViolation { field, .. } => DbError::duplicate(field, &product.sku),
                other => other,
            });
        }

        for entry in &product.cost_history {
            Self::insert_cost_history(&mut *tx, &product.id, entry).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(
            product_id = %product.id,
            sku = %product.sku,
            opening_quantity = product.quantity,
            "Product created"
        );
        Ok(product)
    }

    /// Lists products ordered by SKU.
    ///
    /// Cost history is left empty; use `get_by_id` for the full aggregate.
    pub async fn list(&self, limit: u32) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY sku LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.into_product(Vec::new()))
            .collect())
    }

    /// Counts total products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Connection-level building blocks
    // =========================================================================

    /// Loads a product and its cost history on `conn`.
    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => {
                let history = Self::fetch_cost_history(conn, id).await?;
                Ok(Some(row.into_product(history)))
            }
            None => Ok(None),
        }
    }

    /// Loads a product or fails with `ProductNotFound`.
    pub async fn fetch_required(conn: &mut SqliteConnection, id: &str) -> DbResult<Product> {
        Self::fetch(conn, id)
            .await?
            .ok_or_else(|| DbError::product_not_found(id))
    }

    /// Cost history entries, oldest first.
    pub async fn fetch_cost_history(
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<Vec<CostHistoryEntry>> {
        let rows: Vec<CostHistoryRow> = sqlx::query_as(
            r#"
            SELECT cost, quantity, recorded_at
            FROM product_cost_history
            WHERE product_id = ?1
            ORDER BY id
            "#,
        )
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(CostHistoryEntry::from).collect())
    }

    /// Writes a new on-hand quantity, guarded by `expected_version`.
    ///
    /// Returns the new version.
    pub async fn set_quantity(
        conn: &mut SqliteConnection,
        id: &str,
        quantity: f64,
        expected_version: i64,
    ) -> DbResult<i64> {
        debug!(product_id = %id, quantity, expected_version, "Updating product quantity");

        let result = sqlx::query(
            r#"
            UPDATE products
            SET quantity = ?2, version = version + 1, updated_at = ?4
            WHERE id = ?1 AND version = ?3
            "#,
        )
        .bind(id)
        .bind(quantity)
        .bind(expected_version)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Product", id));
        }

        Ok(expected_version + 1)
    }

    /// Persists a receipt already applied to `product` in memory: appends
    /// `entry` to the cost history and writes quantity and cost, guarded by
    /// `expected_version`.
    pub async fn record_receipt(
        conn: &mut SqliteConnection,
        product: &Product,
        entry: &CostHistoryEntry,
        expected_version: i64,
    ) -> DbResult<i64> {
        Self::insert_cost_history(conn, &product.id, entry).await?;

        let result = sqlx::query(
            r#"
            UPDATE products
            SET quantity = ?2, cost = ?3, version = version + 1, updated_at = ?5
            WHERE id = ?1 AND version = ?4
            "#,
        )
        .bind(&product.id)
        .bind(product.quantity)
        .bind(product.cost)
        .bind(expected_version)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("Product", &product.id));
        }

        Ok(expected_version + 1)
    }

    async fn insert_cost_history(
        conn: &mut SqliteConnection,
        product_id: &str,
        entry: &CostHistoryEntry,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO product_cost_history (product_id, cost, quantity, recorded_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(product_id)
        .bind(entry.cost)
        .bind(entry.quantity)
        .bind(entry.recorded_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

/// Generates a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_fetch() {
        let db = db().await;
        let repo = db.products();

        let created = repo
            .create(NewProduct::new("BEAN-1KG", "Beans 1kg").opening_stock(4.0, 6.5))
            .await
            .unwrap();

        let by_id = repo.get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(by_id.sku, "BEAN-1KG");
        assert_eq!(by_id.quantity, 4.0);
        assert_eq!(by_id.cost, 6.5);
        assert_eq!(by_id.version, 0);
        assert_eq!(by_id.cost_history.len(), 1);
        assert_eq!(by_id.cost_history[0].quantity, 4.0);

        let by_sku = repo.get_by_sku("BEAN-1KG").await.unwrap().unwrap();
        assert_eq!(by_sku.id, created.id);

        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.list(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_without_opening_stock_has_no_history() {
        let db = db().await;
        let created = db
            .products()
            .create(NewProduct::new("MILK-1L", "Milk 1L"))
            .await
            .unwrap();

        let loaded = db.products().get_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded.quantity, 0.0);
        assert!(loaded.cost_history.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_sku_rejected() {
        let db = db().await;
        let repo = db.products();

        repo.create(NewProduct::new("DUP-1", "First")).await.unwrap();
        let err = repo
            .create(NewProduct::new("DUP-1", "Second"))
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let db = db().await;
        let repo = db.products();

        assert!(repo.create(NewProduct::new("", "Nameless")).await.is_err());
        assert!(repo
            .create(NewProduct::new("NEG-1", "Negative").opening_stock(-1.0, 2.0))
            .await
            .is_err());
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_quantity_is_version_guarded() {
        let db = db().await;
        let product = db
            .products()
            .create(NewProduct::new("VER-1", "Versioned").opening_stock(10.0, 1.0))
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();

        let v1 = ProductRepository::set_quantity(&mut conn, &product.id, 8.0, 0)
            .await
            .unwrap();
        assert_eq!(v1, 1);

        let stale = ProductRepository::set_quantity(&mut conn, &product.id, 6.0, 0).await;
        assert!(matches!(stale, Err(DbError::Conflict { .. })));

        let reloaded = ProductRepository::fetch_required(&mut conn, &product.id)
            .await
            .unwrap();
        assert_eq!(reloaded.quantity, 8.0);
        assert_eq!(reloaded.version, 1);
    }

    #[tokio::test]
    async fn test_fetch_required_missing_product() {
        let db = db().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let err = ProductRepository::fetch_required(&mut conn, "missing")
            .await
            .unwrap_err();
        assert!(err.is_product_not_found());
    }
}
