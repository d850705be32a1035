//! # Batch Repository
//!
//! Database operations for `inventory_batches`: purchase batches (supply) and
//! the movement records written against them.
//!
//! ## Row Lifecycle
//! ```text
//! purchase  remaining = quantity ──consume──► remaining ↓ ──restore──► remaining ↑
//! sale      allocation record, remaining = 0, deleted on reversal
//! return    fallback record, remaining = 0, never deleted
//! ```
//!
//! Batch order is `created_at`, then insertion sequence. FIFO walks that
//! order oldest first.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockroom_core::fifo::AvailableBatch;
use stockroom_core::{
    BatchReference, BatchSource, BatchType, InventoryBatch, ReferenceKind, SourceKind,
    QUANTITY_EPSILON,
};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    id: String,
    product_id: String,
    batch_type: BatchType,
    quantity: f64,
    remaining_quantity: f64,
    unit_cost: f64,
    reference_type: ReferenceKind,
    reference_id: String,
    source_kind: Option<SourceKind>,
    source_batch_id: Option<String>,
    notes: Option<String>,
    created_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for InventoryBatch {
    type Error = DbError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        let source = match row.source_kind {
            Some(kind) => Some(BatchSource::from_parts(kind, row.source_batch_id).ok_or_else(
                || DbError::CorruptRecord {
                    entity: "InventoryBatch".to_string(),
                    id: row.id.clone(),
                    reason: "batch source without a batch id".to_string(),
                },
            )?),
            None => None,
        };

        Ok(InventoryBatch {
            id: row.id,
            product_id: row.product_id,
            batch_type: row.batch_type,
            quantity: row.quantity,
            remaining_quantity: row.remaining_quantity,
            unit_cost: row.unit_cost,
            reference: BatchReference {
                kind: row.reference_type,
                id: row.reference_id,
            },
            source,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

fn into_batches(rows: Vec<BatchRow>) -> DbResult<Vec<InventoryBatch>> {
    rows.into_iter().map(InventoryBatch::try_from).collect()
}

const BATCH_COLUMNS: &str = "id, product_id, batch_type, quantity, remaining_quantity, unit_cost, \
     reference_type, reference_id, source_kind, source_batch_id, notes, created_by, created_at";

/// Quantity totals over a product's purchase batches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, sqlx::FromRow)]
pub struct PurchaseTotals {
    /// Σ quantity, depleted batches included.
    pub total_purchased: f64,
    /// Σ remaining_quantity.
    pub total_remaining: f64,
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for inventory batch operations.
///
/// Pool methods (`&self`) serve audits and reporting. The associated
/// functions taking `&mut SqliteConnection` are the ledger's building blocks
/// and run inside the caller's transaction.
#[derive(Debug, Clone)]
pub struct BatchRepository {
    pool: SqlitePool,
}

impl BatchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BatchRepository { pool }
    }

    /// Gets any batch row by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<InventoryBatch>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    /// Every movement record for a product, oldest first.
    pub async fn history(&self, product_id: &str) -> DbResult<Vec<InventoryBatch>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_history(&mut conn, product_id).await
    }

    /// Sale allocation records written for `reference` against `product_id`.
    pub async fn allocations(
        &self,
        product_id: &str,
        reference: &BatchReference,
    ) -> DbResult<Vec<InventoryBatch>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_sale_allocations(&mut conn, product_id, reference).await
    }

    /// Number of rows of `batch_type` for a product.
    pub async fn count_by_type(&self, product_id: &str, batch_type: BatchType) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM inventory_batches WHERE product_id = ?1 AND batch_type = ?2",
        )
        .bind(product_id)
        .bind(batch_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    // =========================================================================
    // Connection-level building blocks
    // =========================================================================

    pub async fn fetch(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<InventoryBatch>> {
        let row: Option<BatchRow> = sqlx::query_as(&format!(
            "SELECT {BATCH_COLUMNS} FROM inventory_batches WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(InventoryBatch::try_from).transpose()
    }

    pub async fn fetch_history(
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<Vec<InventoryBatch>> {
        let rows: Vec<BatchRow> = sqlx::query_as(&format!(
            "SELECT {BATCH_COLUMNS} FROM inventory_batches \
             WHERE product_id = ?1 ORDER BY created_at, seq"
        ))
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await?;

        into_batches(rows)
    }

    /// Purchase batches that still hold stock, oldest first.
    pub async fn fetch_available(
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<Vec<AvailableBatch>> {
        let rows: Vec<(String, f64, f64)> = sqlx::query_as(
            r#"
            SELECT id, remaining_quantity, unit_cost
            FROM inventory_batches
            WHERE product_id = ?1
              AND batch_type = 'purchase'
              AND remaining_quantity > ?2
            ORDER BY created_at, seq
            "#,
        )
        .bind(product_id)
        .bind(QUANTITY_EPSILON)
        .fetch_all(&mut *conn)
        .await?;

        debug!(product_id = %product_id, count = rows.len(), "Loaded available batches");

        Ok(rows
            .into_iter()
            .map(|(batch_id, remaining_quantity, unit_cost)| AvailableBatch {
                batch_id,
                remaining_quantity,
                unit_cost,
            })
            .collect())
    }

    /// Totals over every purchase batch of the product.
    pub async fn purchase_totals(
        conn: &mut SqliteConnection,
        product_id: &str,
    ) -> DbResult<PurchaseTotals> {
        let totals: PurchaseTotals = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(quantity), 0.0) AS total_purchased,
                COALESCE(SUM(remaining_quantity), 0.0) AS total_remaining
            FROM inventory_batches
            WHERE product_id = ?1 AND batch_type = 'purchase'
            "#,
        )
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(totals)
    }

    /// Sale allocation records for one reference and product, in write order.
    pub async fn fetch_sale_allocations(
        conn: &mut SqliteConnection,
        product_id: &str,
        reference: &BatchReference,
    ) -> DbResult<Vec<InventoryBatch>> {
        let rows: Vec<BatchRow> = sqlx::query_as(&format!(
            "SELECT {BATCH_COLUMNS} FROM inventory_batches \
             WHERE product_id = ?1 AND batch_type = 'sale' \
               AND reference_type = ?2 AND reference_id = ?3 \
             ORDER BY seq"
        ))
        .bind(product_id)
        .bind(reference.kind)
        .bind(&reference.id)
        .fetch_all(&mut *conn)
        .await?;

        into_batches(rows)
    }

    pub async fn insert(conn: &mut SqliteConnection, batch: &InventoryBatch) -> DbResult<()> {
        debug!(
            batch_id = %batch.id,
            product_id = %batch.product_id,
            batch_type = ?batch.batch_type,
            quantity = batch.quantity,
            "Inserting batch"
        );

        let source_kind = batch.source.as_ref().map(BatchSource::kind);
        let source_batch_id = batch.source.as_ref().and_then(BatchSource::batch_id);

        sqlx::query(
            r#"
            INSERT INTO inventory_batches (
                id, product_id, batch_type, quantity, remaining_quantity, unit_cost,
                reference_type, reference_id, source_kind, source_batch_id,
                notes, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.product_id)
        .bind(batch.batch_type)
        .bind(batch.quantity)
        .bind(batch.remaining_quantity)
        .bind(batch.unit_cost)
        .bind(batch.reference.kind)
        .bind(&batch.reference.id)
        .bind(source_kind)
        .bind(source_batch_id)
        .bind(&batch.notes)
        .bind(&batch.created_by)
        .bind(batch.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Draws `quantity` from a purchase batch.
    ///
    /// The update only matches while the stored remainder still covers the
    /// draw; otherwise another writer got there first and this returns
    /// `DbError::Conflict`.
    pub async fn consume(conn: &mut SqliteConnection, batch_id: &str, quantity: f64) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_batches
            SET remaining_quantity = MAX(0.0, remaining_quantity - ?2)
            WHERE id = ?1
              AND batch_type = 'purchase'
              AND remaining_quantity >= ?2 - ?3
            "#,
        )
        .bind(batch_id)
        .bind(quantity)
        .bind(QUANTITY_EPSILON)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("InventoryBatch", batch_id));
        }

        Ok(())
    }

    /// Puts `quantity` back into a purchase batch, capped at its original size.
    ///
    /// Returns `false` when the batch no longer exists.
    pub async fn restore(conn: &mut SqliteConnection, batch_id: &str, quantity: f64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_batches
            SET remaining_quantity = MIN(quantity, remaining_quantity + ?2)
            WHERE id = ?1 AND batch_type = 'purchase'
            "#,
        )
        .bind(batch_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM inventory_batches WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("InventoryBatch", id));
        }

        Ok(())
    }
}

/// Generates a new batch ID.
pub fn generate_batch_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::NewProduct;
    use chrono::TimeZone;

    fn purchase(product_id: &str, quantity: f64, unit_cost: f64, day: u32) -> InventoryBatch {
        InventoryBatch {
            id: generate_batch_id(),
            product_id: product_id.to_string(),
            batch_type: BatchType::Purchase,
            quantity,
            remaining_quantity: quantity,
            unit_cost,
            reference: BatchReference::restock(format!("po-{day}")),
            source: None,
            notes: None,
            created_by: Some("buyer".to_string()),
            created_at: Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap(),
        }
    }

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let product = db
            .products()
            .create(NewProduct::new("OIL-5L", "Olive oil 5L"))
            .await
            .unwrap();
        (db, product.id)
    }

    #[tokio::test]
    async fn test_available_batches_are_oldest_first() {
        let (db, product_id) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let newer = purchase(&product_id, 5.0, 20.0, 12);
        let older = purchase(&product_id, 5.0, 10.0, 2);
        BatchRepository::insert(&mut conn, &newer).await.unwrap();
        BatchRepository::insert(&mut conn, &older).await.unwrap();

        let available = BatchRepository::fetch_available(&mut conn, &product_id)
            .await
            .unwrap();
        let ids: Vec<&str> = available.iter().map(|b| b.batch_id.as_str()).collect();
        assert_eq!(ids, vec![older.id.as_str(), newer.id.as_str()]);
    }

    #[tokio::test]
    async fn test_consume_is_guarded() {
        let (db, product_id) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let batch = purchase(&product_id, 3.0, 5.0, 1);
        BatchRepository::insert(&mut conn, &batch).await.unwrap();

        BatchRepository::consume(&mut conn, &batch.id, 2.0).await.unwrap();
        let err = BatchRepository::consume(&mut conn, &batch.id, 2.0)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let stored = BatchRepository::fetch(&mut conn, &batch.id).await.unwrap().unwrap();
        assert!((stored.remaining_quantity - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_depleted_batches_count_towards_totals_only() {
        let (db, product_id) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let first = purchase(&product_id, 3.0, 5.0, 1);
        let second = purchase(&product_id, 7.0, 8.0, 2);
        BatchRepository::insert(&mut conn, &first).await.unwrap();
        BatchRepository::insert(&mut conn, &second).await.unwrap();
        BatchRepository::consume(&mut conn, &first.id, 3.0).await.unwrap();

        let available = BatchRepository::fetch_available(&mut conn, &product_id)
            .await
            .unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].batch_id, second.id);

        let totals = BatchRepository::purchase_totals(&mut conn, &product_id)
            .await
            .unwrap();
        assert_eq!(totals.total_purchased, 10.0);
        assert_eq!(totals.total_remaining, 7.0);
    }

    #[tokio::test]
    async fn test_restore_caps_at_original_quantity() {
        let (db, product_id) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let batch = purchase(&product_id, 4.0, 2.5, 1);
        BatchRepository::insert(&mut conn, &batch).await.unwrap();
        BatchRepository::consume(&mut conn, &batch.id, 1.0).await.unwrap();

        assert!(BatchRepository::restore(&mut conn, &batch.id, 3.0).await.unwrap());
        let stored = BatchRepository::fetch(&mut conn, &batch.id).await.unwrap().unwrap();
        assert_eq!(stored.remaining_quantity, 4.0);

        assert!(!BatchRepository::restore(&mut conn, "gone", 1.0).await.unwrap());
    }

    #[tokio::test]
    async fn test_allocation_source_round_trips() {
        let (db, product_id) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let supply = purchase(&product_id, 5.0, 4.0, 1);
        BatchRepository::insert(&mut conn, &supply).await.unwrap();

        let reference = BatchReference::transaction("txn-7");
        let allocation = InventoryBatch {
            id: generate_batch_id(),
            product_id: product_id.clone(),
            batch_type: BatchType::Sale,
            quantity: 2.0,
            remaining_quantity: 0.0,
            unit_cost: 4.0,
            reference: reference.clone(),
            source: Some(BatchSource::Batch {
                batch_id: supply.id.clone(),
            }),
            notes: Some("FIFO sale".to_string()),
            created_by: Some("cashier".to_string()),
            created_at: Utc::now(),
        };
        BatchRepository::insert(&mut conn, &allocation).await.unwrap();

        let found = BatchRepository::fetch_sale_allocations(&mut conn, &product_id, &reference)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].source, allocation.source);
        assert_eq!(found[0].reference, reference);

        let other = BatchReference::transaction("txn-8");
        assert!(BatchRepository::fetch_sale_allocations(&mut conn, &product_id, &other)
            .await
            .unwrap()
            .is_empty());

        BatchRepository::delete(&mut conn, &allocation.id).await.unwrap();
        assert!(BatchRepository::delete(&mut conn, &allocation.id).await.is_err());
    }

    #[tokio::test]
    async fn test_non_purchase_rows_cannot_hold_stock() {
        let (db, product_id) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let mut bogus = purchase(&product_id, 2.0, 1.0, 1);
        bogus.batch_type = BatchType::Sale;
        bogus.source = Some(BatchSource::Legacy);

        let err = BatchRepository::insert(&mut conn, &bogus).await.unwrap_err();
        assert!(matches!(err, DbError::QueryFailed(_)));
    }
}
