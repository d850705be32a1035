//! # FIFO Ledger Engine
//!
//! Prices, records and reverses sales against oldest-first purchase batches,
//! and receives new stock.
//!
//! ## Operation Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          sell(product, qty)                             │
//! │                                                                         │
//! │  ProductLocks::lock(product)      ← same-product writers queue here    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  begin_immediate(pool)            ← takes the SQLite write lock        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  process_sale(&mut *tx, &lock, ...)                                    │
//! │       ├── load product + batches ──► LedgerView                        │
//! │       ├── stockroom_core::fifo::plan_sale(view, qty)                   │
//! │       ├── per draw: consume batch (guarded) + write allocation record  │
//! │       └── product.quantity -= qty (version guarded)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tx.commit()      any error before this point: tx dropped = rollback   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Callers that write their own rows in the same transaction (a transaction
//! service persisting the sale header, say) use the conn-level methods
//! directly: lock, `Database::begin_write`, `process_sale(&mut *tx, &lock, ..)`,
//! their writes, commit.

mod lock;


pub use lock::{ProductLock, ProductLocks};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::begin_immediate;
use crate::repository::batch::{generate_batch_id, BatchRepository};
use crate::repository::product::ProductRepository;
use stockroom_core::costing::apply_receipt;
use stockroom_core::fifo::{plan_sale, LedgerView, SalePlan};
use stockroom_core::validation::{validate_quantity, validate_reference_id, validate_unit_cost};
use stockroom_core::{
    BatchReference, BatchSource, BatchType, BatchUsage, CostBreakdown, InventoryBatch,
    LedgerStatus, Product, ReceiptOutcome, ReversalDetail, ReversalOutcome, SaleOutcome,
    QUANTITY_EPSILON,
};

// =============================================================================
// Inputs
// =============================================================================

/// A delivery of stock at a known unit cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReceipt {
    pub product_id: String,
    pub quantity: f64,
    pub unit_cost: f64,
    pub reference: BatchReference,
    #[serde(default)]
    pub received_by: Option<String>,
    /// Batch timestamp; defaults to now. Sets the batch's FIFO position.
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StockReceipt {
    pub fn new(
        product_id: impl Into<String>,
        quantity: f64,
        unit_cost: f64,
        reference: BatchReference,
    ) -> Self {
        StockReceipt {
            product_id: product_id.into(),
            quantity,
            unit_cost,
            reference,
            received_by: None,
            received_at: None,
            notes: None,
        }
    }

    pub fn received_by(mut self, user_id: impl Into<String>) -> Self {
        self.received_by = Some(user_id.into());
        self
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = Some(at);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

// =============================================================================
// Engine
// =============================================================================

/// FIFO inventory ledger.
///
/// Obtained from [`crate::Database::ledger`]; all handles from one
/// `Database` share a lock table.
#[derive(Debug, Clone)]
pub struct FifoLedger {
    pool: SqlitePool,
    locks: ProductLocks,
}

impl FifoLedger {
    pub fn new(pool: SqlitePool, locks: ProductLocks) -> Self {
        FifoLedger { pool, locks }
    }

    /// Waits for exclusive write access to a product.
    pub async fn lock(&self, product_id: &str) -> ProductLock {
        self.locks.lock(product_id).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Loads everything the planner needs for one product.
    pub async fn load_view(conn: &mut SqliteConnection, product: &Product) -> DbResult<LedgerView> {
        let available = BatchRepository::fetch_available(conn, &product.id).await?;
        let totals = BatchRepository::purchase_totals(conn, &product.id).await?;

        Ok(LedgerView {
            product_id: product.id.clone(),
            product_quantity: product.quantity,
            product_cost: product.cost,
            total_purchased: totals.total_purchased,
            available,
        })
    }

    /// Full allocation plan for selling `quantity` units, without writing.
    pub async fn plan(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: f64,
    ) -> DbResult<SalePlan> {
        validate_quantity(quantity)?;
        let product = ProductRepository::fetch_required(conn, product_id).await?;
        let view = Self::load_view(conn, &product).await?;
        Ok(plan_sale(&view, quantity)?)
    }

    /// FIFO cost of selling `quantity` units now. Read-only and repeatable.
    ///
    /// ## Errors
    /// * `ProductNotFound`
    /// * `InsufficientInventory` - fewer than `quantity` units on hand
    /// * `Validation` - quantity not positive and finite
    pub async fn calculate_cost(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: f64,
    ) -> DbResult<CostBreakdown> {
        let plan = self.plan(conn, product_id, quantity).await?;
        let breakdown = plan.breakdown();

        debug!(
            product_id = %product_id,
            quantity,
            total_cost = breakdown.total_cost,
            legacy_quantity_used = breakdown.legacy_quantity_used,
            "Calculated FIFO cost"
        );

        Ok(breakdown)
    }

    /// Conservation check for one product.
    pub async fn status(conn: &mut SqliteConnection, product_id: &str) -> DbResult<LedgerStatus> {
        let product = ProductRepository::fetch_required(conn, product_id).await?;
        let view = Self::load_view(conn, &product).await?;

        let tracked_remaining = view.tracked_remaining();
        let legacy_quantity = view.legacy_quantity();

        Ok(LedgerStatus {
            product_id: product.id,
            product_quantity: product.quantity,
            tracked_remaining,
            total_purchased: view.total_purchased,
            legacy_quantity,
            discrepancy: product.quantity - (tracked_remaining + legacy_quantity),
        })
    }

    // =========================================================================
    // Writes (caller owns the transaction and the lock)
    // =========================================================================

    /// Records a sale: draws stock oldest first, writes one `sale`
    /// allocation per source and decrements the product quantity.
    ///
    /// Must run inside the caller's transaction. On error the caller drops the
    /// transaction and nothing is persisted.
    ///
    /// ## Errors
    /// * `ProductNotFound`, `InsufficientInventory`, `Validation`
    /// * `Conflict` - a batch or the product changed under us
    /// * `LockMismatch` - `lock` guards another product
    pub async fn process_sale(
        &self,
        conn: &mut SqliteConnection,
        lock: &ProductLock,
        product_id: &str,
        quantity: f64,
        reference: &BatchReference,
        user_id: &str,
    ) -> DbResult<SaleOutcome> {
        lock.ensure_covers(product_id)?;
        validate_quantity(quantity)?;
        validate_reference_id(&reference.id)?;

        let product = ProductRepository::fetch_required(conn, product_id).await?;
        let view = Self::load_view(conn, &product).await?;
        let plan = plan_sale(&view, quantity)?;

        let now = Utc::now();
        let mut batches_used = Vec::with_capacity(plan.draws.len());

        for draw in &plan.draws {
            if let BatchSource::Batch { batch_id } = &draw.source {
                BatchRepository::consume(conn, batch_id, draw.quantity).await?;
            }

            let allocation = InventoryBatch {
                id: generate_batch_id(),
                product_id: product_id.to_string(),
                batch_type: BatchType::Sale,
                quantity: draw.quantity,
                remaining_quantity: 0.0,
                unit_cost: draw.unit_cost,
                reference: reference.clone(),
                source: Some(draw.source.clone()),
                notes: Some(allocation_note(&draw.source)),
                created_by: Some(user_id.to_string()),
                created_at: now,
            };
            BatchRepository::insert(conn, &allocation).await?;

            batches_used.push(BatchUsage {
                allocation_id: allocation.id,
                source: draw.source.clone(),
                quantity: draw.quantity,
                unit_cost: draw.unit_cost,
            });
        }

        let new_quantity = (product.quantity - quantity).max(0.0);
        ProductRepository::set_quantity(conn, product_id, new_quantity, product.version).await?;

        if plan.is_product_cost_fallback() {
            warn!(
                product_id = %product_id,
                quantity,
                unit_cost = product.cost,
                "No batches or legacy stock, sale priced at product cost"
            );
        }

        info!(
            product_id = %product_id,
            reference = %reference.id,
            quantity,
            total_cost = plan.total_cost,
            allocations = batches_used.len(),
            legacy_quantity_used = plan.legacy_quantity_used(),
            "Sale processed"
        );

        Ok(SaleOutcome {
            product_id: product_id.to_string(),
            quantity,
            weighted_average_cost: plan.weighted_average_cost,
            total_cost: plan.total_cost,
            batches_used,
        })
    }

    /// Undoes the sale recorded under `reference`: restores consumed batches,
    /// deletes its allocation records and adds the units back to the product.
    ///
    /// Without allocation records only a `return` record is written for
    /// `quantity`; stock and batches stay as they are. Reversing the same
    /// reference twice therefore never adds units.
    pub async fn reverse_sale(
        &self,
        conn: &mut SqliteConnection,
        lock: &ProductLock,
        product_id: &str,
        quantity: f64,
        reference: &BatchReference,
        user_id: &str,
    ) -> DbResult<ReversalOutcome> {
        lock.ensure_covers(product_id)?;
        validate_quantity(quantity)?;
        validate_reference_id(&reference.id)?;

        let product = ProductRepository::fetch_required(conn, product_id).await?;
        let allocations =
            BatchRepository::fetch_sale_allocations(conn, product_id, reference).await?;

        if allocations.is_empty() {
            return self
                .reverse_untracked(conn, &product, quantity, reference, user_id)
                .await;
        }

        let mut details = Vec::with_capacity(allocations.len());
        let mut quantity_reversed = 0.0;

        for allocation in allocations {
            // Allocations always carry a source; a bare one restores nothing.
            let source = allocation.source.clone().unwrap_or(BatchSource::Legacy);

            let batch_restored = match &source {
                BatchSource::Batch { batch_id } => {
                    let restored =
                        BatchRepository::restore(conn, batch_id, allocation.quantity).await?;
                    if !restored {
                        warn!(
                            product_id = %product_id,
                            batch_id = %batch_id,
                            quantity = allocation.quantity,
                            "Source batch missing during reversal, restoring aggregate only"
                        );
                    }
                    restored
                }
                BatchSource::Legacy | BatchSource::ProductCost => false,
            };

            BatchRepository::delete(conn, &allocation.id).await?;
            quantity_reversed += allocation.quantity;

            details.push(ReversalDetail {
                allocation_id: allocation.id,
                source,
                quantity: allocation.quantity,
                batch_restored,
            });
        }

        if (quantity_reversed - quantity).abs() > QUANTITY_EPSILON {
            warn!(
                product_id = %product_id,
                reference = %reference.id,
                requested = quantity,
                recorded = quantity_reversed,
                "Reversal quantity differs from recorded allocations, using recorded"
            );
        }

        ProductRepository::set_quantity(
            conn,
            product_id,
            product.quantity + quantity_reversed,
            product.version,
        )
        .await?;

        info!(
            product_id = %product_id,
            reference = %reference.id,
            quantity_reversed,
            records = details.len(),
            "Sale reversed"
        );

        Ok(ReversalOutcome {
            product_id: product_id.to_string(),
            quantity_reversed,
            records_reversed: details.len(),
            details,
            fallback_return_id: None,
        })
    }

    async fn reverse_untracked(
        &self,
        conn: &mut SqliteConnection,
        product: &Product,
        quantity: f64,
        reference: &BatchReference,
        user_id: &str,
    ) -> DbResult<ReversalOutcome> {
        warn!(
            product_id = %product.id,
            reference = %reference.id,
            quantity,
            "No allocation records for reversal, writing return record only"
        );

        let record = InventoryBatch {
            id: generate_batch_id(),
            product_id: product.id.clone(),
            batch_type: BatchType::Return,
            quantity,
            remaining_quantity: 0.0,
            unit_cost: product.cost,
            reference: reference.clone(),
            source: None,
            notes: Some(format!(
                "Return of {quantity} units without allocation records, stock unchanged"
            )),
            created_by: Some(user_id.to_string()),
            created_at: Utc::now(),
        };
        BatchRepository::insert(conn, &record).await?;

        Ok(ReversalOutcome {
            product_id: product.id.clone(),
            quantity_reversed: 0.0,
            records_reversed: 0,
            details: Vec::new(),
            fallback_return_id: Some(record.id),
        })
    }

    /// Receives stock: new purchase batch, cost history entry, recomputed
    /// average cost and increased product quantity.
    pub async fn receive_stock(
        &self,
        conn: &mut SqliteConnection,
        lock: &ProductLock,
        receipt: &StockReceipt,
    ) -> DbResult<ReceiptOutcome> {
        lock.ensure_covers(&receipt.product_id)?;
        validate_quantity(receipt.quantity)?;
        validate_unit_cost(receipt.unit_cost)?;
        validate_reference_id(&receipt.reference.id)?;

        let mut product = ProductRepository::fetch_required(conn, &receipt.product_id).await?;
        let version = product.version;
        let received_at = receipt.received_at.unwrap_or_else(Utc::now);

        let entry = apply_receipt(&mut product, receipt.quantity, receipt.unit_cost, received_at)?;

        let batch = InventoryBatch {
            id: generate_batch_id(),
            product_id: product.id.clone(),
            batch_type: BatchType::Purchase,
            quantity: receipt.quantity,
            remaining_quantity: receipt.quantity,
            unit_cost: receipt.unit_cost,
            reference: receipt.reference.clone(),
            source: None,
            notes: receipt.notes.clone(),
            created_by: receipt.received_by.clone(),
            created_at: received_at,
        };
        BatchRepository::insert(conn, &batch).await?;
        ProductRepository::record_receipt(conn, &product, &entry, version).await?;

        info!(
            product_id = %product.id,
            batch_id = %batch.id,
            quantity = receipt.quantity,
            unit_cost = receipt.unit_cost,
            product_cost = product.cost,
            "Stock received"
        );

        Ok(ReceiptOutcome {
            batch,
            product_quantity: product.quantity,
            product_cost: product.cost,
        })
    }

    // =========================================================================
    // Pool-level wrappers (own lock + transaction)
    // =========================================================================

    /// [`calculate_cost`](Self::calculate_cost) on a pooled connection.
    pub async fn quote(&self, product_id: &str, quantity: f64) -> DbResult<CostBreakdown> {
        let mut conn = self.pool.acquire().await?;
        self.calculate_cost(&mut conn, product_id, quantity).await
    }

    /// Locks the product and runs [`process_sale`](Self::process_sale) in its
    /// own transaction.
    pub async fn sell(
        &self,
        product_id: &str,
        quantity: f64,
        reference: &BatchReference,
        user_id: &str,
    ) -> DbResult<SaleOutcome> {
        let lock = self.lock(product_id).await;
        let mut tx = begin_immediate(&self.pool).await?;

        let outcome = self
            .process_sale(&mut *tx, &lock, product_id, quantity, reference, user_id)
            .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok(outcome)
    }

    /// Locks the product and runs [`reverse_sale`](Self::reverse_sale) in its
    /// own transaction.
    pub async fn reverse(
        &self,
        product_id: &str,
        quantity: f64,
        reference: &BatchReference,
        user_id: &str,
    ) -> DbResult<ReversalOutcome> {
        let lock = self.lock(product_id).await;
        let mut tx = begin_immediate(&self.pool).await?;

        let outcome = self
            .reverse_sale(&mut *tx, &lock, product_id, quantity, reference, user_id)
            .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok(outcome)
    }

    /// Locks the product and runs [`receive_stock`](Self::receive_stock) in
    /// its own transaction.
    pub async fn receive(&self, receipt: &StockReceipt) -> DbResult<ReceiptOutcome> {
        let lock = self.lock(&receipt.product_id).await;
        let mut tx = begin_immediate(&self.pool).await?;

        let outcome = self.receive_stock(&mut *tx, &lock, receipt).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok(outcome)
    }

    /// Conservation check on a pooled connection.
    pub async fn ledger_status(&self, product_id: &str) -> DbResult<LedgerStatus> {
        let mut conn = self.pool.acquire().await?;
        Self::status(&mut conn, product_id).await
    }

    /// Every movement record of a product, oldest first.
    pub async fn batch_history(&self, product_id: &str) -> DbResult<Vec<InventoryBatch>> {
        let mut conn = self.pool.acquire().await?;
        ProductRepository::fetch_required(&mut conn, product_id).await?;
        BatchRepository::fetch_history(&mut conn, product_id).await
    }
}

fn allocation_note(source: &BatchSource) -> String {
    match source {
        BatchSource::Batch { batch_id } => format!("FIFO sale from batch {batch_id}"),
        BatchSource::Legacy => "FIFO sale from legacy stock".to_string(),
        BatchSource::ProductCost => "Sale at product cost, no batches on hand".to_string(),
    }
}
