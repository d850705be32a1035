//! # Domain Types
//!
//! Core domain types of the inventory ledger.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐        ┌──────────────────────┐                   │
//! │  │    Product      │ 1    * │   InventoryBatch     │                   │
//! │  │  ─────────────  │◄───────│  ──────────────────  │                   │
//! │  │  quantity       │        │  batch_type          │                   │
//! │  │  cost (avg)     │        │  quantity            │                   │
//! │  │  cost_history   │        │  remaining_quantity  │                   │
//! │  │  version        │        │  unit_cost           │                   │
//! │  └─────────────────┘        │  reference {kind,id} │                   │
//! │                             │  source (sale only)  │                   │
//! │                             └──────────────────────┘                   │
//! │                                                                         │
//! │  BatchSource: Batch { batch_id } | Legacy | ProductCost                │
//! │  (which supply a sale allocation was drawn from)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Quantities and costs are `f64`. Costs accumulate without rounding; callers
//! round for display only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::QUANTITY_EPSILON;

// =============================================================================
// Product
// =============================================================================

/// One entry of a product's purchase-side cost log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostHistoryEntry {
    /// Unit cost paid.
    pub cost: f64,
    /// Units received at that cost.
    pub quantity: f64,
    #[ts(as = "String")]
    pub recorded_at: DateTime<Utc>,
}

/// The per-product aggregate maintained by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Units on hand: tracked batch remainder plus legacy stock.
    pub quantity: f64,

    /// Weighted-average unit cost over `cost_history`.
    pub cost: f64,

    /// Purchase-side cost log, oldest first. Never read by FIFO sale logic.
    pub cost_history: Vec<CostHistoryEntry>,

    /// Optimistic concurrency counter, bumped on every write.
    pub version: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Batch Type
// =============================================================================

/// Kind of inventory movement stored in the batch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum BatchType {
    /// Supply: stock received at a known cost.
    Purchase,
    /// Allocation record: the part of a sale drawn from one source.
    Sale,
    Adjustment,
    /// Stock returned without a traceable allocation.
    Return,
    Transfer,
}

// =============================================================================
// Reference
// =============================================================================

/// What kind of operation created a movement record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// A POS transaction (sale, refund, deletion).
    Transaction,
    /// A purchase / restock receipt.
    Restock,
    /// A manual stock adjustment.
    Adjustment,
}

/// Pointer from a movement record to the operation that created it.
///
/// Sale allocations are found again at reversal time by this reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchReference {
    pub kind: ReferenceKind,
    pub id: String,
}

impl BatchReference {
    /// Reference to a POS transaction.
    pub fn transaction(id: impl Into<String>) -> Self {
        BatchReference {
            kind: ReferenceKind::Transaction,
            id: id.into(),
        }
    }

    /// Reference to a restock / purchase receipt.
    pub fn restock(id: impl Into<String>) -> Self {
        BatchReference {
            kind: ReferenceKind::Restock,
            id: id.into(),
        }
    }
}

// =============================================================================
// Allocation Source
// =============================================================================

/// Storage discriminant for [`BatchSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Batch,
    Legacy,
    ProductCost,
}

/// Where the units of one sale allocation came from.
///
/// ## Reversal Semantics
/// ```text
/// Batch { batch_id } ──► remaining_quantity of that batch += allocation qty
/// Legacy             ──► nothing to restore (aggregate counter only)
/// ProductCost        ──► nothing to restore (aggregate counter only)
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchSource {
    /// Drawn from a tracked purchase batch.
    Batch { batch_id: String },
    /// Drawn from untracked stock that predates batch tracking.
    Legacy,
    /// No batches and no legacy stock: priced at the product's current cost.
    ProductCost,
}

impl BatchSource {
    /// Storage discriminant.
    pub fn kind(&self) -> SourceKind {
        match self {
            BatchSource::Batch { .. } => SourceKind::Batch,
            BatchSource::Legacy => SourceKind::Legacy,
            BatchSource::ProductCost => SourceKind::ProductCost,
        }
    }

    /// Source purchase batch id, if any.
    pub fn batch_id(&self) -> Option<&str> {
        match self {
            BatchSource::Batch { batch_id } => Some(batch_id),
            _ => None,
        }
    }

    /// Rebuilds a source from its stored columns.
    ///
    /// Returns `None` for a `batch` kind without a batch id.
    pub fn from_parts(kind: SourceKind, batch_id: Option<String>) -> Option<Self> {
        match kind {
            SourceKind::Batch => batch_id.map(|batch_id| BatchSource::Batch { batch_id }),
            SourceKind::Legacy => Some(BatchSource::Legacy),
            SourceKind::ProductCost => Some(BatchSource::ProductCost),
        }
    }
}

// =============================================================================
// Inventory Batch
// =============================================================================

/// One row of the batch store: a purchase batch or a movement record.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryBatch {
    pub id: String,
    pub product_id: String,
    pub batch_type: BatchType,
    /// Original movement quantity. Immutable.
    pub quantity: f64,
    /// Unconsumed part of a purchase batch; always 0 for other types.
    pub remaining_quantity: f64,
    pub unit_cost: f64,
    pub reference: BatchReference,
    /// Set on sale allocations only.
    pub source: Option<BatchSource>,
    /// Human-readable provenance. Never parsed.
    pub notes: Option<String>,
    pub created_by: Option<String>,
    /// Defines FIFO order among purchase batches.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl InventoryBatch {
    /// Whether this row is supply that sales can draw from.
    #[inline]
    pub fn is_purchase(&self) -> bool {
        self.batch_type == BatchType::Purchase
    }

    /// Units already drawn from a purchase batch.
    pub fn consumed_quantity(&self) -> f64 {
        (self.quantity - self.remaining_quantity).max(0.0)
    }

    /// True once nothing is left to draw.
    pub fn is_depleted(&self) -> bool {
        self.remaining_quantity <= QUANTITY_EPSILON
    }
}

// =============================================================================
// Engine Results
// =============================================================================

/// Result of the read-only cost calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CostBreakdown {
    pub quantity: f64,
    /// `total_cost / quantity`, unrounded.
    pub weighted_average_cost: f64,
    pub total_cost: f64,
    /// Units the sale would take from untracked legacy stock.
    pub legacy_quantity_used: f64,
}

/// One source that funded a processed sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BatchUsage {
    /// Id of the `sale` allocation record written for this draw.
    pub allocation_id: String,
    pub source: BatchSource,
    pub quantity: f64,
    pub unit_cost: f64,
}

impl BatchUsage {
    pub fn line_cost(&self) -> f64 {
        self.quantity * self.unit_cost
    }
}

/// Result of processing a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleOutcome {
    pub product_id: String,
    pub quantity: f64,
    pub weighted_average_cost: f64,
    pub total_cost: f64,
    pub batches_used: Vec<BatchUsage>,
}

/// What happened to one allocation record during reversal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReversalDetail {
    pub allocation_id: String,
    pub source: BatchSource,
    pub quantity: f64,
    /// True when units went back into a purchase batch. False for non-batch
    /// sources and when the source batch no longer exists.
    pub batch_restored: bool,
}

/// Result of reversing a sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReversalOutcome {
    pub product_id: String,
    /// Units added back to the product. Zero on the fallback path.
    pub quantity_reversed: f64,
    /// Number of allocation records deleted.
    pub records_reversed: usize,
    pub details: Vec<ReversalDetail>,
    /// Set when no allocations existed and a `return` record was written
    /// for audit. Stock is left untouched in that case.
    pub fallback_return_id: Option<String>,
}

/// Result of receiving stock into a new purchase batch.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptOutcome {
    pub batch: InventoryBatch,
    pub product_quantity: f64,
    pub product_cost: f64,
}

/// Conservation check for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerStatus {
    pub product_id: String,
    pub product_quantity: f64,
    /// Σ remaining_quantity over purchase batches.
    pub tracked_remaining: f64,
    /// Σ quantity over all purchase batches, depleted or not.
    pub total_purchased: f64,
    pub legacy_quantity: f64,
    /// `product_quantity - (tracked_remaining + legacy_quantity)`.
    pub discrepancy: f64,
}

impl LedgerStatus {
    /// True when the conservation law holds within tolerance.
    pub fn is_balanced(&self) -> bool {
        self.discrepancy.abs() <= QUANTITY_EPSILON * self.product_quantity.abs().max(1.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
