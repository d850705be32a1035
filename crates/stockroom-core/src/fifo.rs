//! # FIFO Allocation Planning
//!
//! Decides which supply a sale consumes, oldest first, and what it costs.
//! Both the read-only cost calculator and the mutating sale processor call
//! [`plan_sale`] on a freshly loaded [`LedgerView`], so a quote and the
//! committed sale can only differ if the ledger changed in between.
//!
//! ## Reconciliation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  total_purchased   = Σ quantity            over ALL purchase batches    │
//! │  tracked_remaining = Σ remaining_quantity  over available batches       │
//! │  consumed          = total_purchased - tracked_remaining                │
//! │  expected_remaining= total_purchased - consumed                         │
//! │  legacy            = max(0, product.quantity - expected_remaining)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consumption Order
//! ```text
//!  demand ──► [ legacy pool ] ──► [ B1 oldest ] ──► [ B2 ] ──► ... [ Bn ]
//!             legacy cost         B1.unit_cost      B2.unit_cost
//!
//!  legacy cost = Σ(remaining·unit_cost) / Σ remaining over available
//!                batches, or product.cost when none are available
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{BatchSource, CostBreakdown};
use crate::validation::validate_quantity;
use crate::QUANTITY_EPSILON;

// =============================================================================
// Ledger View
// =============================================================================

/// A purchase batch that still has stock, as seen by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableBatch {
    pub batch_id: String,
    pub remaining_quantity: f64,
    pub unit_cost: f64,
}

/// Snapshot of one product's ledger, loaded inside a transaction.
///
/// `available` must be ordered oldest first and contain only purchase
/// batches with `remaining_quantity > 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerView {
    pub product_id: String,
    pub product_quantity: f64,
    pub product_cost: f64,
    /// Σ original quantity over every purchase batch, including depleted ones.
    pub total_purchased: f64,
    pub available: Vec<AvailableBatch>,
}

impl LedgerView {
    /// Σ remaining quantity over available batches.
    pub fn tracked_remaining(&self) -> f64 {
        self.available.iter().map(|b| b.remaining_quantity).sum()
    }

    /// How much tracked stock the batch history says should still be on hand.
    pub fn expected_remaining(&self) -> f64 {
        let consumed = self.total_purchased - self.tracked_remaining();
        self.total_purchased - consumed
    }

    /// On-hand quantity not explained by any purchase batch.
    pub fn legacy_quantity(&self) -> f64 {
        (self.product_quantity - self.expected_remaining()).max(0.0)
    }

    /// Unit cost charged for legacy units.
    pub fn legacy_unit_cost(&self) -> f64 {
        let tracked = self.tracked_remaining();
        if tracked <= QUANTITY_EPSILON {
            return self.product_cost;
        }

        let value: f64 = self
            .available
            .iter()
            .map(|b| b.remaining_quantity * b.unit_cost)
            .sum();
        value / tracked
    }
}

// =============================================================================
// Sale Plan
// =============================================================================

/// One slice of a sale taken from a single source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draw {
    pub source: BatchSource,
    pub quantity: f64,
    pub unit_cost: f64,
}

impl Draw {
    pub fn cost(&self) -> f64 {
        self.quantity * self.unit_cost
    }
}

/// The full allocation of a sale across legacy stock and purchase batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalePlan {
    pub product_id: String,
    pub quantity: f64,
    /// Draws in consumption order: legacy first, then batches oldest first.
    pub draws: Vec<Draw>,
    pub total_cost: f64,
    pub weighted_average_cost: f64,
    /// Legacy stock present before the sale.
    pub legacy_quantity_available: f64,
}

impl SalePlan {
    /// Units drawn from the legacy pool.
    pub fn legacy_quantity_used(&self) -> f64 {
        self.draws
            .iter()
            .filter(|d| d.source == BatchSource::Legacy)
            .map(|d| d.quantity)
            .sum()
    }

    /// True when the product had neither batches nor legacy stock.
    pub fn is_product_cost_fallback(&self) -> bool {
        matches!(
            self.draws.as_slice(),
            [Draw {
                source: BatchSource::ProductCost,
                ..
            }]
        )
    }

    /// Draws that consume a tracked purchase batch, with that batch's id.
    pub fn batch_draws(&self) -> impl Iterator<Item = (&str, &Draw)> {
        self.draws
            .iter()
            .filter_map(|d| d.source.batch_id().map(|id| (id, d)))
    }

    /// The calculator's view of this plan.
    pub fn breakdown(&self) -> CostBreakdown {
        CostBreakdown {
            quantity: self.quantity,
            weighted_average_cost: self.weighted_average_cost,
            total_cost: self.total_cost,
            legacy_quantity_used: self.legacy_quantity_used(),
        }
    }
}

// =============================================================================
// Planning
// =============================================================================

/// Plans a sale of `quantity` units against `view`.
///
/// ## Errors
/// - `Validation` if `quantity` is not a positive finite number
/// - `InsufficientInventory` if the product has fewer units on hand
pub fn plan_sale(view: &LedgerView, quantity: f64) -> CoreResult<SalePlan> {
    validate_quantity(quantity)?;

    if quantity - view.product_quantity > QUANTITY_EPSILON {
        return Err(CoreError::insufficient(
            &view.product_id,
            view.product_quantity,
            quantity,
        ));
    }

    let legacy_available = view.legacy_quantity();

    if view.available.is_empty() && legacy_available <= QUANTITY_EPSILON {
        let draw = Draw {
            source: BatchSource::ProductCost,
            quantity,
            unit_cost: view.product_cost,
        };
        return Ok(finish(view, quantity, vec![draw], legacy_available));
    }

    let mut demand = quantity;
    let mut draws = Vec::with_capacity(view.available.len() + 1);

    if legacy_available > QUANTITY_EPSILON {
        let take = demand.min(legacy_available);
        draws.push(Draw {
            source: BatchSource::Legacy,
            quantity: take,
            unit_cost: view.legacy_unit_cost(),
        });
        demand -= take;
    }

    for batch in &view.available {
        if demand <= QUANTITY_EPSILON {
            break;
        }

        let take = demand.min(batch.remaining_quantity);
        if take <= QUANTITY_EPSILON {
            continue;
        }

        draws.push(Draw {
            source: BatchSource::Batch {
                batch_id: batch.batch_id.clone(),
            },
            quantity: take,
            unit_cost: batch.unit_cost,
        });
        demand -= take;
    }

    // Unreachable while product.quantity covers the sale: legacy absorbs any
    // gap between the aggregate and the tracked batches.
    if demand > QUANTITY_EPSILON {
        return Err(CoreError::insufficient(
            &view.product_id,
            quantity - demand,
            quantity,
        ));
    }

    Ok(finish(view, quantity, draws, legacy_available))
}

fn finish(view: &LedgerView, quantity: f64, draws: Vec<Draw>, legacy_available: f64) -> SalePlan {
    let total_cost: f64 = draws.iter().map(Draw::cost).sum();

    SalePlan {
        product_id: view.product_id.clone(),
        quantity,
        draws,
        total_cost,
        weighted_average_cost: total_cost / quantity,
        legacy_quantity_available: legacy_available,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
