//! # Purchase-Side Costing
//!
//! Maintains `Product::cost` as the quantity-weighted average of the cost
//! history. Only receipts append to the history; sales never change `cost`.
//!
//! ```text
//! cost = Σ(entry.cost × entry.quantity) / Σ entry.quantity
//! ```

use chrono::{DateTime, Utc};

use crate::error::CoreResult;
use crate::types::{CostHistoryEntry, Product};
use crate::validation::{validate_quantity, validate_unit_cost};
use crate::QUANTITY_EPSILON;

/// Quantity-weighted average of a cost history.
///
/// Returns `None` when the history carries no quantity.
pub fn weighted_average_cost(history: &[CostHistoryEntry]) -> Option<f64> {
    let quantity: f64 = history.iter().map(|e| e.quantity).sum();
    if quantity <= QUANTITY_EPSILON {
        return None;
    }

    let value: f64 = history.iter().map(|e| e.cost * e.quantity).sum();
    Some(value / quantity)
}

/// Applies a stock receipt to the product aggregate.
///
/// Appends to `cost_history`, recomputes `cost` and adds `quantity` to the
/// on-hand total. Returns the appended entry.
pub fn apply_receipt(
    product: &mut Product,
    quantity: f64,
    unit_cost: f64,
    received_at: DateTime<Utc>,
) -> CoreResult<CostHistoryEntry> {
    validate_quantity(quantity)?;
    validate_unit_cost(unit_cost)?;

    let entry = CostHistoryEntry {
        cost: unit_cost,
        quantity,
        recorded_at: received_at,
    };

    product.cost_history.push(entry.clone());
    if let Some(cost) = weighted_average_cost(&product.cost_history) {
        product.cost = cost;
    }
    product.quantity += quantity;

    Ok(entry)
}
