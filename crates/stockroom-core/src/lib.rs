//! # stockroom-core: Pure Ledger Logic
//!
//! FIFO inventory costing as pure functions. Nothing in this crate touches a
//! database; `stockroom-db` loads a [`fifo::LedgerView`] from storage, asks
//! this crate for a [`fifo::SalePlan`], and persists the result.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Transaction service (external collaborator)            │   │
//! │  │    create sale ──► quote cost ──► persist ──► process sale      │   │
//! │  │    delete sale ──► reverse sale                                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 stockroom-db (FifoLedger)                       │   │
//! │  │         locks, transactions, batch + product repositories       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ LedgerView in, SalePlan out            │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ stockroom-core (THIS CRATE) ★                   │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   fifo    │  │  costing  │  │ validation│  │   │
//! │  │   │  Product  │  │ SalePlan  │  │ avg cost  │  │   rules   │  │   │
//! │  │   │  Batch    │  │ legacy    │  │ history   │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, InventoryBatch, BatchSource, ...)
//! - [`fifo`] - Legacy reconciliation and oldest-first allocation planning
//! - [`costing`] - Purchase-side weighted-average cost
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example
//!
//! ```rust
//! use stockroom_core::fifo::{plan_sale, AvailableBatch, LedgerView};
//!
//! let view = LedgerView {
//!     product_id: "p-1".to_string(),
//!     product_quantity: 10.0,
//!     product_cost: 6.0,
//!     total_purchased: 10.0,
//!     available: vec![
//!         AvailableBatch { batch_id: "b1".into(), remaining_quantity: 3.0, unit_cost: 5.0 },
//!         AvailableBatch { batch_id: "b2".into(), remaining_quantity: 7.0, unit_cost: 8.0 },
//!     ],
//! };
//!
//! let plan = plan_sale(&view, 5.0).unwrap();
//! assert!((plan.weighted_average_cost - 6.2).abs() < 1e-9);
//! ```

pub mod costing;
pub mod error;
pub mod fifo;
pub mod types;
pub mod validation;

pub use error::{CoreError, CoreResult, ValidationError};
pub use types::*;

/// Tolerance used for every quantity comparison in the ledger.
///
/// Quantities are `f64`, so "fully consumed" and "balanced" mean "within
/// this distance of zero".
pub const QUANTITY_EPSILON: f64 = 1e-9;

/// Maximum length of a SKU.
pub const MAX_SKU_LENGTH: usize = 50;

/// Maximum length of a product name.
pub const MAX_PRODUCT_NAME_LENGTH: usize = 200;
