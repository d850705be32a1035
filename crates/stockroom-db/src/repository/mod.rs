//! # Repository Module
//!
//! SQL for the ledger's three tables lives here and nowhere else.
//!
//! ```text
//! FifoLedger ──► ProductRepository ──► products, product_cost_history
//!            └─► BatchRepository   ──► inventory_batches
//! ```
//!
//! - [`ProductRepository`](product::ProductRepository) - product aggregate, cost history
//! - [`BatchRepository`](batch::BatchRepository) - purchase batches and movement records

pub mod batch;
pub mod product;
