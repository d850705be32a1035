//! # stockroom-db: Database Layer and FIFO Ledger
//!
//! SQLite persistence for the inventory ledger, plus [`FifoLedger`], the
//! engine that prices, records and reverses sales against purchase batches.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Transaction service / seed binary                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   stockroom-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌───────────────┐   ┌───────────────┐    │   │
//! │  │   │   Database    │   │  FifoLedger   │   │ Repositories  │    │   │
//! │  │   │   (pool.rs)   │──►│  (ledger/)    │──►│ product/batch │    │   │
//! │  │   │ pool + locks  │   │ sell/reverse  │   │  SQL only     │    │   │
//! │  │   └───────────────┘   └───────┬───────┘   └───────────────┘    │   │
//! │  │                               │ LedgerView / SalePlan           │   │
//! │  └───────────────────────────────┼─────────────────────────────────┘   │
//! │                                  ▼                                      │
//! │                     stockroom-core (pure FIFO planning)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockroom_db::{Database, DbConfig, NewProduct, StockReceipt};
//! use stockroom_core::BatchReference;
//!
//! let db = Database::new(DbConfig::from_env()?).await?;
//!
//! let product = db.products().create(NewProduct::new("BEAN-1KG", "Beans 1kg")).await?;
//! db.ledger()
//!     .receive(&StockReceipt::new(&product.id, 10.0, 7.5, BatchReference::restock("po-1")))
//!     .await?;
//!
//! let quote = db.ledger().quote(&product.id, 4.0).await?;
//! let sale = db
//!     .ledger()
//!     .sell(&product.id, 4.0, &BatchReference::transaction("txn-1"), "cashier-1")
//!     .await?;
//! ```

pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use ledger::{FifoLedger, ProductLock, ProductLocks, StockReceipt};
pub use pool::{Database, DbConfig};

pub use repository::batch::{BatchRepository, PurchaseTotals};
pub use repository::product::{NewProduct, ProductRepository};
