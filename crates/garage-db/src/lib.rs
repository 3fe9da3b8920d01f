//! # garage-db: Database Layer and Inventory Ledger
//!
//! SQLite storage for the part inventory, plus the [`InventoryLedger`]: the
//! only code path that changes stock quantities.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Garage Inventory Data Flow                         │
//! │                                                                         │
//! │  Order fulfillment / procurement (collaborators)                       │
//! │       │ allocate, receive_batch, return_to_batch, history              │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     garage-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐   ┌────────────────┐   ┌───────────────┐   │   │
//! │  │   │   Database    │   │ InventoryLedger│   │ Repositories  │   │   │
//! │  │   │   (pool.rs)   │──►│  (ledger/)     │──►│ part, batch,  │   │   │
//! │  │   │ pool + config │   │ locks, units   │   │ usage, stock  │   │   │
//! │  │   │               │   │ of work        │   │ txn, warehouse│   │   │
//! │  │   └───────────────┘   └────────────────┘   └───────────────┘   │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   SQLite (WAL) ── migrations/sqlite/*.sql embedded             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - `garage-inventory.toml` + environment overrides
//! - [`pool`] - Connection pool creation and the [`Database`] handle
//! - [`migrations`] - Embedded database migrations
//! - [`ledger`] - Units of work, per-part locks, lazy history
//! - [`repository`] - Reads and crate-private writers per table
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use garage_db::{Database, InventoryConfig};
//! use garage_core::{AllocationRequest, BatchSource, NewPart, ReceiveBatch};
//!
//! let db = Database::open(&InventoryConfig::load(None)?).await?;
//! let pad = db.parts().create(&NewPart::new("BRK-001", "Front brake pad")).await?;
//!
//! let ledger = db.ledger();
//! ledger.receive_batch(ReceiveBatch::new(pad.id, 10, 1200, BatchSource::Purchase)).await?;
//! let issued = ledger.allocate(AllocationRequest::new(pad.id, 4, 1001)).await?;
//! println!("cost per unit: {}", issued.weighted_unit_cost);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DatabaseSettings, InventoryConfig, LedgerSettings};
pub use error::{DbError, DbResult};
pub use ledger::history::{HistoryPosition, StockHistory};
pub use ledger::locks::{PartGuard, PartLocks};
pub use ledger::stock_count::StockCheckApplication;
pub use ledger::{InventoryLedger, Reconciliation};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::batch::BatchRepository;
pub use repository::part::PartRepository;
pub use repository::stock_check::StockCheckRepository;
pub use repository::stock_transaction::StockTransactionRepository;
pub use repository::usage::UsageRepository;
pub use repository::warehouse::WarehouseRepository;
