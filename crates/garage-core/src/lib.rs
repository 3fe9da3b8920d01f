//! # garage-core: Pure Inventory Logic for the Repair Shop
//!
//! This crate holds the part inventory rules as pure functions and plain
//! types, with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Garage Inventory Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   Collaborators (out of scope)                                  │   │
//! │  │   order fulfillment • procurement • reporting / invoicing       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ allocate / receive / return / history  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   garage-db: InventoryLedger + repositories (SQLite)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ garage-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │  ┌─────────┐ ┌──────────┐ ┌────────┐ ┌────────────┐ ┌────────┐ │   │
//! │  │  │ catalog │ │warehouse │ │ batch  │ │ allocation │ │ alerts │ │   │
//! │  │  │  Part   │ │ Zone/Bin │ │ Usage  │ │ FIFO/LIFO/ │ │  low / │ │   │
//! │  │  │  Units  │ │ Location │ │        │ │ FEFO plans │ │ expiry │ │   │
//! │  │  └─────────┘ └──────────┘ └────────┘ └────────────┘ └────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer-cent `Money` with half-up per-unit division
//! - [`audit`] - Audit columns and soft delete, composed into every entity
//! - [`catalog`] - Parts, units of measure, reorder thresholds
//! - [`warehouse`] - Warehouse → zone → bin placement
//! - [`batch`] - Inventory batches and batch usages
//! - [`transaction`] - Append-only stock transaction rows
//! - [`allocation`] - Batch selection and weighted cost
//! - [`alerts`] - Stock-level and expiry alerts
//! - [`stock_check`] - Physical counts and the batch corrections they imply
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output; "today" is always a parameter
//! 2. **No I/O**: storage belongs to garage-db
//! 3. **Integer Money**: all monetary values are cents (i64)
//! 4. **Explicit Errors**: typed errors, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use garage_core::Money;
//!
//! // 5 units at 10.00 and 3 units at 12.00
//! let total = Money::from_cents(1000).multiply_quantity(5)
//!     + Money::from_cents(1200).multiply_quantity(3);
//!
//! assert_eq!(total.per_unit(8), Some(Money::from_cents(1075)));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod alerts;
pub mod allocation;
pub mod audit;
pub mod batch;
pub mod catalog;
pub mod error;
pub mod money;
pub mod stock_check;
pub mod transaction;
pub mod validation;
pub mod warehouse;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use alerts::{AlertKind, AlertSeverity, StockAlert};
pub use allocation::{
    Allocation, AllocationPlan, AllocationPolicy, AllocationRequest, AllocationSlice, CogsMethod,
    PartCost,
};
pub use audit::{Audit, Audited};
pub use batch::{BatchSource, BatchUsage, InventoryBatch, ReceiveBatch};
pub use catalog::{
    ConversionRate, CustomerType, NewPart, Part, PartSourcing, PartUnit, UsageFlags,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use stock_check::{
    CountAdjustment, NewStockCheck, StockCheck, StockCheckItem, StockCheckStatus,
};
pub use transaction::{NewStockTransaction, StockTransaction, TransactionType};
pub use warehouse::{
    BatchLocation, NewBin, NewWarehouse, NewZone, Warehouse, WarehouseBin, WarehouseZone,
};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Days ahead an expiring batch starts raising an alert.
pub const DEFAULT_EXPIRY_WARNING_DAYS: i64 = 30;

/// Default wait for a part's ledger lock before `LockTimeout`.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Default page size when streaming transaction history.
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 100;
