//! # Error Types
//!
//! Domain-specific error types for garage-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  garage-core errors (this file)                                        │
//! │  ├── CoreError        - Inventory rule violations                      │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  garage-db errors (separate crate)                                     │
//! │  └── DbError          - Storage failures + wraps CoreError             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → collaborator            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (part id, batch id, quantities)
//! 3. Errors are enum variants, never String
//! 4. Every rejected operation leaves ledger state unchanged

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Inventory rule violations.
///
/// All of these are local, recoverable conditions. They are reported to the
/// caller as typed results; the caller decides whether to retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Referenced entity is absent (or soft-deleted).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Quantity is zero, negative, or otherwise unusable.
    #[error("Invalid quantity for {field}: {value}")]
    InvalidQuantity { field: String, value: i64 },

    /// Allocation cannot be satisfied from the eligible batches.
    ///
    /// ## User Workflow
    /// ```text
    /// Service order needs 20 brake pads
    ///      │
    ///      ▼
    /// Eligible batches: B1 (5) + B2 (10) = 15
    ///      │
    ///      ▼
    /// InsufficientStock { part_id, available: 15, requested: 20 }
    ///      │
    ///      ▼
    /// Nothing is written. Retrying without a new receipt will fail again.
    /// ```
    #[error("Insufficient stock for part {part_id}: available {available}, requested {requested}")]
    InsufficientStock {
        part_id: i64,
        available: i64,
        requested: i64,
    },

    /// A return or positive adjustment would push a batch above what was received.
    #[error(
        "Cannot return {requested} to batch {batch_id}: remaining {remaining} of {received} received"
    )]
    OverReturn {
        batch_id: i64,
        remaining: i64,
        requested: i64,
        received: i64,
    },

    /// The batch is expired, deactivated or deleted and cannot take stock back.
    #[error("Batch {batch_id} is unavailable: {reason}")]
    BatchUnavailable { batch_id: i64, reason: String },

    /// A code is already taken within its parent scope.
    ///
    /// ## When This Occurs
    /// - Warehouse code already exists
    /// - Zone or bin code already exists in the warehouse
    /// - Batch number already exists for the part
    /// - Part number, SKU or barcode already exists
    #[error("Duplicate code '{code}' in {scope}")]
    DuplicateCode { scope: String, code: String },

    /// The (part, unit name) pair already exists.
    #[error("Unit '{unit_name}' is already registered for part {part_id}")]
    DuplicateUnitName { part_id: i64, unit_name: String },

    /// Could not obtain the part's ledger lock within the configured wait.
    #[error("Timed out after {waited_ms}ms waiting for the ledger lock on part {part_id}")]
    LockTimeout { part_id: i64, waited_ms: u64 },

    /// A row changed between read and write (lost compare-and-swap).
    #[error("{entity} {id} was modified concurrently")]
    ConcurrentModification { entity: String, id: i64 },

    /// A caller tried to write on-hand quantity outside the ledger.
    #[error("On-hand quantity of part {part_id} is ledger-owned (stored {stored}, given {given})")]
    StockWriteRejected {
        part_id: i64,
        stored: i64,
        given: i64,
    },

    /// Warehouse / zone / bin combination is not a valid placement.
    #[error("Invalid location: {reason}")]
    InvalidLocation { reason: String },

    /// A part cannot be deleted while its batches still hold stock.
    #[error("Part {part_id} still holds {quantity} unit(s) in stocked batches")]
    StockRemaining { part_id: i64, quantity: i64 },

    /// A stock count found more units than the part's batches have room for.
    ///
    /// ## When This Occurs
    /// - Counted quantity exceeds on-hand by more than
    ///   Σ (received − remaining) over the part's usable batches
    ///
    /// The surplus has no cost basis; receive it as a new batch instead.
    #[error("Counted surplus of {surplus} for part {part_id} exceeds batch headroom of {headroom}")]
    CountSurplus {
        part_id: i64,
        surplus: i64,
        headroom: i64,
    },

    /// A stock check is not in the state the operation needs.
    #[error("Stock check {check_id} is {status}, expected {expected}")]
    StockCheckState {
        check_id: i64,
        status: String,
        expected: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Creates an InvalidQuantity error.
    pub fn invalid_quantity(field: impl Into<String>, value: i64) -> Self {
        CoreError::InvalidQuantity {
            field: field.into(),
            value,
        }
    }

    /// Creates a DuplicateCode error.
    pub fn duplicate_code(scope: impl Into<String>, code: impl Into<String>) -> Self {
        CoreError::DuplicateCode {
            scope: scope.into(),
            code: code.into(),
        }
    }

    /// Returns true if retrying the same request may succeed.
    ///
    /// Lock contention and lost races are transient. Stock-level and input
    /// errors are not: retrying without new stock or new input fails again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::LockTimeout { .. } | CoreError::ConcurrentModification { .. }
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when input doesn't meet requirements.
/// Used for early validation before any ledger work starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., bad code characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
