//! # Validation Module
//!
//! Input validation for the inventory core.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (pure Rust)                                      │
//! │  ├── Codes, names, unit names (format + length)                        │
//! │  └── Quantities and amounts (sign)                                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Ledger (garage-db)                                           │
//! │  ├── Stock availability, over-return                                   │
//! │  └── Location consistency                                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints on quantities                                   │
//! │  ├── UNIQUE constraints on codes                                       │
//! │  └── Append-only triggers on stock_transactions                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use garage_core::validation::{validate_code, validate_positive_quantity};
//!
//! assert!(validate_code("code", "WH-MAIN").is_ok());
//! assert!(validate_positive_quantity("quantity", 0).is_err());
//! ```

use crate::catalog::{ConversionRate, NewPart};
use crate::error::{CoreError, CoreResult, ValidationError};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_CODE_LEN: usize = 50;
const MAX_NAME_LEN: usize = 200;
const MAX_UNIT_NAME_LEN: usize = 30;
const MAX_QUERY_LEN: usize = 100;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a business code (part number, SKU, warehouse/zone/bin code,
/// batch number).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, `-`, `_` and `.` only
///
/// ## Example
/// ```rust
/// use garage_core::validation::validate_code;
///
/// assert!(validate_code("part_number", "BRK-PAD-01").is_ok());
/// assert!(validate_code("part_number", "").is_err());
/// assert!(validate_code("part_number", "has space").is_err());
/// ```
pub fn validate_code(field: &str, code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if code.len() > MAX_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_CODE_LEN,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, underscores and dots"
                .to_string(),
        });
    }

    Ok(())
}

/// Validates a display name.
///
/// ## Rules
/// - Must not be empty
/// - At most 200 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a unit-of-measure name ("piece", "box", "litre").
pub fn validate_unit_name(unit_name: &str) -> ValidationResult<()> {
    let unit_name = unit_name.trim();

    if unit_name.is_empty() {
        return Err(ValidationError::Required {
            field: "unit_name".to_string(),
        });
    }

    if unit_name.len() > MAX_UNIT_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "unit_name".to_string(),
            max: MAX_UNIT_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a search query and returns it trimmed. Empty is allowed.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > MAX_QUERY_LEN {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: MAX_QUERY_LEN,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity that must be strictly positive.
///
/// Maps straight to the ledger's `InvalidQuantity` error kind rather than a
/// field-level validation error.
///
/// ## User Workflow
/// ```text
/// Service order adds 0 brake pads
///      │
///      ▼
/// validate_positive_quantity("quantity", 0) ← THIS FUNCTION
///      │
///      └── InvalidQuantity { field: "quantity", value: 0 }
/// ```
pub fn validate_positive_quantity(field: &str, qty: i64) -> CoreResult<()> {
    if qty <= 0 {
        return Err(CoreError::invalid_quantity(field, qty));
    }
    Ok(())
}

/// Validates an amount in cents that may be zero but not negative.
///
/// ## Example
/// ```rust
/// use garage_core::validation::validate_non_negative_cents;
///
/// assert!(validate_non_negative_cents("unit_cost", 1099).is_ok());
/// assert!(validate_non_negative_cents("unit_cost", 0).is_ok());
/// assert!(validate_non_negative_cents("unit_cost", -100).is_err());
/// ```
pub fn validate_non_negative_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

/// Validates a stock threshold (minimum stock / reorder level).
pub fn validate_threshold(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

pub fn validate_conversion_rate(rate: ConversionRate) -> ValidationResult<()> {
    if !rate.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "conversion_rate".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates every field of a new catalog entry.
pub fn validate_new_part(part: &NewPart) -> ValidationResult<()> {
    validate_code("part_number", &part.part_number)?;
    validate_name("name", &part.name)?;
    if let Some(sku) = &part.sku {
        validate_code("sku", sku)?;
    }
    if let Some(barcode) = &part.barcode {
        validate_code("barcode", barcode)?;
    }
    validate_unit_name(&part.default_unit)?;
    validate_non_negative_cents("cost_price_cents", part.cost_price_cents)?;
    validate_non_negative_cents("sell_price_cents", part.sell_price_cents)?;
    validate_threshold("minimum_stock", part.minimum_stock)?;
    if let Some(level) = part.reorder_level {
        validate_threshold("reorder_level", level)?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
