//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Batch cost basis must never drift: a part received at 12.00 is        │
//! │  issued at exactly 12.00, no matter how many times it is moved.        │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    Every cost and price is an i64 count of minor units.                │
//! │    Division happens in exactly one place (weighted average) and        │
//! │    rounds half-up to the minor unit.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use garage_core::money::Money;
//!
//! let unit_cost = Money::from_cents(1200); // 12.00
//! let line_cost = unit_cost.multiply_quantity(3);
//! assert_eq!(line_cost.cents(), 3600);
//!
//! // (5 × 10.00 + 3 × 12.00) / 8 = 10.75
//! let total = Money::from_cents(5 * 1000 + 3 * 1200);
//! assert_eq!(total.per_unit(8).map(|m| m.cents()), Some(1075));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for compensating entries
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Transparent serde**: serialises as a bare integer of cents
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Batch.unit_cost ──► BatchUsage.unit_cost ──► Allocation.total_cost     │
/// │                                              │                          │
/// │                                              ▼                          │
/// │                                   Allocation.weighted_unit_cost         │
/// │                                                                         │
/// │  Part.sell_price ──► BatchUsage.unit_price ──► invoicing collaborator   │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use garage_core::money::Money;
    ///
    /// let cost = Money::from_cents(1099);
    /// assert_eq!(cost.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Note
    /// For negative amounts, only the major unit should be negative.
    /// `from_major_minor(-5, 50)` = -5.50, not -4.50
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents (smallest currency unit).
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use garage_core::money::Money;
    ///
    /// let unit_cost = Money::from_cents(1000);
    /// assert_eq!(unit_cost.multiply_quantity(5).cents(), 5000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Divides a total across `quantity` units, rounding half-up to the cent.
    ///
    /// Returns `None` when `quantity` is not positive.
    ///
    /// ## Rounding
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │  ROUND HALF UP (away from zero for the .5 case)                    │
    /// │                                                                     │
    /// │  8600 / 8  = 1075.0   → 1075   (10.75)                             │
    /// │  1000 / 3  =  333.33  →  333   ( 3.33)                             │
    /// │  2000 / 3  =  666.67  →  667   ( 6.67)                             │
    /// │    25 / 2  =   12.5   →   13   ( 0.13)                             │
    /// │                                                                     │
    /// │  Integer form: (2 × total + qty) / (2 × qty)                        │
    /// └─────────────────────────────────────────────────────────────────────┘
    /// ```
    ///
    /// Used for the weighted average unit cost of an allocation and for the
    /// part-level average cost shown to collaborators.
    pub fn per_unit(&self, quantity: i64) -> Option<Money> {
        if quantity <= 0 {
            return None;
        }
        // i128 keeps 2 × total from overflowing on very large ledgers
        let total = self.0 as i128;
        let qty = quantity as i128;
        let rounded = if total >= 0 {
            (2 * total + qty) / (2 * qty)
        } else {
            -((2 * -total + qty) / (2 * qty))
        };
        Some(Money(rounded as i64))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering with two minor digits (no currency symbol).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Multiplication by i64 (for quantity calculations).
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 75).cents(), 1075);
        assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1075).to_string(), "10.75");
        assert_eq!(Money::from_cents(500).to_string(), "5.00");
        assert_eq!(Money::from_cents(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);
        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.cents(), 2000);
    }

    /// B1: 5 @ 10.00, B2: 3 @ 12.00 → 86.00 / 8 = 10.75 exactly.
    #[test]
    fn test_per_unit_exact() {
        let total = Money::from_cents(1000).multiply_quantity(5)
            + Money::from_cents(1200).multiply_quantity(3);
        assert_eq!(total.per_unit(8), Some(Money::from_cents(1075)));
    }

    #[test]
    fn test_per_unit_rounds_half_up() {
        assert_eq!(Money::from_cents(1000).per_unit(3).unwrap().cents(), 333);
        assert_eq!(Money::from_cents(2000).per_unit(3).unwrap().cents(), 667);
        assert_eq!(Money::from_cents(25).per_unit(2).unwrap().cents(), 13);
        assert_eq!(Money::from_cents(-25).per_unit(2).unwrap().cents(), -13);
    }

    #[test]
    fn test_per_unit_rejects_non_positive_quantity() {
        assert_eq!(Money::from_cents(100).per_unit(0), None);
        assert_eq!(Money::from_cents(100).per_unit(-4), None);
    }

    #[test]
    fn test_serializes_as_bare_cents() {
        let json = serde_json::to_string(&Money::from_cents(1075)).unwrap();
        assert_eq!(json, "1075");
    }
}
