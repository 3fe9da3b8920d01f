//! # Catalog Types
//!
//! Part master data: identity, pricing, reorder thresholds and units of measure.
//!
//! ## Ownership of On-Hand Quantity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Part.quantity_in_stock  ◄── written ONLY by the batch ledger          │
//! │        ▲                                                                │
//! │        │  recomputed in the same unit of work                          │
//! │        │                                                                │
//! │  Σ batch.quantity_remaining (active, not expired)                      │
//! │                                                                         │
//! │  Catalog edits (name, prices, thresholds) never touch it.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::audit::Audit;
use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Classification
// =============================================================================

/// OEM / aftermarket classification of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum PartSourcing {
    /// Original equipment manufacturer part.
    Oem,
    /// Third-party replacement part.
    Aftermarket,
}

impl Default for PartSourcing {
    fn default() -> Self {
        PartSourcing::Aftermarket
    }
}

/// Kind of customer a part or batch is being consumed for.
///
/// Batches carry one usability flag per kind; an allocation made for a
/// customer kind only draws from batches whose flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum CustomerType {
    Company,
    Insurance,
    Individual,
}

/// Per-customer-kind usability flags shared by parts and batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct UsageFlags {
    pub can_use_for_company: bool,
    pub can_use_for_insurance: bool,
    pub can_use_for_individual: bool,
}

impl UsageFlags {
    /// Usable for every kind of customer.
    pub const ALL: UsageFlags = UsageFlags {
        can_use_for_company: true,
        can_use_for_insurance: true,
        can_use_for_individual: true,
    };

    pub fn allows(&self, customer_type: CustomerType) -> bool {
        match customer_type {
            CustomerType::Company => self.can_use_for_company,
            CustomerType::Insurance => self.can_use_for_insurance,
            CustomerType::Individual => self.can_use_for_individual,
        }
    }
}

impl Default for UsageFlags {
    fn default() -> Self {
        UsageFlags::ALL
    }
}

// =============================================================================
// Part
// =============================================================================

/// A catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Part {
    pub id: i64,

    /// Shop-facing part number (unique).
    pub part_number: String,

    /// Stock keeping unit (unique when present).
    pub sku: Option<String>,

    /// Barcode (unique when present).
    pub barcode: Option<String>,

    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,

    /// List cost in cents; new batches default to this when no cost is given.
    pub cost_price_cents: i64,

    /// Weighted average cost of the stock on hand, maintained by the ledger.
    pub average_cost_cents: i64,

    /// Default price charged to customers, in cents.
    pub sell_price_cents: i64,

    /// Cached on-hand quantity. Ledger-owned.
    pub quantity_in_stock: i64,

    pub minimum_stock: i64,
    pub reorder_level: Option<i64>,

    /// Unit every quantity in the ledger is expressed in.
    pub default_unit: String,

    pub sourcing: PartSourcing,
    pub is_active: bool,

    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub usage: UsageFlags,

    /// Bumped by every ledger unit of work touching this part.
    pub row_version: i64,

    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub audit: Audit,
}

crate::impl_audited!(Part);

impl Part {
    #[inline]
    pub fn cost_price(&self) -> Money {
        Money::from_cents(self.cost_price_cents)
    }

    #[inline]
    pub fn average_cost(&self) -> Money {
        Money::from_cents(self.average_cost_cents)
    }

    #[inline]
    pub fn sell_price(&self) -> Money {
        Money::from_cents(self.sell_price_cents)
    }

    /// Threshold at or below which the part should be reordered.
    ///
    /// The reorder level wins when set; otherwise the minimum stock is used.
    #[inline]
    pub fn reorder_threshold(&self) -> i64 {
        self.reorder_level.unwrap_or(self.minimum_stock)
    }

    /// True when on-hand stock has fallen to the reorder threshold.
    ///
    /// A part without any threshold (both zero / unset) never needs reorder.
    pub fn needs_reorder(&self) -> bool {
        let threshold = self.reorder_threshold();
        threshold > 0 && self.quantity_in_stock <= threshold
    }

    /// Quantity to order to get back to the target level.
    ///
    /// Target is the reorder level, or twice the minimum stock when no
    /// reorder level is set. Never negative.
    pub fn suggested_reorder_quantity(&self) -> i64 {
        let target = self.reorder_level.unwrap_or(self.minimum_stock * 2);
        (target - self.quantity_in_stock).max(0)
    }
}

/// Input for creating a catalog entry. On-hand always starts at zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPart {
    pub part_number: String,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub cost_price_cents: i64,
    pub sell_price_cents: i64,
    pub minimum_stock: i64,
    pub reorder_level: Option<i64>,
    pub default_unit: String,
    pub sourcing: PartSourcing,
    pub usage: UsageFlags,
    pub created_by: Option<String>,
}

impl NewPart {
    /// Minimal part with zero prices, no thresholds and "piece" as unit.
    pub fn new(part_number: impl Into<String>, name: impl Into<String>) -> Self {
        NewPart {
            part_number: part_number.into(),
            sku: None,
            barcode: None,
            name: name.into(),
            description: None,
            category: None,
            brand: None,
            cost_price_cents: 0,
            sell_price_cents: 0,
            minimum_stock: 0,
            reorder_level: None,
            default_unit: DEFAULT_UNIT.to_string(),
            sourcing: PartSourcing::default(),
            usage: UsageFlags::ALL,
            created_by: None,
        }
    }

    pub fn with_prices(mut self, cost_cents: i64, sell_cents: i64) -> Self {
        self.cost_price_cents = cost_cents;
        self.sell_price_cents = sell_cents;
        self
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }

    pub fn with_thresholds(mut self, minimum: i64, reorder_level: Option<i64>) -> Self {
        self.minimum_stock = minimum;
        self.reorder_level = reorder_level;
        self
    }
}

/// Unit assigned to new parts when none is given.
pub const DEFAULT_UNIT: &str = "piece";

// =============================================================================
// Units of Measure
// =============================================================================

/// How many default units one alternate unit holds, in ten-thousandths.
///
/// `ConversionRate::from_ten_thousandths(120_000)` means "1 box = 12 pieces".
/// Four decimal places mirror a `decimal(18,4)` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversionRate(i64);

impl ConversionRate {
    pub const SCALE: i64 = 10_000;

    /// Rate of exactly one (the default unit itself).
    pub const ONE: ConversionRate = ConversionRate(Self::SCALE);

    #[inline]
    pub const fn from_ten_thousandths(value: i64) -> Self {
        ConversionRate(value)
    }

    /// Whole-number rate, e.g. `whole(12)` for a box of twelve.
    #[inline]
    pub const fn whole(units: i64) -> Self {
        ConversionRate(units * Self::SCALE)
    }

    #[inline]
    pub const fn ten_thousandths(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Converts `quantity` alternate units into default units.
    ///
    /// Returns `None` when the result is not a whole number of default units
    /// (half a piece cannot be issued from a batch).
    ///
    /// ```rust
    /// use garage_core::catalog::ConversionRate;
    ///
    /// let box_of_12 = ConversionRate::whole(12);
    /// assert_eq!(box_of_12.to_default_units(3), Some(36));
    ///
    /// let half_litre: ConversionRate = "0.5".parse().unwrap();
    /// assert_eq!(half_litre.to_default_units(4), Some(2));
    /// assert_eq!(half_litre.to_default_units(3), None);
    /// ```
    pub fn to_default_units(&self, quantity: i64) -> Option<i64> {
        let scaled = (quantity as i128).checked_mul(self.0 as i128)?;
        if scaled % Self::SCALE as i128 != 0 {
            return None;
        }
        i64::try_from(scaled / Self::SCALE as i128).ok()
    }
}

impl fmt::Display for ConversionRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::SCALE;
        let frac = (self.0 % Self::SCALE).abs();
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            let digits = format!("{:04}", frac);
            write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
        }
    }
}

impl FromStr for ConversionRate {
    type Err = ValidationError;

    /// Parses a decimal with at most four fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "conversion_rate".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("empty value"));
        }
        if frac.len() > 4 {
            return Err(invalid("at most 4 decimal places"));
        }
        if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid("must be a positive decimal number"));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("value too large"))?
        };
        let frac: i64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<4}", frac)
                .parse()
                .map_err(|_| invalid("bad fraction"))?
        };

        whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(frac))
            .map(ConversionRate)
            .ok_or_else(|| invalid("value too large"))
    }
}

/// An alternate unit of measure registered for a part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PartUnit {
    pub id: i64,
    pub part_id: i64,
    pub unit_name: String,

    /// Default units per one `unit_name`, in ten-thousandths.
    pub conversion_rate_x10000: i64,

    /// Preferred unit for display and purchasing.
    pub is_default: bool,

    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub audit: Audit,
}

crate::impl_audited!(PartUnit);

impl PartUnit {
    #[inline]
    pub fn conversion_rate(&self) -> ConversionRate {
        ConversionRate::from_ten_thousandths(self.conversion_rate_x10000)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn part(on_hand: i64, minimum: i64, reorder_level: Option<i64>) -> Part {
        Part {
            id: 1,
            part_number: "BRK-001".into(),
            sku: None,
            barcode: None,
            name: "Brake pad".into(),
            description: None,
            category: None,
            brand: None,
            cost_price_cents: 1000,
            average_cost_cents: 1000,
            sell_price_cents: 1500,
            quantity_in_stock: on_hand,
            minimum_stock: minimum,
            reorder_level,
            default_unit: DEFAULT_UNIT.into(),
            sourcing: PartSourcing::Oem,
            is_active: true,
            usage: UsageFlags::ALL,
            row_version: 0,
            audit: Audit::created(Utc::now(), None),
        }
    }

    #[test]
    fn test_needs_reorder_uses_reorder_level_first() {
        assert!(part(10, 2, Some(10)).needs_reorder());
        assert!(!part(11, 20, Some(10)).needs_reorder());
    }

    #[test]
    fn test_needs_reorder_falls_back_to_minimum() {
        assert!(part(3, 5, None).needs_reorder());
        assert!(!part(6, 5, None).needs_reorder());
        assert!(!part(0, 0, None).needs_reorder());
    }

    #[test]
    fn test_suggested_reorder_quantity() {
        assert_eq!(part(4, 5, Some(20)).suggested_reorder_quantity(), 16);
        assert_eq!(part(4, 5, None).suggested_reorder_quantity(), 6);
        assert_eq!(part(50, 5, None).suggested_reorder_quantity(), 0);
    }

    #[test]
    fn test_usage_flags() {
        let flags = UsageFlags {
            can_use_for_company: true,
            can_use_for_insurance: false,
            can_use_for_individual: true,
        };
        assert!(flags.allows(CustomerType::Company));
        assert!(!flags.allows(CustomerType::Insurance));
        assert!(flags.allows(CustomerType::Individual));
    }

    #[test]
    fn test_conversion_rate_parse_and_display() {
        let rate: ConversionRate = "2.5".parse().unwrap();
        assert_eq!(rate.ten_thousandths(), 25_000);
        assert_eq!(rate.to_string(), "2.5");
        assert_eq!(ConversionRate::whole(12).to_string(), "12");
        assert_eq!("0.0625".parse::<ConversionRate>().unwrap().ten_thousandths(), 625);

        assert!("1.23456".parse::<ConversionRate>().is_err());
        assert!("-1".parse::<ConversionRate>().is_err());
        assert!("abc".parse::<ConversionRate>().is_err());
        assert!("".parse::<ConversionRate>().is_err());
    }

    #[test]
    fn test_conversion_to_default_units() {
        assert_eq!(ConversionRate::whole(12).to_default_units(2), Some(24));
        let rate: ConversionRate = "2.5".parse().unwrap();
        assert_eq!(rate.to_default_units(2), Some(5));
        assert_eq!(rate.to_default_units(1), None);
    }

    #[test]
    fn test_part_serializes_flat() {
        let json = serde_json::to_value(part(1, 0, None)).unwrap();
        assert_eq!(json["can_use_for_company"], true);
        assert_eq!(json["is_deleted"], false);
        assert_eq!(json["sourcing"], "oem");
    }
}
