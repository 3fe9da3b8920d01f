//! # Stock Transactions
//!
//! Immutable ledger rows, one per quantity-affecting event.
//!
//! ## Chain Invariant
//! ```text
//!   t1: before 0   + 15 → after 15   (Receipt B1+B2)
//!   t2: before 15  −  5 → after 10   (Issue B1)
//!   t3: before 10  −  3 → after 7    (Issue B2)
//!   t4: before 7   +  2 → after 9    (Return B2)
//!                                      ▲
//!                 equals Part.quantity_in_stock
//! ```
//! Every row satisfies `after = before + delta`, and ordered by
//! `(transaction_date, id)` each row's `before` is the previous row's `after`.
//! Corrections are new compensating rows; rows are never edited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::Audit;
use crate::money::Money;

/// Kind of quantity-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Stock received into a new batch.
    Receipt,
    /// Stock consumed by a service order.
    Issue,
    /// Stock-count correction or expiry write-off.
    Adjustment,
    /// Previously issued stock put back into its batch.
    Return,
    /// Batch moved to another location; quantity unchanged.
    Transfer,
}

impl TransactionType {
    /// Whether a signed delta is meaningful for this kind of event.
    pub fn accepts_delta(&self, delta: i64) -> bool {
        match self {
            TransactionType::Receipt | TransactionType::Return => delta > 0,
            TransactionType::Issue => delta < 0,
            TransactionType::Adjustment => delta != 0,
            TransactionType::Transfer => delta == 0,
        }
    }
}

/// A committed ledger row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockTransaction {
    pub id: i64,
    /// `STK-YYYYMMDD-XXXXXXXX`
    pub transaction_number: String,
    pub part_id: i64,
    pub batch_id: Option<i64>,
    pub transaction_type: TransactionType,
    pub quantity_delta: i64,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub unit_cost_cents: i64,
    pub unit_price_cents: Option<i64>,
    pub transaction_date: DateTime<Utc>,
    pub supplier_id: Option<i64>,
    pub service_order_id: Option<i64>,
    pub reference_number: Option<String>,
    pub performed_by: Option<String>,
    pub notes: Option<String>,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub audit: Audit,
}

crate::impl_audited!(StockTransaction);

impl StockTransaction {
    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }

    /// Cost value moved by this row (negative for issues).
    #[inline]
    pub fn cost_value(&self) -> Money {
        self.unit_cost().multiply_quantity(self.quantity_delta)
    }

    #[inline]
    pub fn is_chain_consistent(&self) -> bool {
        self.quantity_after == self.quantity_before + self.quantity_delta
    }
}

/// A row about to be appended. `quantity_before` is the part's on-hand at
/// the moment of commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStockTransaction {
    pub part_id: i64,
    pub batch_id: Option<i64>,
    pub transaction_type: TransactionType,
    pub quantity_delta: i64,
    pub quantity_before: i64,
    pub unit_cost_cents: i64,
    pub unit_price_cents: Option<i64>,
    pub transaction_date: DateTime<Utc>,
    pub supplier_id: Option<i64>,
    pub service_order_id: Option<i64>,
    pub reference_number: Option<String>,
    pub performed_by: Option<String>,
    pub notes: Option<String>,
}

impl NewStockTransaction {
    #[inline]
    pub fn quantity_after(&self) -> i64 {
        self.quantity_before + self.quantity_delta
    }
}

/// Builds a transaction number for `at`: `STK-YYYYMMDD-XXXXXXXX`.
pub fn generate_transaction_number(at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("STK-{}-{}", at.format("%Y%m%d"), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_delta_sign_rules() {
        assert!(TransactionType::Receipt.accepts_delta(5));
        assert!(!TransactionType::Receipt.accepts_delta(-5));
        assert!(TransactionType::Issue.accepts_delta(-1));
        assert!(!TransactionType::Issue.accepts_delta(0));
        assert!(TransactionType::Adjustment.accepts_delta(-2));
        assert!(TransactionType::Adjustment.accepts_delta(2));
        assert!(!TransactionType::Adjustment.accepts_delta(0));
        assert!(TransactionType::Transfer.accepts_delta(0));
        assert!(!TransactionType::Transfer.accepts_delta(1));
    }

    #[test]
    fn test_transaction_number_format() {
        let at = Utc.with_ymd_and_hms(2025, 1, 31, 8, 0, 0).unwrap();
        let number = generate_transaction_number(at);
        assert!(number.starts_with("STK-20250131-"));
        let suffix = &number["STK-20250131-".len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_type_serializes_snake_case() {
        let json = serde_json::to_string(&TransactionType::Adjustment).unwrap();
        assert_eq!(json, "\"adjustment\"");
    }
}
