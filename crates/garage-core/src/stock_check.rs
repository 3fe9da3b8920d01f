//! # Stock Checks
//!
//! A stock check is a counting session: staff record what they physically
//! find per part, the check snapshots what the ledger believed at that
//! moment, and applying the check turns every discrepancy into batch
//! adjustments.
//!
//! ## Lifecycle
//! ```text
//! ┌────────┐  record_count (repeatable)  ┌────────┐
//! │  open  │ ─────────────────────────► │  open  │
//! └───┬────┘                            └────────┘
//!     │ complete                          counts frozen
//!     ▼
//! ┌───────────┐  apply (per part)  ┌──────────┐
//! │ completed │ ─────────────────► │ adjusted │  every discrepancy applied
//! └───────────┘                    └──────────┘
//! ```
//!
//! ## Spreading a Discrepancy Over Batches
//! ```text
//! shortage (counted < system)   take from stocked batches, oldest first
//!                               Σ remaining < shortage → InsufficientStock
//!
//! surplus  (counted > system)   put back into usable batches with room
//!                               (received − remaining), newest first
//!                               Σ room < surplus → CountSurplus
//! ```
//! The discrepancy is applied as a delta to current stock, so movements
//! between counting and applying are kept.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::allocation::AllocationPolicy;
use crate::audit::Audit;
use crate::batch::InventoryBatch;
use crate::error::{CoreError, CoreResult};
use crate::validation;
use crate::warehouse::BatchLocation;

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum StockCheckStatus {
    /// Counts may still be recorded.
    Open,
    /// Counts are frozen; discrepancies not yet applied.
    Completed,
    /// Every discrepancy has been applied to the ledger.
    Adjusted,
}

impl StockCheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockCheckStatus::Open => "open",
            StockCheckStatus::Completed => "completed",
            StockCheckStatus::Adjusted => "adjusted",
        }
    }
}

impl fmt::Display for StockCheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Check and Items
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockCheck {
    pub id: i64,
    /// Unique among live checks. Generated as `IC-YYYYMMDD-XXXX` when absent.
    pub code: String,
    pub name: String,

    /// Area being counted; unplaced means the whole store.
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub location: BatchLocation,

    pub status: StockCheckStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
    pub notes: Option<String>,

    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub audit: Audit,
}

crate::impl_audited!(StockCheck);

impl StockCheck {
    /// `StockCheckState` unless the check is in `expected`.
    pub fn ensure_status(&self, expected: StockCheckStatus) -> CoreResult<()> {
        if self.status == expected {
            return Ok(());
        }
        Err(CoreError::StockCheckState {
            check_id: self.id,
            status: self.status.to_string(),
            expected: expected.to_string(),
        })
    }
}

/// One counted part within a check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockCheckItem {
    pub id: i64,
    pub check_id: i64,
    pub part_id: i64,
    /// Part on-hand when the count was recorded.
    pub system_quantity: i64,
    pub counted_quantity: i64,
    pub is_adjusted: bool,
    pub adjusted_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,

    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub audit: Audit,
}

crate::impl_audited!(StockCheckItem);

impl StockCheckItem {
    /// `counted − system`: negative is a shortage, positive a surplus.
    #[inline]
    pub fn discrepancy(&self) -> i64 {
        self.counted_quantity - self.system_quantity
    }

    #[inline]
    pub fn is_discrepancy(&self) -> bool {
        self.discrepancy() != 0
    }
}

/// Input for opening a check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewStockCheck {
    pub code: Option<String>,
    pub name: String,
    pub location: BatchLocation,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

impl NewStockCheck {
    pub fn new(name: impl Into<String>) -> Self {
        NewStockCheck {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn coded(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn covering(mut self, location: BatchLocation) -> Self {
        self.location = location;
        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        validation::validate_name("name", &self.name)?;
        if let Some(code) = &self.code {
            validation::validate_code("code", code)?;
        }
        Ok(())
    }
}

/// Builds a check code for `at`: `IC-YYYYMMDD-XXXX`.
pub fn generate_check_code(at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string()[..4].to_uppercase();
    format!("IC-{}-{}", at.format("%Y%m%d"), suffix)
}

// =============================================================================
// Adjustment Planning
// =============================================================================

/// One batch correction derived from a count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountAdjustment {
    pub batch_id: i64,
    pub delta: i64,
    pub unit_cost_cents: i64,
    /// `row_version` the plan was computed against.
    pub expected_row_version: i64,
}

/// Spreads `discrepancy` over the part's batches.
///
/// `batches` are the part's on-hand batches, depleted ones included. Nothing
/// is planned unless the whole discrepancy fits.
pub fn plan_count_adjustment(
    part_id: i64,
    batches: &[InventoryBatch],
    discrepancy: i64,
    today: NaiveDate,
) -> CoreResult<Vec<CountAdjustment>> {
    if discrepancy == 0 {
        return Ok(Vec::new());
    }

    let (mut candidates, room): (Vec<&InventoryBatch>, fn(&InventoryBatch) -> i64) =
        if discrepancy < 0 {
            let stocked: Vec<&InventoryBatch> = batches.iter().filter(|b| b.is_stocked()).collect();
            (stocked, |b: &InventoryBatch| b.quantity_remaining)
        } else {
            let usable: Vec<&InventoryBatch> = batches
                .iter()
                .filter(|b| {
                    b.counts_toward_on_hand() && !b.is_past_expiry(today) && b.returnable() > 0
                })
                .collect();
            (usable, |b: &InventoryBatch| b.returnable())
        };

    let needed = discrepancy.abs();
    let capacity: i64 = candidates.iter().map(|b| room(b)).sum();
    if capacity < needed {
        return Err(if discrepancy < 0 {
            CoreError::InsufficientStock {
                part_id,
                available: capacity,
                requested: needed,
            }
        } else {
            CoreError::CountSurplus {
                part_id,
                surplus: needed,
                headroom: capacity,
            }
        });
    }

    let order = if discrepancy < 0 {
        AllocationPolicy::Fifo
    } else {
        AllocationPolicy::Lifo
    };
    candidates.sort_by(|a, b| order.compare(a, b));

    let sign = discrepancy.signum();
    let mut left = needed;
    let mut plan = Vec::new();
    for batch in candidates {
        if left == 0 {
            break;
        }
        let take = room(batch).min(left);
        plan.push(CountAdjustment {
            batch_id: batch.id,
            delta: sign * take,
            unit_cost_cents: batch.unit_cost_cents,
            expected_row_version: batch.row_version,
        });
        left -= take;
    }
    Ok(plan)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::tests::batch;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn item(system: i64, counted: i64) -> StockCheckItem {
        StockCheckItem {
            id: 1,
            check_id: 1,
            part_id: 1,
            system_quantity: system,
            counted_quantity: counted,
            is_adjusted: false,
            adjusted_at: None,
            notes: None,
            audit: Audit::created(Utc::now(), None),
        }
    }

    #[test]
    fn test_discrepancy_sign() {
        assert_eq!(item(10, 7).discrepancy(), -3);
        assert_eq!(item(10, 12).discrepancy(), 2);
        assert!(!item(4, 4).is_discrepancy());
    }

    #[test]
    fn test_shortage_takes_oldest_first() {
        let batches = vec![batch(2, 2, 10, 1200), batch(1, 1, 5, 1000)];
        let plan = plan_count_adjustment(1, &batches, -7, today()).unwrap();

        let deltas: Vec<(i64, i64)> = plan.iter().map(|a| (a.batch_id, a.delta)).collect();
        assert_eq!(deltas, vec![(1, -5), (2, -2)]);
    }

    #[test]
    fn test_shortage_beyond_stock_plans_nothing() {
        let batches = vec![batch(1, 1, 5, 1000)];
        let err = plan_count_adjustment(1, &batches, -6, today()).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                part_id: 1,
                available: 5,
                requested: 6
            }
        );
    }

    #[test]
    fn test_surplus_refills_newest_batches_with_room() {
        let mut older = batch(1, 1, 2, 1000);
        older.quantity_received = 5;
        let mut newer = batch(2, 2, 0, 1200);
        newer.quantity_received = 2;
        let full = batch(3, 3, 4, 1300);

        let plan =
            plan_count_adjustment(1, &[older.clone(), newer.clone(), full], 3, today()).unwrap();
        let deltas: Vec<(i64, i64)> = plan.iter().map(|a| (a.batch_id, a.delta)).collect();
        assert_eq!(deltas, vec![(2, 2), (1, 1)]);

        let err = plan_count_adjustment(1, &[older, newer], 6, today()).unwrap_err();
        assert_eq!(
            err,
            CoreError::CountSurplus {
                part_id: 1,
                surplus: 6,
                headroom: 5
            }
        );
    }

    #[test]
    fn test_surplus_skips_past_expiry_batches() {
        let mut stale = batch(1, 1, 0, 1000);
        stale.quantity_received = 5;
        stale.expiry_date = NaiveDate::from_ymd_opt(2024, 5, 1);

        let err = plan_count_adjustment(1, &[stale], 1, today()).unwrap_err();
        assert!(matches!(err, CoreError::CountSurplus { headroom: 0, .. }));
    }

    #[test]
    fn test_zero_discrepancy_is_empty_plan() {
        assert!(plan_count_adjustment(1, &[], 0, today()).unwrap().is_empty());
    }

    #[test]
    fn test_new_check_validation_and_code() {
        assert!(NewStockCheck::new("June count").validate().is_ok());
        assert!(NewStockCheck::new("  ").validate().is_err());

        let at = Utc::now();
        let code = generate_check_code(at);
        assert!(code.starts_with(&format!("IC-{}-", at.format("%Y%m%d"))));
        assert_eq!(code.len(), "IC-YYYYMMDD-XXXX".len());
    }
}
