//! # Consumption Allocator
//!
//! Pure planning half of an allocation: which batches to draw from, how many
//! units from each, and what the issue costs. The database layer executes
//! the plan atomically under the part's ledger lock.
//!
//! ## Algorithm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. keep batches that are stocked, not past expiry, usable for the     │
//! │     customer kind                                                      │
//! │  2. order by policy                                                    │
//! │       FIFO  receive_date ↑, id ↑                                       │
//! │       LIFO  receive_date ↓, id ↓                                       │
//! │       FEFO  expiry_date ↑ (undated last), receive_date ↑, id ↑         │
//! │  3. Σ remaining < needed  →  InsufficientStock (nothing planned)       │
//! │  4. walk: take min(remaining, still_needed) until still_needed = 0     │
//! │  5. weighted cost = Σ(qty × unit_cost) / needed, round half-up         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Worked Example
//! ```text
//! B1: day 1,  5 @ 10.00
//! B2: day 2, 10 @ 12.00
//!
//! plan_allocation(P, 8, Fifo)  → B1 × 5, B2 × 3
//!                                 (5×10.00 + 3×12.00) / 8 = 10.75
//! plan_allocation(P, 20, Fifo) → InsufficientStock { available: 15, requested: 20 }
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::batch::{BatchUsage, InventoryBatch};
use crate::catalog::CustomerType;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::transaction::StockTransaction;

// =============================================================================
// Policy
// =============================================================================

/// Batch selection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationPolicy {
    /// Oldest receipt first. Deterministic shelf rotation.
    Fifo,
    /// Newest receipt first.
    Lifo,
    /// Earliest expiry first; undated batches after dated ones, then FIFO.
    Fefo,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        AllocationPolicy::Fifo
    }
}

impl AllocationPolicy {
    /// Total order over batches for this policy.
    pub fn compare(&self, a: &InventoryBatch, b: &InventoryBatch) -> Ordering {
        let fifo = |a: &InventoryBatch, b: &InventoryBatch| {
            a.receive_date.cmp(&b.receive_date).then(a.id.cmp(&b.id))
        };
        match self {
            AllocationPolicy::Fifo => fifo(a, b),
            AllocationPolicy::Lifo => fifo(b, a),
            AllocationPolicy::Fefo => match (a.expiry_date, b.expiry_date) {
                (Some(x), Some(y)) => x.cmp(&y).then_with(|| fifo(a, b)),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => fifo(a, b),
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationPolicy::Fifo => "fifo",
            AllocationPolicy::Lifo => "lifo",
            AllocationPolicy::Fefo => "fefo",
        }
    }
}

impl fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AllocationPolicy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(AllocationPolicy::Fifo),
            "lifo" => Ok(AllocationPolicy::Lifo),
            "fefo" => Ok(AllocationPolicy::Fefo),
            _ => Err(ValidationError::NotAllowed {
                field: "allocation_policy".into(),
                allowed: vec!["fifo".into(), "lifo".into(), "fefo".into()],
            }),
        }
    }
}

// =============================================================================
// Request
// =============================================================================

/// A request to consume stock for a service order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub part_id: i64,
    pub quantity: i64,
    /// `None` uses the ledger's configured default.
    pub policy: Option<AllocationPolicy>,
    pub service_order_id: i64,
    pub service_order_part_id: Option<i64>,
    /// Price charged per unit; defaults to the part's sell price.
    pub unit_price_cents: Option<i64>,
    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,
    /// Restricts eligible batches to those usable for this customer kind.
    pub customer_type: Option<CustomerType>,
    pub vehicle_id: Option<i64>,
    pub vehicle_plate: Option<String>,
    pub performed_by: Option<String>,
    pub notes: Option<String>,
}

impl AllocationRequest {
    pub fn new(part_id: i64, quantity: i64, service_order_id: i64) -> Self {
        AllocationRequest {
            part_id,
            quantity,
            policy: None,
            service_order_id,
            service_order_part_id: None,
            unit_price_cents: None,
            customer_id: None,
            customer_name: None,
            customer_type: None,
            vehicle_id: None,
            vehicle_plate: None,
            performed_by: None,
            notes: None,
        }
    }

    pub fn with_policy(mut self, policy: AllocationPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn for_customer(
        mut self,
        customer_id: i64,
        name: impl Into<String>,
        customer_type: CustomerType,
    ) -> Self {
        self.customer_id = Some(customer_id);
        self.customer_name = Some(name.into());
        self.customer_type = Some(customer_type);
        self
    }

    pub fn for_vehicle(mut self, vehicle_id: i64, plate: impl Into<String>) -> Self {
        self.vehicle_id = Some(vehicle_id);
        self.vehicle_plate = Some(plate.into());
        self
    }

    pub fn priced_at(mut self, unit_price_cents: i64) -> Self {
        self.unit_price_cents = Some(unit_price_cents);
        self
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Units drawn from one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSlice {
    pub batch_id: i64,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    pub receive_date: DateTime<Utc>,
    pub has_invoice: bool,
    /// Batch `row_version` the plan was computed from.
    pub expected_row_version: i64,
}

impl AllocationSlice {
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents).multiply_quantity(self.quantity)
    }
}

/// Which batches to draw from, in draw order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub part_id: i64,
    pub policy: AllocationPolicy,
    pub slices: Vec<AllocationSlice>,
    pub quantity: i64,
    pub total_cost: Money,
    pub weighted_unit_cost: Money,
}

/// Plans an all-or-nothing draw of `quantity` units.
///
/// `batches` may contain any batches of the part; ineligible ones are
/// skipped. Nothing is planned when the eligible total falls short.
pub fn plan_allocation(
    part_id: i64,
    batches: &[InventoryBatch],
    quantity: i64,
    policy: AllocationPolicy,
    today: NaiveDate,
    customer_type: Option<CustomerType>,
) -> CoreResult<AllocationPlan> {
    if quantity <= 0 {
        return Err(CoreError::invalid_quantity("quantity", quantity));
    }

    let mut eligible: Vec<&InventoryBatch> = batches
        .iter()
        .filter(|b| b.part_id == part_id && b.is_allocatable(today, customer_type))
        .collect();
    eligible.sort_by(|a, b| policy.compare(a, b));

    let available: i64 = eligible.iter().map(|b| b.quantity_remaining).sum();
    if available < quantity {
        return Err(CoreError::InsufficientStock {
            part_id,
            available,
            requested: quantity,
        });
    }

    let mut still_needed = quantity;
    let mut slices = Vec::new();
    for batch in eligible {
        if still_needed == 0 {
            break;
        }
        let take = batch.quantity_remaining.min(still_needed);
        slices.push(AllocationSlice {
            batch_id: batch.id,
            quantity: take,
            unit_cost_cents: batch.unit_cost_cents,
            receive_date: batch.receive_date,
            has_invoice: batch.has_invoice,
            expected_row_version: batch.row_version,
        });
        still_needed -= take;
    }

    let total_cost: Money = slices.iter().map(AllocationSlice::cost).sum();
    let weighted_unit_cost = total_cost
        .per_unit(quantity)
        .ok_or_else(|| CoreError::invalid_quantity("quantity", quantity))?;

    Ok(AllocationPlan {
        part_id,
        policy,
        slices,
        quantity,
        total_cost,
        weighted_unit_cost,
    })
}

// =============================================================================
// Committed Allocation
// =============================================================================

/// Result of a committed allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub part_id: i64,
    pub policy: AllocationPolicy,
    pub usages: Vec<BatchUsage>,
    pub transactions: Vec<StockTransaction>,
    pub quantity: i64,
    pub total_cost: Money,
    /// `total_cost / quantity`, rounded half-up to the cent.
    pub weighted_unit_cost: Money,
}

// =============================================================================
// Cost of Goods
// =============================================================================

/// How an order's cost of goods is broken down.
///
/// Both methods charge the same total: the cost basis of the batches
/// actually drawn. They differ in the lines reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CogsMethod {
    /// One line per (part, batch) at the batch's own unit cost.
    #[default]
    Fifo,
    /// One line per part at Σ cost / Σ quantity, rounded half-up.
    WeightedAverage,
}

impl CogsMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CogsMethod::Fifo => "fifo",
            CogsMethod::WeightedAverage => "weighted_average",
        }
    }
}

impl fmt::Display for CogsMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CogsMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fifo" => Ok(CogsMethod::Fifo),
            "weighted_average" | "weightedaverage" | "average" => Ok(CogsMethod::WeightedAverage),
            _ => Err(ValidationError::NotAllowed {
                field: "cogs_method".into(),
                allowed: vec!["fifo".into(), "weighted_average".into()],
            }),
        }
    }
}

/// One cost-of-goods line of a service order, net of returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartCost {
    pub part_id: i64,
    /// Source batch under [`CogsMethod::Fifo`]; `None` for averaged lines.
    pub batch_id: Option<i64>,
    pub quantity: i64,
    pub unit_cost: Money,
    pub total_cost: Money,
    pub total_price: Money,
}

/// Rolls usages up into cost-of-goods lines ordered by part, then batch.
///
/// Fully returned usages still produce a line with zero quantity.
pub fn cost_of_goods(usages: &[BatchUsage], method: CogsMethod) -> Vec<PartCost> {
    let mut lines: BTreeMap<(i64, Option<i64>), PartCost> = BTreeMap::new();
    for usage in usages {
        let batch_id = match method {
            CogsMethod::Fifo => Some(usage.batch_id),
            CogsMethod::WeightedAverage => None,
        };
        let line = lines.entry((usage.part_id, batch_id)).or_insert(PartCost {
            part_id: usage.part_id,
            batch_id,
            quantity: 0,
            unit_cost: usage.unit_cost(),
            total_cost: Money::zero(),
            total_price: Money::zero(),
        });
        line.quantity += usage.outstanding();
        line.total_cost += usage.net_cost();
        line.total_price += usage.net_price();
    }

    let mut lines: Vec<PartCost> = lines.into_values().collect();
    if method == CogsMethod::WeightedAverage {
        for line in &mut lines {
            line.unit_cost = line.total_cost.per_unit(line.quantity).unwrap_or(Money::zero());
        }
    }
    lines
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

    fn two_batches() -> Vec<InventoryBatch> {
        vec![batch(2, 2, 10, 1200), batch(1, 1, 5, 1000)]
    }

    #[test]
    fn test_fifo_spans_batches_with_weighted_cost() {
        let plan =
            plan_allocation(1, &two_batches(), 8, AllocationPolicy::Fifo, today(), None).unwrap();

        let drawn: Vec<(i64, i64)> = plan.slices.iter().map(|s| (s.batch_id, s.quantity)).collect();
        assert_eq!(drawn, vec![(1, 5), (2, 3)]);
        assert_eq!(plan.total_cost.cents(), 8600);
        assert_eq!(plan.weighted_unit_cost.cents(), 1075);
    }

    #[test]
    fn test_insufficient_stock_plans_nothing() {
        let err = plan_allocation(1, &two_batches(), 20, AllocationPolicy::Fifo, today(), None)
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                part_id: 1,
                available: 15,
                requested: 20
            }
        );
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        for q in [0, -1] {
            assert!(matches!(
                plan_allocation(1, &two_batches(), q, AllocationPolicy::Fifo, today(), None),
                Err(CoreError::InvalidQuantity { .. })
            ));
        }
    }

    #[test]
    fn test_fifo_ties_break_on_id() {
        let batches = vec![batch(9, 1, 3, 500), batch(4, 1, 3, 700)];
        let plan = plan_allocation(1, &batches, 4, AllocationPolicy::Fifo, today(), None).unwrap();
        assert_eq!(plan.slices[0].batch_id, 4);
        assert_eq!(plan.slices[1].batch_id, 9);
    }

    #[test]
    fn test_fifo_usage_dates_non_decreasing() {
        let batches = vec![
            batch(3, 5, 2, 100),
            batch(1, 1, 2, 100),
            batch(4, 9, 2, 100),
            batch(2, 3, 2, 100),
        ];
        let plan = plan_allocation(1, &batches, 7, AllocationPolicy::Fifo, today(), None).unwrap();
        assert!(plan
            .slices
            .windows(2)
            .all(|w| w[0].receive_date <= w[1].receive_date));
        assert_eq!(plan.slices.iter().map(|s| s.quantity).sum::<i64>(), 7);
    }

    #[test]
    fn test_lifo_takes_newest_first() {
        let plan =
            plan_allocation(1, &two_batches(), 8, AllocationPolicy::Lifo, today(), None).unwrap();
        assert_eq!(plan.slices.len(), 1);
        assert_eq!(plan.slices[0].batch_id, 2);
        assert_eq!(plan.weighted_unit_cost.cents(), 1200);
    }

    #[test]
    fn test_fefo_prefers_earliest_expiry_and_undated_last() {
        let mut early = batch(3, 5, 4, 100);
        early.expiry_date = NaiveDate::from_ymd_opt(2024, 7, 1);
        let mut late = batch(2, 2, 4, 100);
        late.expiry_date = NaiveDate::from_ymd_opt(2024, 9, 1);
        let undated = batch(1, 1, 4, 100);

        let plan = plan_allocation(
            1,
            &[undated, late, early],
            10,
            AllocationPolicy::Fefo,
            today(),
            None,
        )
        .unwrap();
        let order: Vec<i64> = plan.slices.iter().map(|s| s.batch_id).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn test_expired_and_ineligible_batches_skipped() {
        let mut expired = batch(1, 1, 5, 100);
        expired.expiry_date = NaiveDate::from_ymd_opt(2024, 5, 31);
        let mut insurance_only = batch(2, 2, 5, 100);
        insurance_only.usage.can_use_for_individual = false;
        let fine = batch(3, 3, 5, 100);

        let batches = vec![expired, insurance_only, fine];
        let err = plan_allocation(
            1,
            &batches,
            6,
            AllocationPolicy::Fifo,
            today(),
            Some(CustomerType::Individual),
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { available: 5, .. }));

        let plan = plan_allocation(
            1,
            &batches,
            6,
            AllocationPolicy::Fifo,
            today(),
            Some(CustomerType::Insurance),
        )
        .unwrap();
        assert_eq!(plan.slices[0].batch_id, 2);
    }

    fn usage(id: i64, batch_id: i64, used: i64, returned: i64, cost_cents: i64) -> BatchUsage {
        BatchUsage {
            id,
            batch_id,
            part_id: 1,
            service_order_id: 7,
            service_order_part_id: None,
            quantity_used: used,
            quantity_returned: returned,
            unit_cost_cents: cost_cents,
            unit_price_cents: 1500,
            total_cost_cents: used * cost_cents,
            total_price_cents: used * 1500,
            usage_date: Utc::now(),
            customer_id: None,
            customer_name: None,
            customer_type: None,
            vehicle_id: None,
            vehicle_plate: None,
            requires_invoice: false,
            notes: None,
            audit: crate::audit::Audit::created(Utc::now(), None),
        }
    }

    #[test]
    fn test_cost_of_goods_by_method() {
        // 5 @ 10.00 from B1, 3 @ 12.00 from B2 with one returned
        let usages = vec![usage(1, 1, 5, 0, 1000), usage(2, 2, 3, 1, 1200)];

        let fifo = cost_of_goods(&usages, CogsMethod::Fifo);
        let lines: Vec<(Option<i64>, i64, i64)> = fifo
            .iter()
            .map(|l| (l.batch_id, l.quantity, l.unit_cost.cents()))
            .collect();
        assert_eq!(lines, vec![(Some(1), 5, 1000), (Some(2), 2, 1200)]);

        let average = cost_of_goods(&usages, CogsMethod::WeightedAverage);
        assert_eq!(average.len(), 1);
        assert_eq!(average[0].batch_id, None);
        assert_eq!(average[0].quantity, 7);
        assert_eq!(average[0].total_cost.cents(), 7400);
        // 7400 / 7 = 1057.14
        assert_eq!(average[0].unit_cost.cents(), 1057);

        let fifo_total: i64 = fifo.iter().map(|l| l.total_cost.cents()).sum();
        assert_eq!(fifo_total, average[0].total_cost.cents());
    }

    #[test]
    fn test_cost_of_goods_fully_returned_line() {
        let average = cost_of_goods(&[usage(1, 1, 2, 2, 800)], CogsMethod::WeightedAverage);
        assert_eq!(average[0].quantity, 0);
        assert_eq!(average[0].unit_cost, Money::zero());
    }

    #[test]
    fn test_cogs_method_parse() {
        assert_eq!("WeightedAverage".parse::<CogsMethod>().unwrap(), CogsMethod::WeightedAverage);
        assert_eq!(CogsMethod::default().to_string(), "fifo");
        assert!("lifo".parse::<CogsMethod>().is_err());
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("FEFO".parse::<AllocationPolicy>().unwrap(), AllocationPolicy::Fefo);
        assert!("random".parse::<AllocationPolicy>().is_err());
        assert_eq!(AllocationPolicy::default().to_string(), "fifo");
    }
}
