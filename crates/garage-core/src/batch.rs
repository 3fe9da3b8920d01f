//! # Batch Ledger Types
//!
//! A batch is one physical receipt of a part at one unit cost.
//!
//! ## Batch Lifecycle
//! ```text
//! ┌──────────────┐  receive   ┌──────────────────────────────────────────┐
//! │   Supplier   │──────────► │  InventoryBatch                          │
//! └──────────────┘            │  quantity_received   (immutable)         │
//!                             │  quantity_remaining  0 ≤ r ≤ received    │
//!                             │  unit_cost_cents     (immutable basis)   │
//!                             └──────┬──────────────────────▲────────────┘
//!                                    │ allocate             │ return
//!                                    ▼                      │
//!                             ┌──────────────────────────────┴───────────┐
//!                             │  BatchUsage                              │
//!                             │  quantity_used / quantity_returned       │
//!                             │  unit_cost_cents copied at time of use   │
//!                             └──────────────────────────────────────────┘
//! ```
//!
//! A depleted batch (`quantity_remaining = 0`) is retained for audit. Batches
//! referenced by usages are never deleted.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::Audit;
use crate::catalog::{CustomerType, UsageFlags};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::validation;
use crate::warehouse::BatchLocation;

// =============================================================================
// Batch Source
// =============================================================================

/// Where a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum BatchSource {
    /// Bought from a supplier, usually against a purchase order.
    Purchase,
    /// Replacement received under a supplier warranty.
    WarrantyReturn,
    /// Recovered from a scrapped vehicle.
    Salvage,
    /// Moved in from another shop or warehouse of the same business.
    InternalTransfer,
    /// Stock counted in when the ledger was first opened.
    OpeningBalance,
}

// =============================================================================
// Inventory Batch
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryBatch {
    pub id: i64,
    pub part_id: i64,

    /// Unique per part.
    pub batch_number: String,

    pub receive_date: DateTime<Utc>,
    pub quantity_received: i64,
    pub quantity_remaining: i64,

    /// Cost basis. Never changes after receipt.
    pub unit_cost_cents: i64,

    pub source: BatchSource,

    pub has_invoice: bool,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub supplier_id: Option<i64>,
    pub purchase_order_id: Option<i64>,

    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub location: BatchLocation,

    /// Last day the batch may be issued.
    pub expiry_date: Option<NaiveDate>,

    /// Set by the expiry sweep once the batch has been written off on-hand.
    pub is_expired: bool,
    pub is_active: bool,

    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub usage: UsageFlags,

    pub notes: Option<String>,
    pub row_version: i64,

    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub audit: Audit,
}

crate::impl_audited!(InventoryBatch);

impl InventoryBatch {
    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }

    /// Cost value of what is left in the batch.
    #[inline]
    pub fn remaining_value(&self) -> Money {
        self.unit_cost().multiply_quantity(self.quantity_remaining)
    }

    /// Whether the batch's remaining quantity counts toward part on-hand.
    #[inline]
    pub fn counts_toward_on_hand(&self) -> bool {
        self.is_active && !self.is_expired && !self.audit.is_deleted
    }

    /// Counts toward on-hand and still has something left.
    #[inline]
    pub fn is_stocked(&self) -> bool {
        self.counts_toward_on_hand() && self.quantity_remaining > 0
    }

    /// True once `today` is past the expiry date.
    #[inline]
    pub fn is_past_expiry(&self, today: NaiveDate) -> bool {
        self.expiry_date.map(|d| d < today).unwrap_or(false)
    }

    /// Stocked, not past expiry, and usable for the customer kind (if any).
    pub fn is_allocatable(&self, today: NaiveDate, customer_type: Option<CustomerType>) -> bool {
        self.is_stocked()
            && !self.is_past_expiry(today)
            && customer_type.map(|t| self.usage.allows(t)).unwrap_or(true)
    }

    /// Quantity that may still be returned into this batch.
    #[inline]
    pub fn returnable(&self) -> i64 {
        self.quantity_received - self.quantity_remaining
    }
}

// =============================================================================
// Receive Request
// =============================================================================

/// Everything needed to record one receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveBatch {
    pub part_id: i64,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    pub source: BatchSource,
    /// Generated as `B-YYYYMMDD-XXXX` when absent.
    pub batch_number: Option<String>,
    /// Defaults to now.
    pub receive_date: Option<DateTime<Utc>>,
    pub location: BatchLocation,
    pub expiry_date: Option<NaiveDate>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub supplier_id: Option<i64>,
    pub purchase_order_id: Option<i64>,
    pub usage: UsageFlags,
    pub notes: Option<String>,
    pub performed_by: Option<String>,
}

impl ReceiveBatch {
    pub fn new(part_id: i64, quantity: i64, unit_cost_cents: i64, source: BatchSource) -> Self {
        ReceiveBatch {
            part_id,
            quantity,
            unit_cost_cents,
            source,
            batch_number: None,
            receive_date: None,
            location: BatchLocation::UNPLACED,
            expiry_date: None,
            invoice_number: None,
            invoice_date: None,
            supplier_id: None,
            purchase_order_id: None,
            usage: UsageFlags::ALL,
            notes: None,
            performed_by: None,
        }
    }

    /// Purchase receipt with the invoice and supplier carried in.
    pub fn purchase(
        part_id: i64,
        quantity: i64,
        unit_cost_cents: i64,
        supplier_id: i64,
        invoice_number: impl Into<String>,
    ) -> Self {
        ReceiveBatch {
            supplier_id: Some(supplier_id),
            invoice_number: Some(invoice_number.into()),
            ..Self::new(part_id, quantity, unit_cost_cents, BatchSource::Purchase)
        }
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.receive_date = Some(at);
        self
    }

    pub fn numbered(mut self, batch_number: impl Into<String>) -> Self {
        self.batch_number = Some(batch_number.into());
        self
    }

    pub fn placed_at(mut self, location: BatchLocation) -> Self {
        self.location = location;
        self
    }

    pub fn expiring(mut self, expiry: NaiveDate) -> Self {
        self.expiry_date = Some(expiry);
        self
    }

    pub fn has_invoice(&self) -> bool {
        self.invoice_number
            .as_deref()
            .map(|n| !n.trim().is_empty())
            .unwrap_or(false)
    }

    /// Input checks that need no storage access.
    pub fn validate(&self) -> CoreResult<()> {
        validation::validate_positive_quantity("quantity", self.quantity)?;
        validation::validate_non_negative_cents("unit_cost_cents", self.unit_cost_cents)?;
        if let Some(number) = &self.batch_number {
            validation::validate_code("batch_number", number)?;
        }
        if let (Some(expiry), Some(received)) = (self.expiry_date, self.receive_date) {
            if expiry < received.date_naive() {
                return Err(CoreError::Validation(
                    crate::error::ValidationError::InvalidFormat {
                        field: "expiry_date".into(),
                        reason: "expires before it was received".into(),
                    },
                ));
            }
        }
        Ok(())
    }
}

/// Builds a batch number for a receipt on `at`: `B-YYYYMMDD-XXXX`.
pub fn generate_batch_number(at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string()[..4].to_uppercase();
    format!("B-{}-{}", at.format("%Y%m%d"), suffix)
}

// =============================================================================
// Batch Usage
// =============================================================================

/// One draw of a batch against a service order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BatchUsage {
    pub id: i64,
    pub batch_id: i64,
    pub part_id: i64,
    pub service_order_id: i64,
    pub service_order_part_id: Option<i64>,

    pub quantity_used: i64,
    /// Portion of `quantity_used` that came back to the batch.
    pub quantity_returned: i64,

    /// Copied from the batch when the usage was recorded.
    pub unit_cost_cents: i64,
    pub unit_price_cents: i64,
    pub total_cost_cents: i64,
    pub total_price_cents: i64,

    pub usage_date: DateTime<Utc>,

    pub customer_id: Option<i64>,
    pub customer_name: Option<String>,
    pub customer_type: Option<CustomerType>,
    pub vehicle_id: Option<i64>,
    pub vehicle_plate: Option<String>,

    /// Batch had an invoice, so the customer must be invoiced for this part.
    pub requires_invoice: bool,
    pub notes: Option<String>,

    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub audit: Audit,
}

crate::impl_audited!(BatchUsage);

impl BatchUsage {
    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }

    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Units still consumed (used minus returned).
    #[inline]
    pub fn outstanding(&self) -> i64 {
        self.quantity_used - self.quantity_returned
    }

    /// Cost of the outstanding units at the usage's own cost basis.
    #[inline]
    pub fn net_cost(&self) -> Money {
        self.unit_cost().multiply_quantity(self.outstanding())
    }

    #[inline]
    pub fn net_price(&self) -> Money {
        self.unit_price().multiply_quantity(self.outstanding())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn batch(id: i64, day: u32, remaining: i64, cost_cents: i64) -> InventoryBatch {
        InventoryBatch {
            id,
            part_id: 1,
            batch_number: format!("B{id}"),
            receive_date: Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap(),
            quantity_received: remaining,
            quantity_remaining: remaining,
            unit_cost_cents: cost_cents,
            source: BatchSource::Purchase,
            has_invoice: false,
            invoice_number: None,
            invoice_date: None,
            supplier_id: None,
            purchase_order_id: None,
            location: BatchLocation::UNPLACED,
            expiry_date: None,
            is_expired: false,
            is_active: true,
            usage: UsageFlags::ALL,
            notes: None,
            row_version: 0,
            audit: Audit::created(Utc::now(), None),
        }
    }

    #[test]
    fn test_stocked_and_allocatable() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let mut b = batch(1, 1, 5, 1000);
        assert!(b.is_stocked());
        assert!(b.is_allocatable(today, None));

        b.expiry_date = NaiveDate::from_ymd_opt(2024, 3, 1);
        assert!(b.is_allocatable(today, None), "usable through its expiry day");

        b.expiry_date = NaiveDate::from_ymd_opt(2024, 2, 29);
        assert!(b.is_stocked());
        assert!(!b.is_allocatable(today, None));

        b.expiry_date = None;
        b.usage.can_use_for_insurance = false;
        assert!(!b.is_allocatable(today, Some(CustomerType::Insurance)));
        assert!(b.is_allocatable(today, Some(CustomerType::Company)));

        b.quantity_remaining = 0;
        assert!(!b.is_stocked());
        assert!(b.counts_toward_on_hand());
    }

    #[test]
    fn test_receive_validation() {
        assert!(ReceiveBatch::new(1, 5, 1000, BatchSource::Purchase)
            .validate()
            .is_ok());
        assert!(matches!(
            ReceiveBatch::new(1, 0, 1000, BatchSource::Purchase).validate(),
            Err(CoreError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            ReceiveBatch::new(1, -3, 1000, BatchSource::Purchase).validate(),
            Err(CoreError::InvalidQuantity { .. })
        ));
        assert!(ReceiveBatch::new(1, 1, -1, BatchSource::Purchase)
            .validate()
            .is_err());

        let received = Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap();
        let stale = ReceiveBatch::new(1, 1, 100, BatchSource::Salvage)
            .received_at(received)
            .expiring(NaiveDate::from_ymd_opt(2024, 5, 9).unwrap());
        assert!(stale.validate().is_err());
    }

    #[test]
    fn test_has_invoice_derived_from_number() {
        let receipt = ReceiveBatch::purchase(1, 5, 1000, 9, "INV-42");
        assert!(receipt.has_invoice());
        let mut blank = receipt.clone();
        blank.invoice_number = Some("  ".into());
        assert!(!blank.has_invoice());
    }

    #[test]
    fn test_batch_number_format() {
        let at = Utc.with_ymd_and_hms(2024, 7, 4, 12, 0, 0).unwrap();
        let number = generate_batch_number(at);
        assert!(number.starts_with("B-20240704-"));
        assert_eq!(number.len(), "B-20240704-".len() + 4);
    }

    #[test]
    fn test_usage_net_cost() {
        let usage = BatchUsage {
            id: 1,
            batch_id: 1,
            part_id: 1,
            service_order_id: 10,
            service_order_part_id: None,
            quantity_used: 5,
            quantity_returned: 2,
            unit_cost_cents: 1000,
            unit_price_cents: 1500,
            total_cost_cents: 5000,
            total_price_cents: 7500,
            usage_date: Utc::now(),
            customer_id: None,
            customer_name: None,
            customer_type: None,
            vehicle_id: None,
            vehicle_plate: None,
            requires_invoice: false,
            notes: None,
            audit: Audit::created(Utc::now(), None),
        };
        assert_eq!(usage.outstanding(), 3);
        assert_eq!(usage.net_cost().cents(), 3000);
        assert_eq!(usage.net_price().cents(), 4500);
    }
}
