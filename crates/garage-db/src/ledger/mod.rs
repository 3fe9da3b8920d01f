//! # Inventory Ledger
//!
//! The only writer of quantities. Every operation that moves stock runs as
//! one unit of work under the part's lock.
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. validate input                      (no lock, no connection)       │
//! │  2. acquire part lock                   bounded wait → LockTimeout     │
//! │  3. BEGIN                                                              │
//! │  4. touch part row                      takes SQLite's write lock      │
//! │  5. read batches, apply rules           CoreError → rollback           │
//! │  6. CAS writes on batches               lost race → rollback           │
//! │  7. append stock transactions           running quantity_before        │
//! │  8. recompute part on-hand + avg cost   mismatch → LedgerIntegrity     │
//! │  9. COMMIT, release lock                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Any error before step 9 drops the transaction, which rolls back every
//! write of the unit: a rejected operation leaves no trace.
//!
//! ## Operations
//! - [`InventoryLedger::receive_batch`] - new batch + `Receipt`
//! - [`InventoryLedger::allocate`] - batch usages + one `Issue` per batch
//! - [`InventoryLedger::return_to_batch`] - credits usages + `Return`
//! - [`InventoryLedger::adjust_batch`] - stock-count correction + `Adjustment`
//! - [`InventoryLedger::transfer_batch`] - re-placement + zero-delta `Transfer`
//! - [`InventoryLedger::expire_batches`] - write-off sweep + `Adjustment`
//! - [`InventoryLedger::apply_stock_check`] - counted discrepancies + `Adjustment`s
//! - [`InventoryLedger::cost_of_goods_for_order`] - FIFO or weighted-average COGS
//! - [`InventoryLedger::history`] - lazy transaction history
//! - [`InventoryLedger::reconcile_part`] - consistency check

pub mod history;
pub mod locks;
pub mod stock_count;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use crate::config::LedgerSettings;
use crate::error::{DbError, DbResult};
use crate::repository::{
    BatchRepository, PartRepository, StockTransactionRepository, UsageRepository,
    WarehouseRepository,
};
use garage_core::alerts::evaluate_part;
use garage_core::allocation::{cost_of_goods, plan_allocation};
use garage_core::batch::generate_batch_number;
use garage_core::validation::validate_positive_quantity;
use garage_core::{
    Allocation, AllocationRequest, BatchLocation, CogsMethod, CoreError, InventoryBatch, Money,
    NewStockTransaction, Part, PartCost, ReceiveBatch, StockAlert, StockTransaction,
    TransactionType,
};

use history::{HistoryPosition, StockHistory};
use locks::{PartGuard, PartLocks};

// =============================================================================
// Ledger
// =============================================================================

/// Quantity-changing operations over the batch ledger.
///
/// Obtained from [`Database::ledger`](crate::Database::ledger). Clones share
/// the pool and the lock registry.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    pool: SqlitePool,
    locks: Arc<PartLocks>,
    settings: LedgerSettings,
}

impl InventoryLedger {
    pub fn new(pool: SqlitePool, locks: Arc<PartLocks>, settings: LedgerSettings) -> Self {
        InventoryLedger {
            pool,
            locks,
            settings,
        }
    }

    pub fn settings(&self) -> &LedgerSettings {
        &self.settings
    }

    // =========================================================================
    // Receipt
    // =========================================================================

    /// Records a receipt as a new batch.
    ///
    /// The batch starts with `quantity_remaining = quantity` and the part's
    /// on-hand grows by `quantity`.
    ///
    /// ## Errors
    /// - `InvalidQuantity` for quantity ≤ 0
    /// - `InvalidLocation` when the placement does not resolve
    /// - `DuplicateCode` when the batch number is taken for the part
    pub async fn receive_batch(&self, request: ReceiveBatch) -> DbResult<InventoryBatch> {
        let mut request = request;
        let receive_date = *request.receive_date.get_or_insert_with(Utc::now);
        request.validate()?;

        let mut work = self.open(request.part_id).await?;

        let location = WarehouseRepository::resolve_in(&mut work.tx, &request.location).await?;
        let batch_number = match &request.batch_number {
            Some(number) => number.trim().to_string(),
            None => generate_batch_number(receive_date),
        };
        let batch = BatchRepository::insert(
            &mut work.tx,
            &request,
            &batch_number,
            receive_date,
            &location,
            work.now,
        )
        .await?;

        let entry = NewStockTransaction {
            supplier_id: request.supplier_id,
            reference_number: request.invoice_number.clone(),
            performed_by: request.performed_by.clone(),
            notes: request.notes.clone(),
            ..work.entry(
                TransactionType::Receipt,
                Some(batch.id),
                batch.quantity_received,
                batch.unit_cost_cents,
            )
        };
        work.append(entry).await?;
        work.commit(request.performed_by.as_deref()).await?;

        info!(
            part_id = batch.part_id,
            batch_id = batch.id,
            batch_number = %batch.batch_number,
            quantity = batch.quantity_received,
            unit_cost = batch.unit_cost_cents,
            "Batch received"
        );
        Ok(batch)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Draws `request.quantity` units for a service order, all or nothing.
    ///
    /// ## Flow
    /// ```text
    /// stocked batches ──► plan_allocation(policy) ──► per slice:
    ///                                                   CAS remaining -= qty
    ///                                                   insert usage
    ///                                                   append Issue
    /// ```
    /// A shortfall fails with `InsufficientStock` before anything is written.
    pub async fn allocate(&self, request: AllocationRequest) -> DbResult<Allocation> {
        validate_positive_quantity("quantity", request.quantity)?;
        let policy = request.policy.unwrap_or(self.settings.default_policy);

        debug!(
            part_id = request.part_id,
            quantity = request.quantity,
            service_order_id = request.service_order_id,
            policy = policy.as_str(),
            "Allocating stock"
        );

        let mut work = self.open(request.part_id).await?;

        let batches = BatchRepository::fetch_stocked(&mut *work.tx, request.part_id).await?;
        let plan = plan_allocation(
            request.part_id,
            &batches,
            request.quantity,
            policy,
            work.now.date_naive(),
            request.customer_type,
        )?;
        let unit_price_cents = request
            .unit_price_cents
            .unwrap_or(work.part.sell_price_cents);
        let performed_by = request.performed_by.as_deref();

        let mut usages = Vec::with_capacity(plan.slices.len());
        let mut transactions = Vec::with_capacity(plan.slices.len());
        for slice in &plan.slices {
            let shifted = BatchRepository::shift_remaining(
                &mut work.tx,
                slice.batch_id,
                -slice.quantity,
                slice.expected_row_version,
                work.now,
                performed_by,
            )
            .await?;
            if !shifted {
                return Err(concurrent("InventoryBatch", slice.batch_id));
            }

            let usage =
                UsageRepository::insert(&mut work.tx, &request, slice, unit_price_cents, work.now)
                    .await?;

            let entry = NewStockTransaction {
                unit_price_cents: Some(unit_price_cents),
                service_order_id: Some(request.service_order_id),
                performed_by: request.performed_by.clone(),
                notes: request.notes.clone(),
                ..work.entry(
                    TransactionType::Issue,
                    Some(slice.batch_id),
                    -slice.quantity,
                    slice.unit_cost_cents,
                )
            };
            transactions.push(work.append(entry).await?);
            usages.push(usage);
        }

        work.commit(performed_by).await?;

        info!(
            part_id = request.part_id,
            service_order_id = request.service_order_id,
            quantity = plan.quantity,
            batches = plan.slices.len(),
            weighted_unit_cost = plan.weighted_unit_cost.cents(),
            "Stock allocated"
        );

        Ok(Allocation {
            part_id: plan.part_id,
            policy: plan.policy,
            usages,
            transactions,
            quantity: plan.quantity,
            total_cost: plan.total_cost,
            weighted_unit_cost: plan.weighted_unit_cost,
        })
    }

    /// Cost of goods for a service order, net of returns, broken down by
    /// `method`.
    pub async fn cost_of_goods_for_order(
        &self,
        service_order_id: i64,
        method: CogsMethod,
    ) -> DbResult<Vec<PartCost>> {
        let usages = UsageRepository::fetch_for_order(&self.pool, service_order_id).await?;
        let lines = cost_of_goods(&usages, method);
        debug!(
            service_order_id,
            method = method.as_str(),
            lines = lines.len(),
            "Cost of goods computed"
        );
        Ok(lines)
    }

    // =========================================================================
    // Returns and corrections
    // =========================================================================

    /// Puts `quantity` units back into the batch they were drawn from.
    ///
    /// Outstanding usages are credited newest first. With a service order
    /// given, only that order's usages are credited and they must cover the
    /// whole quantity.
    ///
    /// ## Errors
    /// - `InvalidQuantity` for quantity ≤ 0, or more than the order has outstanding
    /// - `OverReturn` when the batch would exceed what it received
    /// - `BatchUnavailable` when the batch is expired or inactive
    pub async fn return_to_batch(
        &self,
        batch_id: i64,
        quantity: i64,
        service_order_id: Option<i64>,
        performed_by: Option<&str>,
    ) -> DbResult<InventoryBatch> {
        validate_positive_quantity("quantity", quantity)?;
        let part_id = self.part_of_batch(batch_id).await?;

        let mut work = self.open(part_id).await?;
        let batch = work.batch(batch_id).await?;
        ensure_available(&batch)?;

        if quantity > batch.returnable() {
            return Err(CoreError::OverReturn {
                batch_id,
                remaining: batch.quantity_remaining,
                requested: quantity,
                received: batch.quantity_received,
            }
            .into());
        }

        let outstanding =
            UsageRepository::fetch_outstanding(&mut work.tx, batch_id, service_order_id).await?;
        if service_order_id.is_some() {
            let owed: i64 = outstanding.iter().map(|u| u.outstanding()).sum();
            if owed < quantity {
                return Err(CoreError::invalid_quantity("quantity", quantity).into());
            }
        }

        let mut left = quantity;
        for usage in &outstanding {
            if left == 0 {
                break;
            }
            let credit = usage.outstanding().min(left);
            if !UsageRepository::credit_return(&mut work.tx, usage.id, credit, work.now, performed_by)
                .await?
            {
                return Err(concurrent("BatchUsage", usage.id));
            }
            left -= credit;
        }

        if !BatchRepository::shift_remaining(
            &mut work.tx,
            batch_id,
            quantity,
            batch.row_version,
            work.now,
            performed_by,
        )
        .await?
        {
            return Err(concurrent("InventoryBatch", batch_id));
        }

        let entry = NewStockTransaction {
            service_order_id,
            performed_by: performed_by.map(str::to_string),
            ..work.entry(
                TransactionType::Return,
                Some(batch_id),
                quantity,
                batch.unit_cost_cents,
            )
        };
        work.append(entry).await?;
        let updated = work.batch(batch_id).await?;
        work.commit(performed_by).await?;

        info!(
            part_id,
            batch_id,
            quantity,
            service_order_id,
            uncredited = left,
            "Stock returned to batch"
        );
        Ok(updated)
    }

    /// Corrects a batch's remaining quantity after a stock count.
    ///
    /// The result must stay within `[0, quantity_received]`.
    pub async fn adjust_batch(
        &self,
        batch_id: i64,
        delta: i64,
        reason: &str,
        performed_by: Option<&str>,
    ) -> DbResult<InventoryBatch> {
        if delta == 0 {
            return Err(CoreError::invalid_quantity("delta", delta).into());
        }
        let part_id = self.part_of_batch(batch_id).await?;

        let mut work = self.open(part_id).await?;
        let batch = work.batch(batch_id).await?;
        ensure_available(&batch)?;

        let after = batch.quantity_remaining + delta;
        if after < 0 {
            return Err(CoreError::InsufficientStock {
                part_id,
                available: batch.quantity_remaining,
                requested: -delta,
            }
            .into());
        }
        if after > batch.quantity_received {
            return Err(CoreError::OverReturn {
                batch_id,
                remaining: batch.quantity_remaining,
                requested: delta,
                received: batch.quantity_received,
            }
            .into());
        }

        if !BatchRepository::shift_remaining(
            &mut work.tx,
            batch_id,
            delta,
            batch.row_version,
            work.now,
            performed_by,
        )
        .await?
        {
            return Err(concurrent("InventoryBatch", batch_id));
        }

        let entry = NewStockTransaction {
            performed_by: performed_by.map(str::to_string),
            notes: Some(reason.trim().to_string()).filter(|r| !r.is_empty()),
            ..work.entry(
                TransactionType::Adjustment,
                Some(batch_id),
                delta,
                batch.unit_cost_cents,
            )
        };
        work.append(entry).await?;
        let updated = work.batch(batch_id).await?;
        work.commit(performed_by).await?;

        info!(part_id, batch_id, delta, reason, "Batch adjusted");
        Ok(updated)
    }

    /// Moves a batch to another warehouse, zone or bin.
    ///
    /// Quantities do not change; the move is still logged as a `Transfer`
    /// with zero delta. Moving to the current location is a no-op.
    pub async fn transfer_batch(
        &self,
        batch_id: i64,
        location: BatchLocation,
        performed_by: Option<&str>,
    ) -> DbResult<InventoryBatch> {
        let part_id = self.part_of_batch(batch_id).await?;

        let mut work = self.open(part_id).await?;
        let batch = work.batch(batch_id).await?;
        let resolved = WarehouseRepository::resolve_in(&mut work.tx, &location).await?;
        if resolved == batch.location {
            debug!(batch_id, "Batch already at requested location");
            return Ok(batch);
        }

        if !BatchRepository::set_location(
            &mut work.tx,
            batch_id,
            &resolved,
            batch.row_version,
            work.now,
            performed_by,
        )
        .await?
        {
            return Err(concurrent("InventoryBatch", batch_id));
        }

        let entry = NewStockTransaction {
            performed_by: performed_by.map(str::to_string),
            notes: Some(format!(
                "{} -> {}",
                describe(&batch.location),
                describe(&resolved)
            )),
            ..work.entry(
                TransactionType::Transfer,
                Some(batch_id),
                0,
                batch.unit_cost_cents,
            )
        };
        work.append(entry).await?;
        let updated = work.batch(batch_id).await?;
        work.commit(performed_by).await?;

        info!(
            part_id,
            batch_id,
            warehouse_id = resolved.warehouse_id,
            zone_id = resolved.zone_id,
            bin_id = resolved.bin_id,
            "Batch transferred"
        );
        Ok(updated)
    }

    /// Writes off every stocked batch whose expiry date is before `now`'s
    /// date. Returns the ids of the batches written off.
    ///
    /// Each part is processed in its own unit of work.
    pub async fn expire_batches(&self, now: DateTime<Utc>) -> DbResult<Vec<i64>> {
        let today = now.date_naive();
        let due = BatchRepository::fetch_past_expiry(&self.pool, today).await?;

        let mut by_part: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        for batch in due {
            by_part.entry(batch.part_id).or_default().push(batch.id);
        }

        let mut expired = Vec::new();
        for (part_id, batch_ids) in by_part {
            let mut work = match self.open(part_id).await {
                Ok(work) => work,
                // Deleted between the scan and the lock; its stock is gone with it.
                Err(DbError::Domain(CoreError::NotFound { .. })) => {
                    warn!(part_id, "Part vanished during expiry sweep, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };
            for batch_id in batch_ids {
                let batch = work.batch(batch_id).await?;
                // May have been depleted while we waited for the lock.
                if !batch.is_stocked() || !batch.is_past_expiry(today) {
                    continue;
                }
                if !BatchRepository::mark_expired(&mut work.tx, batch_id, batch.row_version, work.now)
                    .await?
                {
                    return Err(concurrent("InventoryBatch", batch_id));
                }

                let entry = NewStockTransaction {
                    notes: batch.expiry_date.map(|d| format!("Expired {d}")),
                    ..work.entry(
                        TransactionType::Adjustment,
                        Some(batch_id),
                        -batch.quantity_remaining,
                        batch.unit_cost_cents,
                    )
                };
                work.append(entry).await?;
                expired.push(batch_id);
            }
            work.commit(None).await?;
        }

        if !expired.is_empty() {
            info!(count = expired.len(), %today, "Expired batches written off");
        }
        Ok(expired)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// A part's transactions in `[from, to]`, fetched lazily.
    pub fn history(
        &self,
        part_id: i64,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StockHistory {
        StockHistory::new(
            self.pool.clone(),
            part_id,
            from,
            to,
            self.settings.history_page_size,
        )
    }

    /// Continues a history walk after a saved position.
    pub fn resume_history(
        &self,
        part_id: i64,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        position: HistoryPosition,
    ) -> StockHistory {
        self.history(part_id, from, to).resume(position)
    }

    /// Compares the part's cached on-hand with its batches and its
    /// transaction chain, from one consistent snapshot.
    ///
    /// Batches past their expiry date still count toward on-hand until
    /// [`expire_batches`](Self::expire_batches) writes them off; their
    /// quantity is reported separately as `past_expiry_remaining`.
    pub async fn reconcile_part(&self, part_id: i64) -> DbResult<Reconciliation> {
        let today = Utc::now().date_naive();
        let mut tx = self.pool.begin().await?;

        let part = PartRepository::fetch(&mut *tx, part_id)
            .await?
            .ok_or_else(|| DbError::from(CoreError::not_found("Part", part_id)))?;
        let (batch_remaining, _) = BatchRepository::stocked_totals(&mut *tx, part_id).await?;
        let past_expiry_remaining = BatchRepository::fetch_stocked(&mut *tx, part_id)
            .await?
            .iter()
            .filter(|b| b.is_past_expiry(today))
            .map(|b| b.quantity_remaining)
            .sum();
        let last = StockTransactionRepository::fetch_last(&mut *tx, part_id).await?;
        let (transaction_count, delta_sum) =
            StockTransactionRepository::chain_summary(&mut *tx, part_id).await?;
        tx.commit().await?;

        let reconciliation = Reconciliation {
            part_id,
            on_hand: part.quantity_in_stock,
            batch_remaining,
            past_expiry_remaining,
            last_quantity_after: last.map(|t| t.quantity_after),
            delta_sum,
            transaction_count,
        };
        if !reconciliation.is_consistent() {
            warn!(?reconciliation, "Part does not reconcile");
        }
        Ok(reconciliation)
    }

    /// Stock-level and expiry alerts for every active part.
    pub async fn scan_alerts(&self, now: DateTime<Utc>) -> DbResult<Vec<StockAlert>> {
        let today = now.date_naive();
        let parts = PartRepository::fetch_all_active(&self.pool).await?;

        let mut alerts = Vec::new();
        for part in &parts {
            let batches = BatchRepository::fetch_stocked(&self.pool, part.id).await?;
            alerts.extend(evaluate_part(
                part,
                &batches,
                today,
                self.settings.expiry_warning_days,
            ));
        }

        debug!(parts = parts.len(), alerts = alerts.len(), "Alert scan complete");
        Ok(alerts)
    }

    // =========================================================================
    // Unit of work
    // =========================================================================

    async fn part_of_batch(&self, batch_id: i64) -> DbResult<i64> {
        BatchRepository::fetch(&self.pool, batch_id)
            .await?
            .map(|b| b.part_id)
            .ok_or_else(|| CoreError::not_found("InventoryBatch", batch_id).into())
    }

    /// Steps 2-4: lock, begin, touch the part row.
    async fn open(&self, part_id: i64) -> DbResult<PartWork> {
        let guard = self
            .locks
            .acquire(part_id, self.settings.lock_timeout())
            .await?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let part = PartRepository::touch_for_update(&mut tx, part_id, now).await?;

        // Keeps the chain ordered by date even if the clock stepped back.
        let transaction_date = StockTransactionRepository::fetch_last(&mut *tx, part_id)
            .await?
            .map_or(now, |last| last.transaction_date.max(now));

        Ok(PartWork {
            _guard: guard,
            tx,
            on_hand: part.quantity_in_stock,
            part,
            now,
            transaction_date,
        })
    }
}

/// An open unit of work on one part.
struct PartWork {
    _guard: PartGuard,
    tx: Transaction<'static, Sqlite>,
    part: Part,
    now: DateTime<Utc>,
    transaction_date: DateTime<Utc>,
    /// On-hand after the rows appended so far.
    on_hand: i64,
}

impl PartWork {
    /// The batch as seen inside this unit; it must belong to the part.
    async fn batch(&mut self, batch_id: i64) -> DbResult<InventoryBatch> {
        BatchRepository::fetch(&mut *self.tx, batch_id)
            .await?
            .filter(|b| b.part_id == self.part.id)
            .ok_or_else(|| CoreError::not_found("InventoryBatch", batch_id).into())
    }

    /// A transaction row chained onto the current on-hand. Append it before
    /// building the next one.
    fn entry(
        &self,
        transaction_type: TransactionType,
        batch_id: Option<i64>,
        quantity_delta: i64,
        unit_cost_cents: i64,
    ) -> NewStockTransaction {
        NewStockTransaction {
            part_id: self.part.id,
            batch_id,
            transaction_type,
            quantity_delta,
            quantity_before: self.on_hand,
            unit_cost_cents,
            unit_price_cents: None,
            transaction_date: self.transaction_date,
            supplier_id: None,
            service_order_id: None,
            reference_number: None,
            performed_by: None,
            notes: None,
        }
    }

    async fn append(&mut self, entry: NewStockTransaction) -> DbResult<StockTransaction> {
        let row = StockTransactionRepository::append(&mut self.tx, &entry, self.now).await?;
        self.on_hand = row.quantity_after;
        Ok(row)
    }

    /// Steps 8-9: recompute the part's totals from its batches and commit.
    async fn commit(mut self, updated_by: Option<&str>) -> DbResult<()> {
        let part_id = self.part.id;
        let (quantity, value) = BatchRepository::stocked_totals(&mut *self.tx, part_id).await?;

        if quantity != self.on_hand {
            warn!(part_id, batches = quantity, chain = self.on_hand, "Ledger mismatch, rolling back");
            return Err(DbError::LedgerIntegrity {
                part_id,
                detail: format!(
                    "stocked batches hold {quantity}, transaction chain ends at {}",
                    self.on_hand
                ),
            });
        }

        let average_cost_cents = if quantity > 0 {
            Money::from_cents(value).per_unit(quantity).map(|m| m.cents())
        } else {
            None
        };
        PartRepository::write_stock_totals(
            &mut self.tx,
            part_id,
            quantity,
            average_cost_cents,
            self.now,
            updated_by,
        )
        .await?;

        self.tx.commit().await?;
        debug!(part_id, on_hand = quantity, average_cost_cents, "Unit of work committed");
        Ok(())
    }
}

fn concurrent(entity: &str, id: i64) -> DbError {
    CoreError::ConcurrentModification {
        entity: entity.to_string(),
        id,
    }
    .into()
}

/// Returns and adjustments need a batch that still counts toward on-hand.
fn ensure_available(batch: &InventoryBatch) -> Result<(), CoreError> {
    let reason = if batch.is_expired {
        "expired"
    } else if !batch.is_active {
        "inactive"
    } else {
        return Ok(());
    };
    Err(CoreError::BatchUnavailable {
        batch_id: batch.id,
        reason: reason.to_string(),
    })
}

fn describe(location: &BatchLocation) -> String {
    if location.is_unplaced() {
        return "unplaced".to_string();
    }
    let level = |name: &str, id: Option<i64>| id.map(|id| format!("{name} {id}"));
    [
        level("warehouse", location.warehouse_id),
        level("zone", location.zone_id),
        level("bin", location.bin_id),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join("/")
}

// =============================================================================
// Reconciliation
// =============================================================================

/// The three views of a part's on-hand quantity side by side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub part_id: i64,
    /// Cached `parts.quantity_in_stock`.
    pub on_hand: i64,
    /// Σ remaining over batches that count toward on-hand.
    pub batch_remaining: i64,
    /// Part of `batch_remaining` held by batches past their expiry date that
    /// the expiry sweep has not written off yet.
    pub past_expiry_remaining: i64,
    /// `quantity_after` of the newest transaction.
    pub last_quantity_after: Option<i64>,
    /// Σ `quantity_delta` over the whole chain.
    pub delta_sum: i64,
    pub transaction_count: i64,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.on_hand == self.batch_remaining
            && self.last_quantity_after.unwrap_or(0) == self.on_hand
            && self.delta_sum == self.on_hand
    }

    /// On-hand that can still be issued: excludes unswept past-expiry stock.
    pub fn usable_on_hand(&self) -> i64 {
        self.on_hand - self.past_expiry_remaining
    }

    /// True when a sweep is owed before on-hand equals usable stock.
    pub fn needs_expiry_sweep(&self) -> bool {
        self.past_expiry_remaining > 0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
