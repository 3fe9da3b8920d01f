//! # Applying Stock Checks
//!
//! Turns the discrepancies of a completed check into batch adjustments.
//!
//! ```text
//! apply_stock_check(check)
//!   check completed?                   no → StockCheckState
//!   for each pending item (by part):   one unit of work per part
//!     lock part, BEGIN
//!     flag item adjusted               already flagged → skip
//!     plan over on-hand batches        shortage → oldest first
//!                                      surplus  → newest with room
//!     CAS each batch + Adjustment row  reference = check code
//!     COMMIT
//!   nothing pending → check adjusted
//! ```
//! A failure leaves earlier parts applied and the check `completed`;
//! calling again continues with the items still pending.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{concurrent, InventoryLedger};
use crate::error::DbResult;
use crate::repository::{BatchRepository, StockCheckRepository};
use garage_core::stock_check::plan_count_adjustment;
use garage_core::{CoreError, NewStockTransaction, StockCheckStatus, StockTransaction, TransactionType};

/// Outcome of [`InventoryLedger::apply_stock_check`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockCheckApplication {
    pub check_id: i64,
    /// Items applied by this call.
    pub items_adjusted: usize,
    /// `Adjustment` rows written by this call, in order.
    pub transactions: Vec<StockTransaction>,
}

impl InventoryLedger {
    /// Applies every pending discrepancy of a completed check, then marks
    /// the check adjusted.
    ///
    /// Each discrepancy is a delta on current stock, so issues and receipts
    /// made after counting are kept.
    ///
    /// ## Errors
    /// - `StockCheckState` unless the check is completed
    /// - `InsufficientStock` when a shortage exceeds current stock
    /// - `CountSurplus` when a surplus exceeds the room in usable batches
    pub async fn apply_stock_check(
        &self,
        check_id: i64,
        performed_by: Option<&str>,
    ) -> DbResult<StockCheckApplication> {
        let check = StockCheckRepository::fetch(&self.pool, check_id)
            .await?
            .ok_or_else(|| CoreError::not_found("StockCheck", check_id))?;
        check.ensure_status(StockCheckStatus::Completed)?;

        let pending = StockCheckRepository::fetch_pending(&self.pool, check_id).await?;
        debug!(check_id, pending = pending.len(), "Applying stock check");

        let notes = format!("Stock check {}", check.code);
        let mut application = StockCheckApplication {
            check_id,
            items_adjusted: 0,
            transactions: Vec::new(),
        };

        for item in pending {
            let mut work = self.open(item.part_id).await?;
            if !StockCheckRepository::mark_item_adjusted(&mut work.tx, item.id, work.now, performed_by)
                .await?
            {
                debug!(check_id, part_id = item.part_id, "Count already applied");
                continue;
            }

            let batches = BatchRepository::fetch_on_hand(&mut *work.tx, item.part_id).await?;
            let plan = plan_count_adjustment(
                item.part_id,
                &batches,
                item.discrepancy(),
                work.now.date_naive(),
            )?;

            let mut rows = Vec::with_capacity(plan.len());
            for step in &plan {
                if !BatchRepository::shift_remaining(
                    &mut work.tx,
                    step.batch_id,
                    step.delta,
                    step.expected_row_version,
                    work.now,
                    performed_by,
                )
                .await?
                {
                    return Err(concurrent("InventoryBatch", step.batch_id));
                }

                let entry = NewStockTransaction {
                    reference_number: Some(check.code.clone()),
                    performed_by: performed_by.map(str::to_string),
                    notes: Some(notes.clone()),
                    ..work.entry(
                        TransactionType::Adjustment,
                        Some(step.batch_id),
                        step.delta,
                        step.unit_cost_cents,
                    )
                };
                rows.push(work.append(entry).await?);
            }
            work.commit(performed_by).await?;

            info!(
                check_id,
                part_id = item.part_id,
                discrepancy = item.discrepancy(),
                batches = plan.len(),
                "Count applied"
            );
            application.items_adjusted += 1;
            application.transactions.extend(rows);
        }

        StockCheckRepository::set_status(
            &self.pool,
            check_id,
            StockCheckStatus::Completed,
            StockCheckStatus::Adjusted,
            performed_by,
        )
        .await?;

        info!(
            check_id,
            code = %check.code,
            items = application.items_adjusted,
            "Stock check applied"
        );
        Ok(application)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_db, seed_part};
    use crate::Database;
    use chrono::{TimeZone, Utc};
    use garage_core::{AllocationRequest, BatchSource, NewStockCheck, Part, ReceiveBatch};

    /// Part with B1 (5 @ 10.00, day 1) and B2 (10 @ 12.00, day 2).
    async fn stocked_part(db: &Database, part_number: &str) -> Part {
        let part = seed_part(db, part_number).await;
        let ledger = db.ledger();
        for (day, quantity, cost) in [(1, 5, 1000), (2, 10, 1200)] {
            ledger
                .receive_batch(
                    ReceiveBatch::new(part.id, quantity, cost, BatchSource::Purchase)
                        .received_at(Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap()),
                )
                .await
                .unwrap();
        }
        part
    }

    async fn completed_check(db: &Database, counts: &[(i64, i64)]) -> i64 {
        let checks = db.stock_checks();
        let check = checks.create(&NewStockCheck::new("Count")).await.unwrap();
        for &(part_id, counted) in counts {
            checks.record_count(check.id, part_id, counted, None, Some("sam")).await.unwrap();
        }
        checks.complete(check.id, Some("lead")).await.unwrap();
        check.id
    }

    async fn on_hand(db: &Database, part_id: i64) -> i64 {
        db.parts().get(part_id).await.unwrap().quantity_in_stock
    }

    #[tokio::test]
    async fn test_shortage_drains_oldest_batches() {
        let db = memory_db().await;
        let part = stocked_part(&db, "CNT-001").await;
        let check_id = completed_check(&db, &[(part.id, 8)]).await;

        let applied = db.ledger().apply_stock_check(check_id, Some("lead")).await.unwrap();
        assert_eq!(applied.items_adjusted, 1);
        let deltas: Vec<i64> = applied.transactions.iter().map(|t| t.quantity_delta).collect();
        assert_eq!(deltas, vec![-5, -2]);

        let code = db.stock_checks().get(check_id).await.unwrap().code;
        let last = &applied.transactions[1];
        assert_eq!(last.transaction_type, TransactionType::Adjustment);
        assert_eq!(last.reference_number.as_deref(), Some(code.as_str()));
        assert_eq!(last.quantity_after, 8);

        assert_eq!(on_hand(&db, part.id).await, 8);
        let check = db.stock_checks().get(check_id).await.unwrap();
        assert_eq!(check.status, StockCheckStatus::Adjusted);
        assert!(db.stock_checks().items(check_id).await.unwrap()[0].is_adjusted);
        assert!(db.ledger().reconcile_part(part.id).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn test_surplus_refills_consumed_batches() {
        let db = memory_db().await;
        let part = stocked_part(&db, "CNT-002").await;
        let ledger = db.ledger();
        ledger
            .allocate(AllocationRequest::new(part.id, 7, 501))
            .await
            .unwrap();

        // 8 on hand, 10 found on the shelf
        let check_id = completed_check(&db, &[(part.id, 10)]).await;
        let applied = ledger.apply_stock_check(check_id, None).await.unwrap();

        let steps: Vec<(Option<i64>, i64)> = applied
            .transactions
            .iter()
            .map(|t| (t.batch_id, t.quantity_delta))
            .collect();
        let batches = db.batches().list_for_part(part.id).await.unwrap();
        let newest = batches.iter().max_by_key(|b| b.receive_date).unwrap();
        assert_eq!(steps, vec![(Some(newest.id), 2)]);
        assert_eq!(on_hand(&db, part.id).await, 10);
    }

    #[tokio::test]
    async fn test_matching_count_only_closes_check() {
        let db = memory_db().await;
        let part = stocked_part(&db, "CNT-003").await;
        let check_id = completed_check(&db, &[(part.id, 15)]).await;

        let applied = db.ledger().apply_stock_check(check_id, None).await.unwrap();
        assert_eq!(applied.items_adjusted, 0);
        assert!(applied.transactions.is_empty());
        assert_eq!(
            db.stock_checks().get(check_id).await.unwrap().status,
            StockCheckStatus::Adjusted
        );

        let err = db.ledger().apply_stock_check(check_id, None).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::StockCheckState { status, .. }) if status == "adjusted"
        ));
    }

    #[tokio::test]
    async fn test_open_check_is_not_applied() {
        let db = memory_db().await;
        let part = stocked_part(&db, "CNT-004").await;
        let check = db.stock_checks().create(&NewStockCheck::new("Open")).await.unwrap();
        db.stock_checks().record_count(check.id, part.id, 1, None, None).await.unwrap();

        let err = db.ledger().apply_stock_check(check.id, None).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::StockCheckState { expected, .. }) if expected == "completed"
        ));
        assert_eq!(on_hand(&db, part.id).await, 15);
    }

    #[tokio::test]
    async fn test_failed_part_resumes_on_next_apply() {
        let db = memory_db().await;
        let short = stocked_part(&db, "CNT-005").await;
        let full = stocked_part(&db, "CNT-006").await;
        let ledger = db.ledger();

        // Every batch of `full` is untouched, so a surplus has nowhere to go.
        let check_id = completed_check(&db, &[(short.id, 13), (full.id, 18)]).await;
        let err = ledger.apply_stock_check(check_id, None).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::CountSurplus { surplus: 3, headroom: 0, .. })
        ));
        assert_eq!(on_hand(&db, short.id).await, 13);
        assert_eq!(on_hand(&db, full.id).await, 15);
        assert_eq!(
            db.stock_checks().get(check_id).await.unwrap().status,
            StockCheckStatus::Completed
        );

        // Issuing makes room; the applied part is not adjusted twice.
        ledger
            .allocate(AllocationRequest::new(full.id, 3, 502))
            .await
            .unwrap();
        let applied = ledger.apply_stock_check(check_id, None).await.unwrap();
        assert_eq!(applied.items_adjusted, 1);
        assert_eq!(on_hand(&db, short.id).await, 13);
        assert_eq!(on_hand(&db, full.id).await, 15);
        assert!(ledger.reconcile_part(full.id).await.unwrap().is_consistent());
    }
}
