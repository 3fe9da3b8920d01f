//! # Usage Repository
//!
//! Batch usages: which batch fed which service order, at what cost.
//!
//! Usages are written by allocations and credited by returns. A usage is
//! never edited beyond its `quantity_returned` counter, so the cost basis
//! recorded at the time of use never changes.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use garage_core::{AllocationRequest, AllocationSlice, BatchUsage};

/// Repository for batch usages.
#[derive(Debug, Clone)]
pub struct UsageRepository {
    pool: SqlitePool,
}

impl UsageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UsageRepository { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<BatchUsage>> {
        let usage = sqlx::query_as::<_, BatchUsage>(
            "SELECT * FROM part_batch_usages WHERE id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(usage)
    }

    /// Usages drawn from a batch, in the order they were recorded.
    pub async fn for_batch(&self, batch_id: i64) -> DbResult<Vec<BatchUsage>> {
        let usages = sqlx::query_as::<_, BatchUsage>(
            "SELECT * FROM part_batch_usages WHERE batch_id = ? AND is_deleted = 0 ORDER BY id",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(usages)
    }

    /// Usages recorded against a service order.
    pub async fn for_order(&self, service_order_id: i64) -> DbResult<Vec<BatchUsage>> {
        Self::fetch_for_order(&self.pool, service_order_id).await
    }

    pub(crate) async fn fetch_for_order<'e, E>(
        executor: E,
        service_order_id: i64,
    ) -> DbResult<Vec<BatchUsage>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let usages = sqlx::query_as::<_, BatchUsage>(
            r#"
            SELECT * FROM part_batch_usages
            WHERE service_order_id = ? AND is_deleted = 0
            ORDER BY part_id, id
            "#,
        )
        .bind(service_order_id)
        .fetch_all(executor)
        .await?;
        Ok(usages)
    }

    /// Records one slice of an allocation.
    pub(crate) async fn insert(
        conn: &mut SqliteConnection,
        request: &AllocationRequest,
        slice: &AllocationSlice,
        unit_price_cents: i64,
        now: DateTime<Utc>,
    ) -> DbResult<BatchUsage> {
        let usage = sqlx::query_as::<_, BatchUsage>(
            r#"
            INSERT INTO part_batch_usages (
                batch_id, part_id, service_order_id, service_order_part_id,
                quantity_used, unit_cost_cents, unit_price_cents,
                total_cost_cents, total_price_cents, usage_date,
                customer_id, customer_name, customer_type, vehicle_id, vehicle_plate,
                requires_invoice, notes, created_at, created_by
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(slice.batch_id)
        .bind(request.part_id)
        .bind(request.service_order_id)
        .bind(request.service_order_part_id)
        .bind(slice.quantity)
        .bind(slice.unit_cost_cents)
        .bind(unit_price_cents)
        .bind(slice.cost().cents())
        .bind(unit_price_cents * slice.quantity)
        .bind(now)
        .bind(request.customer_id)
        .bind(&request.customer_name)
        .bind(request.customer_type)
        .bind(request.vehicle_id)
        .bind(&request.vehicle_plate)
        .bind(slice.has_invoice)
        .bind(&request.notes)
        .bind(now)
        .bind(&request.performed_by)
        .fetch_one(&mut *conn)
        .await?;

        debug!(
            usage_id = usage.id,
            batch_id = usage.batch_id,
            service_order_id = usage.service_order_id,
            quantity = usage.quantity_used,
            "Usage recorded"
        );
        Ok(usage)
    }

    /// Outstanding (not fully returned) usages of a batch, newest first.
    pub(crate) async fn fetch_outstanding(
        conn: &mut SqliteConnection,
        batch_id: i64,
        service_order_id: Option<i64>,
    ) -> DbResult<Vec<BatchUsage>> {
        let usages = sqlx::query_as::<_, BatchUsage>(
            r#"
            SELECT * FROM part_batch_usages
            WHERE batch_id = ?1 AND is_deleted = 0
              AND quantity_returned < quantity_used
              AND (?2 IS NULL OR service_order_id = ?2)
            ORDER BY usage_date DESC, id DESC
            "#,
        )
        .bind(batch_id)
        .bind(service_order_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(usages)
    }

    /// Adds `quantity` to a usage's `quantity_returned`.
    pub(crate) async fn credit_return(
        conn: &mut SqliteConnection,
        usage_id: i64,
        quantity: i64,
        now: DateTime<Utc>,
        updated_by: Option<&str>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE part_batch_usages SET
                quantity_returned = quantity_returned + ?1,
                updated_at = ?2, updated_by = ?3
            WHERE id = ?4 AND quantity_returned + ?1 <= quantity_used
            "#,
        )
        .bind(quantity)
        .bind(now)
        .bind(updated_by)
        .bind(usage_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{memory_db, seed_part};
    use garage_core::{AllocationRequest, BatchSource, CustomerType, ReceiveBatch};

    #[tokio::test]
    async fn test_usage_copies_context() {
        let db = memory_db().await;
        let part = seed_part(&db, "WPR-001").await;
        let ledger = db.ledger();
        ledger
            .receive_batch(ReceiveBatch::purchase(part.id, 4, 900, 3, "INV-9"))
            .await
            .unwrap();

        let request = AllocationRequest::new(part.id, 3, 501)
            .for_customer(8, "Fleet Co", CustomerType::Company)
            .for_vehicle(21, "51A-123.45")
            .priced_at(1500);
        let allocation = ledger.allocate(request).await.unwrap();

        let usages = db.usages().for_order(501).await.unwrap();
        assert_eq!(usages.len(), 1);
        let usage = &usages[0];
        assert_eq!(usage.id, allocation.usages[0].id);
        assert_eq!(usage.quantity_used, 3);
        assert_eq!(usage.unit_cost_cents, 900);
        assert_eq!(usage.total_cost_cents, 2700);
        assert_eq!(usage.total_price_cents, 4500);
        assert_eq!(usage.customer_type, Some(CustomerType::Company));
        assert_eq!(usage.vehicle_plate.as_deref(), Some("51A-123.45"));
        assert!(usage.requires_invoice);

        assert_eq!(db.usages().for_batch(usage.batch_id).await.unwrap().len(), 1);
        assert!(db.usages().for_order(999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_usage_defaults_to_sell_price() {
        let db = memory_db().await;
        let part = seed_part(&db, "WPR-002").await;
        let ledger = db.ledger();
        ledger
            .receive_batch(ReceiveBatch::new(part.id, 2, 400, BatchSource::OpeningBalance))
            .await
            .unwrap();

        let allocation = ledger
            .allocate(AllocationRequest::new(part.id, 1, 600))
            .await
            .unwrap();
        assert_eq!(allocation.usages[0].unit_price_cents, part.sell_price_cents);
        assert!(!allocation.usages[0].requires_invoice);
    }
}
