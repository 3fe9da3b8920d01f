//! # Batch Repository
//!
//! Reads over the batch ledger plus the crate-private writers the
//! [`InventoryLedger`](crate::ledger::InventoryLedger) uses.
//!
//! ## Compare-and-Swap Writes
//! ```text
//! UPDATE part_inventory_batches
//!    SET quantity_remaining = quantity_remaining + :delta,
//!        row_version        = row_version + 1
//!  WHERE id = :id
//!    AND row_version = :expected                 ◄── lost race → 0 rows
//!    AND quantity_remaining + :delta BETWEEN 0 AND quantity_received
//! ```
//! Every writer returns `false` when no row matched; the ledger turns that
//! into `ConcurrentModification` and rolls the whole unit back.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use garage_core::{BatchLocation, CoreError, InventoryBatch, ReceiveBatch};

/// Stocked-batch filter: counts toward on-hand.
const ON_HAND: &str = "is_active = 1 AND is_expired = 0 AND is_deleted = 0";

/// Repository for inventory batches.
#[derive(Debug, Clone)]
pub struct BatchRepository {
    pool: SqlitePool,
}

impl BatchRepository {
    pub fn new(pool: SqlitePool) -> Self {
        BatchRepository { pool }
    }

    // =========================================================================
    // Read
    // =========================================================================

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<InventoryBatch>> {
        Self::fetch(&self.pool, id).await
    }

    /// Gets a batch by ID, or `NotFound`.
    pub async fn get(&self, id: i64) -> DbResult<InventoryBatch> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("InventoryBatch", id).into())
    }

    /// Every batch of a part (depleted and expired included), oldest first.
    pub async fn list_for_part(&self, part_id: i64) -> DbResult<Vec<InventoryBatch>> {
        let batches = sqlx::query_as::<_, InventoryBatch>(
            r#"
            SELECT * FROM part_inventory_batches
            WHERE part_id = ? AND is_deleted = 0
            ORDER BY receive_date, id
            "#,
        )
        .bind(part_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(batches)
    }

    /// Batches that count toward the part's on-hand quantity and still hold
    /// stock, oldest first.
    pub async fn list_stocked(&self, part_id: i64) -> DbResult<Vec<InventoryBatch>> {
        Self::fetch_stocked(&self.pool, part_id).await
    }

    /// Batches placed in a bin.
    pub async fn list_in_bin(&self, bin_id: i64) -> DbResult<Vec<InventoryBatch>> {
        let batches = sqlx::query_as::<_, InventoryBatch>(
            r#"
            SELECT * FROM part_inventory_batches
            WHERE bin_id = ? AND is_deleted = 0 AND quantity_remaining > 0
            ORDER BY part_id, receive_date, id
            "#,
        )
        .bind(bin_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(batches)
    }

    // =========================================================================
    // Ledger-only access
    // =========================================================================

    pub(crate) async fn fetch<'e, E>(executor: E, id: i64) -> DbResult<Option<InventoryBatch>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let batch = sqlx::query_as::<_, InventoryBatch>(
            "SELECT * FROM part_inventory_batches WHERE id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(batch)
    }

    pub(crate) async fn fetch_stocked<'e, E>(
        executor: E,
        part_id: i64,
    ) -> DbResult<Vec<InventoryBatch>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let batches = sqlx::query_as::<_, InventoryBatch>(&format!(
            r#"
            SELECT * FROM part_inventory_batches
            WHERE part_id = ? AND {ON_HAND} AND quantity_remaining > 0
            ORDER BY receive_date, id
            "#
        ))
        .bind(part_id)
        .fetch_all(executor)
        .await?;
        Ok(batches)
    }

    /// Every batch counting toward on-hand, depleted ones included.
    pub(crate) async fn fetch_on_hand<'e, E>(
        executor: E,
        part_id: i64,
    ) -> DbResult<Vec<InventoryBatch>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let batches = sqlx::query_as::<_, InventoryBatch>(&format!(
            r#"
            SELECT * FROM part_inventory_batches
            WHERE part_id = ? AND {ON_HAND}
            ORDER BY receive_date, id
            "#
        ))
        .bind(part_id)
        .fetch_all(executor)
        .await?;
        Ok(batches)
    }

    /// Stocked, not yet flagged batches whose expiry date is before `today`.
    pub(crate) async fn fetch_past_expiry<'e, E>(
        executor: E,
        today: NaiveDate,
    ) -> DbResult<Vec<InventoryBatch>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let batches = sqlx::query_as::<_, InventoryBatch>(&format!(
            r#"
            SELECT * FROM part_inventory_batches
            WHERE {ON_HAND} AND quantity_remaining > 0
              AND expiry_date IS NOT NULL AND expiry_date < ?
              AND part_id IN (SELECT id FROM parts WHERE is_deleted = 0)
            ORDER BY part_id, expiry_date, id
            "#
        ))
        .bind(today)
        .fetch_all(executor)
        .await?;
        Ok(batches)
    }

    /// `(Σ remaining, Σ remaining × unit cost)` over the part's on-hand batches.
    pub(crate) async fn stocked_totals<'e, E>(executor: E, part_id: i64) -> DbResult<(i64, i64)>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let totals = sqlx::query_as::<_, (i64, i64)>(&format!(
            r#"
            SELECT COALESCE(SUM(quantity_remaining), 0),
                   COALESCE(SUM(quantity_remaining * unit_cost_cents), 0)
            FROM part_inventory_batches
            WHERE part_id = ? AND {ON_HAND}
            "#
        ))
        .bind(part_id)
        .fetch_one(executor)
        .await?;
        Ok(totals)
    }

    /// Inserts a new batch with `quantity_remaining = quantity`.
    ///
    /// `DuplicateCode` if the batch number is taken for the part.
    pub(crate) async fn insert(
        conn: &mut SqliteConnection,
        request: &ReceiveBatch,
        batch_number: &str,
        receive_date: DateTime<Utc>,
        location: &BatchLocation,
        now: DateTime<Utc>,
    ) -> DbResult<InventoryBatch> {
        debug!(part_id = request.part_id, batch_number, quantity = request.quantity, "Inserting batch");

        sqlx::query_as::<_, InventoryBatch>(
            r#"
            INSERT INTO part_inventory_batches (
                part_id, batch_number, receive_date, quantity_received, quantity_remaining,
                unit_cost_cents, source, has_invoice, invoice_number, invoice_date,
                supplier_id, purchase_order_id, warehouse_id, zone_id, bin_id, expiry_date,
                can_use_for_company, can_use_for_insurance, can_use_for_individual,
                notes, created_at, created_by
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(request.part_id)
        .bind(batch_number)
        .bind(receive_date)
        .bind(request.quantity)
        .bind(request.quantity)
        .bind(request.unit_cost_cents)
        .bind(request.source)
        .bind(request.has_invoice())
        .bind(&request.invoice_number)
        .bind(request.invoice_date)
        .bind(request.supplier_id)
        .bind(request.purchase_order_id)
        .bind(location.warehouse_id)
        .bind(location.zone_id)
        .bind(location.bin_id)
        .bind(request.expiry_date)
        .bind(request.usage.can_use_for_company)
        .bind(request.usage.can_use_for_insurance)
        .bind(request.usage.can_use_for_individual)
        .bind(&request.notes)
        .bind(now)
        .bind(&request.performed_by)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| {
            DbError::from(e).on_unique(|| {
                CoreError::duplicate_code(format!("part {} batches", request.part_id), batch_number)
            })
        })
    }

    /// Moves `quantity_remaining` by `delta` if the batch is still at
    /// `expected_version` and the result stays within `[0, received]`.
    pub(crate) async fn shift_remaining(
        conn: &mut SqliteConnection,
        batch_id: i64,
        delta: i64,
        expected_version: i64,
        now: DateTime<Utc>,
        updated_by: Option<&str>,
    ) -> DbResult<bool> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE part_inventory_batches SET
                quantity_remaining = quantity_remaining + ?1,
                row_version = row_version + 1,
                updated_at = ?2, updated_by = ?3
            WHERE id = ?4 AND row_version = ?5 AND {ON_HAND}
              AND quantity_remaining + ?1 >= 0
              AND quantity_remaining + ?1 <= quantity_received
            "#
        ))
        .bind(delta)
        .bind(now)
        .bind(updated_by)
        .bind(batch_id)
        .bind(expected_version)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub(crate) async fn set_location(
        conn: &mut SqliteConnection,
        batch_id: i64,
        location: &BatchLocation,
        expected_version: i64,
        now: DateTime<Utc>,
        updated_by: Option<&str>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE part_inventory_batches SET
                warehouse_id = ?, zone_id = ?, bin_id = ?,
                row_version = row_version + 1,
                updated_at = ?, updated_by = ?
            WHERE id = ? AND row_version = ? AND is_deleted = 0
            "#,
        )
        .bind(location.warehouse_id)
        .bind(location.zone_id)
        .bind(location.bin_id)
        .bind(now)
        .bind(updated_by)
        .bind(batch_id)
        .bind(expected_version)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Flags a batch as expired. Its remaining quantity stays for audit.
    pub(crate) async fn mark_expired(
        conn: &mut SqliteConnection,
        batch_id: i64,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE part_inventory_batches SET
                is_expired = 1,
                row_version = row_version + 1,
                updated_at = ?
            WHERE id = ? AND row_version = ? AND is_expired = 0
            "#,
        )
        .bind(now)
        .bind(batch_id)
        .bind(expected_version)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_db, seed_part};
    use garage_core::BatchSource;

    #[tokio::test]
    async fn test_shift_remaining_is_compare_and_swap() {
        let db = memory_db().await;
        let part = seed_part(&db, "FLT-001").await;
        let batch = db
            .ledger()
            .receive_batch(ReceiveBatch::new(part.id, 10, 500, BatchSource::Purchase))
            .await
            .unwrap();

        let mut conn = db.pool().acquire().await.unwrap();
        let now = Utc::now();

        assert!(BatchRepository::shift_remaining(&mut conn, batch.id, -4, batch.row_version, now, None)
            .await
            .unwrap());
        // Stale version loses.
        assert!(!BatchRepository::shift_remaining(&mut conn, batch.id, -1, batch.row_version, now, None)
            .await
            .unwrap());
        // Cannot go above received or below zero.
        let current = BatchRepository::fetch(&mut *conn, batch.id).await.unwrap().unwrap();
        assert_eq!(current.quantity_remaining, 6);
        assert!(!BatchRepository::shift_remaining(&mut conn, batch.id, 5, current.row_version, now, None)
            .await
            .unwrap());
        assert!(!BatchRepository::shift_remaining(&mut conn, batch.id, -7, current.row_version, now, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_list_for_part_keeps_depleted() {
        let db = memory_db().await;
        let part = seed_part(&db, "FLT-002").await;
        let ledger = db.ledger();
        ledger
            .receive_batch(ReceiveBatch::new(part.id, 2, 500, BatchSource::Purchase))
            .await
            .unwrap();
        ledger
            .receive_batch(ReceiveBatch::new(part.id, 3, 700, BatchSource::Salvage))
            .await
            .unwrap();
        ledger
            .allocate(garage_core::AllocationRequest::new(part.id, 2, 77))
            .await
            .unwrap();

        let repo = db.batches();
        assert_eq!(repo.list_for_part(part.id).await.unwrap().len(), 2);
        let stocked = repo.list_stocked(part.id).await.unwrap();
        assert_eq!(stocked.len(), 1);
        assert_eq!(stocked[0].unit_cost_cents, 700);

        let (qty, value) = BatchRepository::stocked_totals(db.pool(), part.id).await.unwrap();
        assert_eq!((qty, value), (3, 2100));
    }

    #[tokio::test]
    async fn test_get_missing_batch() {
        let db = memory_db().await;
        let err = db.batches().get(12).await.unwrap_err();
        assert_eq!(err.domain(), Some(&CoreError::not_found("InventoryBatch", 12)));
    }
}
