//! # Stock Check Repository
//!
//! Counting sessions and their per-part counts. Applying a completed check
//! to the batches is the ledger's job
//! ([`InventoryLedger::apply_stock_check`](crate::InventoryLedger::apply_stock_check)).
//!
//! ## Recording a Count
//! ```text
//! record_count(check 3, part 7, counted 9)
//!   check 3 open?                       no → StockCheckState
//!   system = parts.quantity_in_stock    snapshot at record time
//!   INSERT item ... ON CONFLICT (check_id, part_id) DO UPDATE
//!                                       recounting refreshes the snapshot
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::{PartRepository, WarehouseRepository};
use garage_core::stock_check::generate_check_code;
use garage_core::{CoreError, NewStockCheck, StockCheck, StockCheckItem, StockCheckStatus};

/// Repository for stock checks.
#[derive(Debug, Clone)]
pub struct StockCheckRepository {
    pool: SqlitePool,
}

impl StockCheckRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StockCheckRepository { pool }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Opens a check. Its location, if any, must resolve to live topology.
    ///
    /// ## Errors
    /// - `DuplicateCode` if the code is taken by a live check
    /// - `InvalidLocation` / `NotFound` for a bad location
    pub async fn create(&self, new: &NewStockCheck) -> DbResult<StockCheck> {
        new.validate()?;

        let now = Utc::now();
        let code = match &new.code {
            Some(code) => code.trim().to_string(),
            None => generate_check_code(now),
        };

        let mut tx = self.pool.begin().await?;
        let location = WarehouseRepository::resolve_in(&mut tx, &new.location).await?;
        debug!(code = %code, warehouse_id = location.warehouse_id, "Opening stock check");

        let check = sqlx::query_as::<_, StockCheck>(
            r#"
            INSERT INTO inventory_checks (code, name, warehouse_id, zone_id, bin_id, status,
                                          started_at, notes, created_at, created_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(&code)
        .bind(new.name.trim())
        .bind(location.warehouse_id)
        .bind(location.zone_id)
        .bind(location.bin_id)
        .bind(StockCheckStatus::Open)
        .bind(now)
        .bind(&new.notes)
        .bind(now)
        .bind(&new.created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            DbError::from(e).on_unique(|| CoreError::duplicate_code("inventory_checks", &code))
        })?;
        tx.commit().await?;

        info!(check_id = check.id, code = %check.code, "Stock check opened");
        Ok(check)
    }

    // =========================================================================
    // Read
    // =========================================================================

    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<StockCheck>> {
        Self::fetch(&self.pool, id).await
    }

    /// Like [`get_by_id`](Self::get_by_id), but a missing check is `NotFound`.
    pub async fn get(&self, id: i64) -> DbResult<StockCheck> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("StockCheck", id).into())
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<StockCheck>> {
        let check = sqlx::query_as::<_, StockCheck>(
            "SELECT * FROM inventory_checks WHERE code = ? AND is_deleted = 0",
        )
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(check)
    }

    /// Counts recorded on a check, by part.
    pub async fn items(&self, check_id: i64) -> DbResult<Vec<StockCheckItem>> {
        let items = sqlx::query_as::<_, StockCheckItem>(
            r#"
            SELECT * FROM inventory_check_items
            WHERE check_id = ? AND is_deleted = 0
            ORDER BY part_id
            "#,
        )
        .bind(check_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    // =========================================================================
    // Counting
    // =========================================================================

    /// Records (or re-records) the counted quantity of a part.
    ///
    /// The system quantity is the part's on-hand at this moment.
    ///
    /// ## Errors
    /// - `StockCheckState` unless the check is open
    /// - `InvalidQuantity` for a negative count
    /// - `NotFound` for a missing check or part
    pub async fn record_count(
        &self,
        check_id: i64,
        part_id: i64,
        counted_quantity: i64,
        notes: Option<&str>,
        counted_by: Option<&str>,
    ) -> DbResult<StockCheckItem> {
        if counted_quantity < 0 {
            return Err(CoreError::invalid_quantity("counted_quantity", counted_quantity).into());
        }

        let mut tx = self.pool.begin().await?;
        let check = Self::fetch(&mut *tx, check_id)
            .await?
            .ok_or_else(|| CoreError::not_found("StockCheck", check_id))?;
        check.ensure_status(StockCheckStatus::Open)?;
        let part = PartRepository::fetch(&mut *tx, part_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Part", part_id))?;

        let now = Utc::now();
        let item = sqlx::query_as::<_, StockCheckItem>(
            r#"
            INSERT INTO inventory_check_items (check_id, part_id, system_quantity,
                                               counted_quantity, notes, created_at, created_by)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (check_id, part_id) DO UPDATE SET
                system_quantity = excluded.system_quantity,
                counted_quantity = excluded.counted_quantity,
                notes = excluded.notes,
                updated_at = ?6, updated_by = ?7
            RETURNING *
            "#,
        )
        .bind(check_id)
        .bind(part_id)
        .bind(part.quantity_in_stock)
        .bind(counted_quantity)
        .bind(notes)
        .bind(now)
        .bind(counted_by)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!(
            check_id,
            part_id,
            system = item.system_quantity,
            counted = item.counted_quantity,
            "Count recorded"
        );
        Ok(item)
    }

    /// Freezes the counts of an open check.
    pub async fn complete(&self, check_id: i64, completed_by: Option<&str>) -> DbResult<StockCheck> {
        let mut tx = self.pool.begin().await?;
        let check = Self::fetch(&mut *tx, check_id)
            .await?
            .ok_or_else(|| CoreError::not_found("StockCheck", check_id))?;
        check.ensure_status(StockCheckStatus::Open)?;

        let now = Utc::now();
        let check = sqlx::query_as::<_, StockCheck>(
            r#"
            UPDATE inventory_checks SET
                status = ?, completed_at = ?, completed_by = ?,
                updated_at = ?, updated_by = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(StockCheckStatus::Completed)
        .bind(now)
        .bind(completed_by)
        .bind(now)
        .bind(completed_by)
        .bind(check_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(check_id, code = %check.code, "Stock check completed");
        Ok(check)
    }

    // =========================================================================
    // Ledger-only access
    // =========================================================================

    pub(crate) async fn fetch<'e, E>(executor: E, id: i64) -> DbResult<Option<StockCheck>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let check = sqlx::query_as::<_, StockCheck>(
            "SELECT * FROM inventory_checks WHERE id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(check)
    }

    /// Items with a discrepancy that has not been applied yet.
    pub(crate) async fn fetch_pending<'e, E>(executor: E, check_id: i64) -> DbResult<Vec<StockCheckItem>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let items = sqlx::query_as::<_, StockCheckItem>(
            r#"
            SELECT * FROM inventory_check_items
            WHERE check_id = ? AND is_deleted = 0 AND is_adjusted = 0
              AND counted_quantity <> system_quantity
            ORDER BY part_id
            "#,
        )
        .bind(check_id)
        .fetch_all(executor)
        .await?;
        Ok(items)
    }

    /// Flags an item as applied. False if it already was.
    pub(crate) async fn mark_item_adjusted(
        conn: &mut SqliteConnection,
        item_id: i64,
        now: DateTime<Utc>,
        updated_by: Option<&str>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_check_items SET
                is_adjusted = 1, adjusted_at = ?1,
                updated_at = ?1, updated_by = ?2
            WHERE id = ?3 AND is_adjusted = 0
            "#,
        )
        .bind(now)
        .bind(updated_by)
        .bind(item_id)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Moves a check from `from` to `to`. False if it was not in `from`.
    pub(crate) async fn set_status<'e, E>(
        executor: E,
        check_id: i64,
        from: StockCheckStatus,
        to: StockCheckStatus,
        updated_by: Option<&str>,
    ) -> DbResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE inventory_checks SET status = ?, updated_at = ?, updated_by = ?
            WHERE id = ? AND status = ? AND is_deleted = 0
            "#,
        )
        .bind(to)
        .bind(Utc::now())
        .bind(updated_by)
        .bind(check_id)
        .bind(from)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
