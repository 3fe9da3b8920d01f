//! # Part Repository
//!
//! Catalog operations: part master data, search and units of measure.
//!
//! ## On-Hand Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  update_details(&part)                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE parts SET name = ?, ... , row_version = row_version + 1        │
//! │  WHERE id = ? AND quantity_in_stock = ? AND row_version = ?            │
//! │       │                                                                 │
//! │       ├── 1 row  → Ok(updated part)                                     │
//! │       └── 0 rows → re-read and explain:                                 │
//! │              gone                  → NotFound                           │
//! │              quantity differs      → StockWriteRejected                 │
//! │              row_version differs   → ConcurrentModification             │
//! │                                                                         │
//! │  quantity_in_stock / average_cost_cents are only written by            │
//! │  write_stock_totals, inside a ledger unit of work.                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::{like_pattern, BatchRepository};
use garage_core::validation::{
    validate_code, validate_conversion_rate, validate_name, validate_new_part,
    validate_non_negative_cents, validate_search_query, validate_threshold, validate_unit_name,
};
use garage_core::{ConversionRate, CoreError, NewPart, Part, PartUnit};

/// Repository for part catalog operations.
#[derive(Debug, Clone)]
pub struct PartRepository {
    pool: SqlitePool,
}

impl PartRepository {
    /// Creates a new PartRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PartRepository { pool }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Creates a catalog entry with zero stock.
    ///
    /// ## Errors
    /// - `Validation` for bad part number, name, SKU, barcode, prices, thresholds
    /// - `DuplicateCode` when the part number, SKU or barcode is taken
    pub async fn create(&self, new: &NewPart) -> DbResult<Part> {
        validate_new_part(new)?;

        let now = Utc::now();
        debug!(part_number = %new.part_number, "Creating part");

        let part = sqlx::query_as::<_, Part>(
            r#"
            INSERT INTO parts (
                part_number, sku, barcode, name, description, category, brand,
                cost_price_cents, average_cost_cents, sell_price_cents,
                minimum_stock, reorder_level, default_unit, sourcing,
                can_use_for_company, can_use_for_insurance, can_use_for_individual,
                created_at, created_by
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(new.part_number.trim())
        .bind(new.sku.as_deref().map(str::trim))
        .bind(new.barcode.as_deref().map(str::trim))
        .bind(new.name.trim())
        .bind(&new.description)
        .bind(&new.category)
        .bind(&new.brand)
        .bind(new.cost_price_cents)
        .bind(new.cost_price_cents)
        .bind(new.sell_price_cents)
        .bind(new.minimum_stock)
        .bind(new.reorder_level)
        .bind(new.default_unit.trim())
        .bind(new.sourcing)
        .bind(new.usage.can_use_for_company)
        .bind(new.usage.can_use_for_insurance)
        .bind(new.usage.can_use_for_individual)
        .bind(now)
        .bind(&new.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            duplicate_code(
                e.into(),
                new.part_number.trim(),
                new.sku.as_deref(),
                new.barcode.as_deref(),
            )
        })?;

        info!(part_id = part.id, part_number = %part.part_number, "Part created");
        Ok(part)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Gets a part by ID. Soft-deleted parts are not returned.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Part>> {
        Self::fetch(&self.pool, id).await
    }

    /// Gets a part by ID, or `NotFound`.
    pub async fn get(&self, id: i64) -> DbResult<Part> {
        self.get_by_id(id)
            .await?
            .ok_or_else(|| CoreError::not_found("Part", id).into())
    }

    pub async fn get_by_part_number(&self, part_number: &str) -> DbResult<Option<Part>> {
        let part = sqlx::query_as::<_, Part>(
            "SELECT * FROM parts WHERE part_number = ? AND is_deleted = 0",
        )
        .bind(part_number.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(part)
    }

    /// Gets a part by SKU (exact match).
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Part>> {
        let part = sqlx::query_as::<_, Part>("SELECT * FROM parts WHERE sku = ? AND is_deleted = 0")
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(part)
    }

    /// Gets a part by barcode (scanner lookup).
    pub async fn get_by_barcode(&self, barcode: &str) -> DbResult<Option<Part>> {
        let part =
            sqlx::query_as::<_, Part>("SELECT * FROM parts WHERE barcode = ? AND is_deleted = 0")
                .bind(barcode.trim())
                .fetch_optional(&self.pool)
                .await?;
        Ok(part)
    }

    /// Lists active parts ordered by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Part>> {
        let parts = sqlx::query_as::<_, Part>(
            r#"
            SELECT * FROM parts
            WHERE is_active = 1 AND is_deleted = 0
            ORDER BY name, id
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(parts)
    }

    /// Searches active parts by part number, SKU, barcode, name or brand.
    ///
    /// An empty query lists active parts.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let pads = db.parts().search("brake", 20).await?;
    /// ```
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Part>> {
        let query = validate_search_query(query)?;
        debug!(query = %query, limit = %limit, "Searching parts");

        if query.is_empty() {
            return self.list_active(limit).await;
        }

        let pattern = like_pattern(&query);
        let parts = sqlx::query_as::<_, Part>(
            r#"
            SELECT * FROM parts
            WHERE is_active = 1 AND is_deleted = 0
              AND (part_number LIKE ?1 ESCAPE '\'
                   OR sku LIKE ?1 ESCAPE '\'
                   OR barcode LIKE ?1 ESCAPE '\'
                   OR name LIKE ?1 ESCAPE '\'
                   OR brand LIKE ?1 ESCAPE '\')
            ORDER BY
                CASE WHEN part_number = ?2 OR sku = ?2 OR barcode = ?2 THEN 0 ELSE 1 END,
                name, id
            LIMIT ?3
            "#,
        )
        .bind(&pattern)
        .bind(&query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = parts.len(), "Search complete");
        Ok(parts)
    }

    /// Counts parts that are not soft-deleted.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM parts WHERE is_deleted = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Writes descriptive, pricing and flag fields of `part`.
    ///
    /// `part` must be a fresh read: its `quantity_in_stock` must equal the
    /// stored value (else `StockWriteRejected`) and its `row_version` must be
    /// current (else `ConcurrentModification`).
    pub async fn update_details(&self, part: &Part, updated_by: Option<&str>) -> DbResult<Part> {
        validate_name("name", &part.name)?;
        if let Some(sku) = &part.sku {
            validate_code("sku", sku)?;
        }
        if let Some(barcode) = &part.barcode {
            validate_code("barcode", barcode)?;
        }
        validate_unit_name(&part.default_unit)?;
        validate_non_negative_cents("cost_price_cents", part.cost_price_cents)?;
        validate_non_negative_cents("sell_price_cents", part.sell_price_cents)?;
        validate_threshold("minimum_stock", part.minimum_stock)?;
        if let Some(level) = part.reorder_level {
            validate_threshold("reorder_level", level)?;
        }

        debug!(part_id = part.id, "Updating part details");

        let updated = sqlx::query_as::<_, Part>(
            r#"
            UPDATE parts SET
                sku = ?, barcode = ?, name = ?, description = ?, category = ?, brand = ?,
                cost_price_cents = ?, sell_price_cents = ?,
                minimum_stock = ?, reorder_level = ?, default_unit = ?, sourcing = ?,
                is_active = ?,
                can_use_for_company = ?, can_use_for_insurance = ?, can_use_for_individual = ?,
                row_version = row_version + 1,
                updated_at = ?, updated_by = ?
            WHERE id = ? AND is_deleted = 0
              AND quantity_in_stock = ? AND row_version = ?
            RETURNING *
            "#,
        )
        .bind(part.sku.as_deref().map(str::trim))
        .bind(part.barcode.as_deref().map(str::trim))
        .bind(part.name.trim())
        .bind(&part.description)
        .bind(&part.category)
        .bind(&part.brand)
        .bind(part.cost_price_cents)
        .bind(part.sell_price_cents)
        .bind(part.minimum_stock)
        .bind(part.reorder_level)
        .bind(part.default_unit.trim())
        .bind(part.sourcing)
        .bind(part.is_active)
        .bind(part.usage.can_use_for_company)
        .bind(part.usage.can_use_for_insurance)
        .bind(part.usage.can_use_for_individual)
        .bind(Utc::now())
        .bind(updated_by)
        .bind(part.id)
        .bind(part.quantity_in_stock)
        .bind(part.row_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            duplicate_code(
                e.into(),
                &part.part_number,
                part.sku.as_deref(),
                part.barcode.as_deref(),
            )
        })?;

        match updated {
            Some(updated) => Ok(updated),
            None => Err(self.explain_rejected_write(part).await),
        }
    }

    async fn explain_rejected_write(&self, part: &Part) -> DbError {
        match self.get_by_id(part.id).await {
            Err(e) => e,
            Ok(None) => CoreError::not_found("Part", part.id).into(),
            Ok(Some(stored)) if stored.quantity_in_stock != part.quantity_in_stock => {
                CoreError::StockWriteRejected {
                    part_id: part.id,
                    stored: stored.quantity_in_stock,
                    given: part.quantity_in_stock,
                }
                .into()
            }
            Ok(Some(_)) => CoreError::ConcurrentModification {
                entity: "Part".to_string(),
                id: part.id,
            }
            .into(),
        }
    }

    /// Sets the minimum stock and reorder level.
    pub async fn adjust_reorder_thresholds(
        &self,
        id: i64,
        minimum_stock: i64,
        reorder_level: Option<i64>,
        updated_by: Option<&str>,
    ) -> DbResult<Part> {
        validate_threshold("minimum_stock", minimum_stock)?;
        if let Some(level) = reorder_level {
            validate_threshold("reorder_level", level)?;
        }

        debug!(part_id = id, minimum_stock, ?reorder_level, "Adjusting reorder thresholds");

        sqlx::query_as::<_, Part>(
            r#"
            UPDATE parts SET
                minimum_stock = ?, reorder_level = ?,
                row_version = row_version + 1,
                updated_at = ?, updated_by = ?
            WHERE id = ? AND is_deleted = 0
            RETURNING *
            "#,
        )
        .bind(minimum_stock)
        .bind(reorder_level)
        .bind(Utc::now())
        .bind(updated_by)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::not_found("Part", id).into())
    }

    /// Soft-deletes a part, freeing its part number, SKU and barcode.
    ///
    /// ## Errors
    /// - `StockRemaining` while any batch still counts stock toward on-hand
    /// - `NotFound` if the part doesn't exist
    pub async fn soft_delete(&self, id: i64, deleted_by: Option<&str>) -> DbResult<()> {
        debug!(part_id = id, "Soft deleting part");

        let now = Utc::now();
        let result = sqlx::query(
            r#"
            UPDATE parts SET
                is_deleted = 1, is_active = 0,
                deleted_at = ?, deleted_by = ?,
                row_version = row_version + 1
            WHERE id = ? AND is_deleted = 0
              AND NOT EXISTS (
                  SELECT 1 FROM part_inventory_batches b
                  WHERE b.part_id = parts.id AND b.quantity_remaining > 0
                    AND b.is_active = 1 AND b.is_expired = 0 AND b.is_deleted = 0
              )
            "#,
        )
        .bind(now)
        .bind(deleted_by)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let part = self.get(id).await?;
            let (quantity, _) = BatchRepository::stocked_totals(&self.pool, id).await?;
            warn!(part_id = id, quantity, "Refusing to delete a part with stock");
            return Err(CoreError::StockRemaining {
                part_id: part.id,
                quantity,
            }
            .into());
        }

        info!(part_id = id, "Part soft deleted");
        Ok(())
    }

    // =========================================================================
    // Units of Measure
    // =========================================================================

    /// Registers an alternate unit: `rate` default units per one `unit_name`.
    ///
    /// ## Errors
    /// - `DuplicateUnitName` if the part already has the unit, or it is the
    ///   part's default unit
    /// - `NotFound` if the part doesn't exist
    ///
    /// ## Example
    /// ```rust,ignore
    /// // A box holds 12 pieces
    /// db.parts().register_alternate_unit(pad.id, "box", ConversionRate::whole(12), false, None).await?;
    /// ```
    pub async fn register_alternate_unit(
        &self,
        part_id: i64,
        unit_name: &str,
        rate: ConversionRate,
        is_default: bool,
        created_by: Option<&str>,
    ) -> DbResult<PartUnit> {
        let unit_name = unit_name.trim();
        validate_unit_name(unit_name)?;
        validate_conversion_rate(rate)?;

        let part = self.get(part_id).await?;
        let duplicate = || CoreError::DuplicateUnitName {
            part_id,
            unit_name: unit_name.to_string(),
        };
        if part.default_unit.eq_ignore_ascii_case(unit_name) {
            return Err(duplicate().into());
        }

        debug!(part_id, unit_name, rate = %rate, "Registering alternate unit");

        let mut tx = self.pool.begin().await?;

        let unit = sqlx::query_as::<_, PartUnit>(
            r#"
            INSERT INTO part_units (part_id, unit_name, conversion_rate_x10000, is_default,
                                    created_at, created_by)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(part_id)
        .bind(unit_name)
        .bind(rate.ten_thousandths())
        .bind(is_default)
        .bind(Utc::now())
        .bind(created_by)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DbError::from(e).on_unique(duplicate))?;

        if is_default {
            sqlx::query(
                "UPDATE part_units SET is_default = 0 WHERE part_id = ? AND id <> ? AND is_default = 1",
            )
            .bind(part_id)
            .bind(unit.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(part_id, unit_id = unit.id, unit_name, "Alternate unit registered");
        Ok(unit)
    }

    /// Lists a part's alternate units.
    pub async fn list_units(&self, part_id: i64) -> DbResult<Vec<PartUnit>> {
        let units = sqlx::query_as::<_, PartUnit>(
            "SELECT * FROM part_units WHERE part_id = ? AND is_deleted = 0 ORDER BY unit_name",
        )
        .bind(part_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(units)
    }

    /// Converts `quantity` of `unit_name` into the part's default unit.
    ///
    /// The result must be a whole number of default units, else
    /// `InvalidQuantity`.
    pub async fn to_default_units(
        &self,
        part_id: i64,
        unit_name: &str,
        quantity: i64,
    ) -> DbResult<i64> {
        let part = self.get(part_id).await?;
        let unit_name = unit_name.trim();
        if part.default_unit.eq_ignore_ascii_case(unit_name) {
            return Ok(quantity);
        }

        let unit = sqlx::query_as::<_, PartUnit>(
            "SELECT * FROM part_units WHERE part_id = ? AND unit_name = ? AND is_deleted = 0",
        )
        .bind(part_id)
        .bind(unit_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| CoreError::not_found("PartUnit", format!("{part_id}/{unit_name}")))?;

        unit.conversion_rate()
            .to_default_units(quantity)
            .ok_or_else(|| CoreError::invalid_quantity(unit_name, quantity).into())
    }

    // =========================================================================
    // Ledger-only access
    // =========================================================================

    pub(crate) async fn fetch<'e, E>(executor: E, id: i64) -> DbResult<Option<Part>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let part = sqlx::query_as::<_, Part>("SELECT * FROM parts WHERE id = ? AND is_deleted = 0")
            .bind(id)
            .fetch_optional(executor)
            .await?;
        Ok(part)
    }

    /// Every active part, for alert scans.
    pub(crate) async fn fetch_all_active<'e, E>(executor: E) -> DbResult<Vec<Part>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let parts = sqlx::query_as::<_, Part>(
            "SELECT * FROM parts WHERE is_active = 1 AND is_deleted = 0 ORDER BY id",
        )
        .fetch_all(executor)
        .await?;
        Ok(parts)
    }

    /// Bumps the part's `row_version` and returns it.
    ///
    /// First statement of every ledger unit of work: the write takes SQLite's
    /// write lock up front, so the rest of the unit never has to upgrade a
    /// read lock.
    pub(crate) async fn touch_for_update(
        conn: &mut SqliteConnection,
        part_id: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Part> {
        sqlx::query_as::<_, Part>(
            r#"
            UPDATE parts SET row_version = row_version + 1, updated_at = ?
            WHERE id = ? AND is_deleted = 0
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(part_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| CoreError::not_found("Part", part_id).into())
    }

    /// Writes the ledger-derived on-hand quantity and average cost.
    ///
    /// `average_cost_cents = None` keeps the stored average (no stock left to
    /// average over).
    pub(crate) async fn write_stock_totals(
        conn: &mut SqliteConnection,
        part_id: i64,
        quantity_in_stock: i64,
        average_cost_cents: Option<i64>,
        now: DateTime<Utc>,
        updated_by: Option<&str>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE parts SET
                quantity_in_stock = ?,
                average_cost_cents = COALESCE(?, average_cost_cents),
                updated_at = ?, updated_by = COALESCE(?, updated_by)
            WHERE id = ?
            "#,
        )
        .bind(quantity_in_stock)
        .bind(average_cost_cents)
        .bind(now)
        .bind(updated_by)
        .bind(part_id)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}

/// Turns a unique violation on `parts` into `DuplicateCode` for the clashing
/// column.
fn duplicate_code(err: DbError, part_number: &str, sku: Option<&str>, barcode: Option<&str>) -> DbError {
    let field = match &err {
        DbError::UniqueViolation { field, .. } => field.clone(),
        _ => return err,
    };
    let code = if field.ends_with(".sku") {
        sku.unwrap_or_default()
    } else if field.ends_with(".barcode") {
        barcode.unwrap_or_default()
    } else {
        part_number
    };
    CoreError::duplicate_code(field, code.trim()).into()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;
    use garage_core::{BatchSource, ReceiveBatch};

    fn brake_pad() -> NewPart {
        NewPart::new("BRK-001", "Front brake pad")
            .with_sku("SKU-BRK-001")
            .with_barcode("4006381333931")
            .with_prices(1000, 1800)
            .with_thresholds(2, Some(6))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let db = memory_db().await;
        let repo = db.parts();

        let part = repo.create(&brake_pad()).await.unwrap();
        assert_eq!(part.quantity_in_stock, 0);
        assert_eq!(part.average_cost_cents, 1000);
        assert_eq!(part.default_unit, "piece");

        let fetched = repo.get(part.id).await.unwrap();
        assert_eq!(fetched.part_number, "BRK-001");
        assert!(repo.get_by_sku("SKU-BRK-001").await.unwrap().is_some());
        assert!(repo.get_by_barcode("4006381333931").await.unwrap().is_some());
        assert!(repo.get_by_part_number("BRK-001").await.unwrap().is_some());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let db = memory_db().await;
        let err = db.parts().get(404).await.unwrap_err();
        assert_eq!(err.domain(), Some(&CoreError::not_found("Part", 404)));
    }

    #[tokio::test]
    async fn test_duplicate_codes() {
        let db = memory_db().await;
        let repo = db.parts();
        repo.create(&brake_pad()).await.unwrap();

        let same_number = NewPart::new("BRK-001", "Other");
        let err = repo.create(&same_number).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::DuplicateCode { code, .. }) if code == "BRK-001"
        ));

        let same_sku = NewPart::new("BRK-002", "Other").with_sku("SKU-BRK-001");
        let err = repo.create(&same_sku).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::DuplicateCode { scope, code }) if scope.ends_with("sku") && code == "SKU-BRK-001"
        ));
    }

    #[tokio::test]
    async fn test_invalid_part_is_validation_error() {
        let db = memory_db().await;
        let err = db
            .parts()
            .create(&NewPart::new("BRK 001", "Bad number"))
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_search() {
        let db = memory_db().await;
        let repo = db.parts();
        repo.create(&brake_pad()).await.unwrap();
        repo.create(&NewPart::new("OIL-5W30", "Engine oil 5W-30"))
            .await
            .unwrap();

        let found = repo.search("brake", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].part_number, "BRK-001");

        let by_sku = repo.search("SKU-BRK", 10).await.unwrap();
        assert_eq!(by_sku.len(), 1);

        assert_eq!(repo.search("", 10).await.unwrap().len(), 2);
        assert!(repo.search("100%", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_details_cannot_write_stock() {
        let db = memory_db().await;
        let repo = db.parts();
        let mut part = repo.create(&brake_pad()).await.unwrap();

        part.name = "Front brake pad (ceramic)".into();
        part.sell_price_cents = 2100;
        let updated = repo.update_details(&part, Some("clerk")).await.unwrap();
        assert_eq!(updated.name, "Front brake pad (ceramic)");
        assert_eq!(updated.sell_price_cents, 2100);
        assert_eq!(updated.row_version, part.row_version + 1);

        let mut sneaky = updated.clone();
        sneaky.quantity_in_stock = 50;
        let err = repo.update_details(&sneaky, None).await.unwrap_err();
        assert_eq!(
            err.domain(),
            Some(&CoreError::StockWriteRejected {
                part_id: part.id,
                stored: 0,
                given: 50
            })
        );
        assert_eq!(repo.get(part.id).await.unwrap().quantity_in_stock, 0);
    }

    #[tokio::test]
    async fn test_update_details_with_stale_version() {
        let db = memory_db().await;
        let repo = db.parts();
        let part = repo.create(&brake_pad()).await.unwrap();

        repo.update_details(&part, None).await.unwrap();
        let err = repo.update_details(&part, None).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::ConcurrentModification { .. })
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_adjust_reorder_thresholds() {
        let db = memory_db().await;
        let repo = db.parts();
        let part = repo.create(&brake_pad()).await.unwrap();

        let updated = repo
            .adjust_reorder_thresholds(part.id, 4, None, None)
            .await
            .unwrap();
        assert_eq!(updated.minimum_stock, 4);
        assert_eq!(updated.reorder_level, None);

        assert!(repo
            .adjust_reorder_thresholds(part.id, -1, None, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_alternate_units() {
        let db = memory_db().await;
        let repo = db.parts();
        let part = repo.create(&brake_pad()).await.unwrap();

        let unit = repo
            .register_alternate_unit(part.id, "box", ConversionRate::whole(12), true, None)
            .await
            .unwrap();
        assert!(unit.is_default);
        assert_eq!(unit.conversion_rate(), ConversionRate::whole(12));

        let err = repo
            .register_alternate_unit(part.id, "box", ConversionRate::whole(6), false, None)
            .await
            .unwrap_err();
        assert_eq!(
            err.domain(),
            Some(&CoreError::DuplicateUnitName {
                part_id: part.id,
                unit_name: "box".into()
            })
        );

        let err = repo
            .register_alternate_unit(part.id, "piece", ConversionRate::ONE, false, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(CoreError::DuplicateUnitName { .. })
        ));

        let half: ConversionRate = "0.5".parse().unwrap();
        let pair = repo
            .register_alternate_unit(part.id, "half", half, true, None)
            .await
            .unwrap();
        let units = repo.list_units(part.id).await.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(
            units.iter().filter(|u| u.is_default).map(|u| u.id).collect::<Vec<_>>(),
            vec![pair.id]
        );

        assert_eq!(repo.to_default_units(part.id, "box", 2).await.unwrap(), 24);
        assert_eq!(repo.to_default_units(part.id, "piece", 3).await.unwrap(), 3);
        assert_eq!(repo.to_default_units(part.id, "half", 4).await.unwrap(), 2);
        assert!(matches!(
            repo.to_default_units(part.id, "half", 3).await.unwrap_err().domain(),
            Some(CoreError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            repo.to_default_units(part.id, "crate", 1).await.unwrap_err().domain(),
            Some(CoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_part() {
        let db = memory_db().await;
        let repo = db.parts();
        let part = repo.create(&brake_pad()).await.unwrap();

        repo.soft_delete(part.id, Some("manager")).await.unwrap();
        assert!(repo.get_by_id(part.id).await.unwrap().is_none());
        assert!(repo.search("brake", 10).await.unwrap().is_empty());
        assert!(repo.soft_delete(part.id, None).await.is_err());
    }

    #[tokio::test]
    async fn test_deleted_part_frees_its_codes() {
        let db = memory_db().await;
        let repo = db.parts();
        let old = repo.create(&brake_pad()).await.unwrap();

        let err = repo.create(&brake_pad()).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::DuplicateCode { .. })));

        repo.soft_delete(old.id, None).await.unwrap();
        assert!(repo.get_by_part_number("BRK-001").await.unwrap().is_none());

        let recreated = repo.create(&brake_pad()).await.unwrap();
        assert_ne!(recreated.id, old.id);
        assert_eq!(repo.get_by_sku("SKU-BRK-001").await.unwrap().unwrap().id, recreated.id);
        assert_eq!(
            repo.get_by_barcode("4006381333931").await.unwrap().unwrap().id,
            recreated.id
        );

        // Live rows stay unique.
        let err = repo.create(&brake_pad()).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::DuplicateCode { .. })));
    }

    #[tokio::test]
    async fn test_soft_delete_refuses_part_with_stock() {
        let db = memory_db().await;
        let repo = db.parts();
        let part = repo.create(&brake_pad()).await.unwrap();
        let batch = db
            .ledger()
            .receive_batch(ReceiveBatch::new(part.id, 3, 900, BatchSource::Purchase))
            .await
            .unwrap();

        let err = repo.soft_delete(part.id, None).await.unwrap_err();
        assert_eq!(
            err.domain(),
            Some(&CoreError::StockRemaining {
                part_id: part.id,
                quantity: 3
            })
        );
        assert!(repo.get_by_id(part.id).await.unwrap().is_some());

        db.ledger()
            .adjust_batch(batch.id, -3, "scrapped", None)
            .await
            .unwrap();
        repo.soft_delete(part.id, None).await.unwrap();

        let err = repo.soft_delete(9999, None).await.unwrap_err();
        assert!(matches!(err.domain(), Some(CoreError::NotFound { .. })));
    }
}
