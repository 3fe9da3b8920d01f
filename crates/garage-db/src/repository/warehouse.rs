//! # Warehouse Repository
//!
//! Warehouses, zones and bins, plus placement checks for batches.
//!
//! ## Default Flags
//! ```text
//! set_default_warehouse(7)
//!   BEGIN
//!     UPDATE warehouses SET is_default = 1 WHERE id = 7          (set)
//!     UPDATE warehouses SET is_default = 0 WHERE id <> 7 ...      (clear rest)
//!   COMMIT
//! ```
//! The schema has no single-row constraint for `is_default`; both steps run
//! in one transaction so readers never see zero or two defaults. Bins follow
//! the same rule per warehouse.

use chrono::Utc;
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use garage_core::validation::{validate_code, validate_name, validate_threshold};
use garage_core::{
    BatchLocation, CoreError, NewBin, NewWarehouse, NewZone, Warehouse, WarehouseBin,
    WarehouseZone,
};

/// Repository for warehouse topology.
#[derive(Debug, Clone)]
pub struct WarehouseRepository {
    pool: SqlitePool,
}

impl WarehouseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        WarehouseRepository { pool }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Creates a warehouse. `DuplicateCode` if the code is taken.
    pub async fn create_warehouse(&self, new: &NewWarehouse) -> DbResult<Warehouse> {
        validate_code("code", &new.code)?;
        validate_name("name", &new.name)?;

        let code = new.code.trim();
        debug!(code, "Creating warehouse");

        let warehouse = sqlx::query_as::<_, Warehouse>(
            r#"
            INSERT INTO warehouses (code, name, description, address, manager_name,
                                    phone_number, created_at, created_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(code)
        .bind(new.name.trim())
        .bind(&new.description)
        .bind(&new.address)
        .bind(&new.manager_name)
        .bind(&new.phone_number)
        .bind(Utc::now())
        .bind(&new.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from(e).on_unique(|| CoreError::duplicate_code("warehouses", code)))?;

        info!(warehouse_id = warehouse.id, code, "Warehouse created");
        Ok(warehouse)
    }

    /// Creates a zone. `DuplicateCode` if the code is taken in the warehouse.
    pub async fn create_zone(&self, new: &NewZone) -> DbResult<WarehouseZone> {
        validate_code("code", &new.code)?;
        validate_name("name", &new.name)?;
        self.get_warehouse(new.warehouse_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Warehouse", new.warehouse_id))?;

        let code = new.code.trim();
        debug!(warehouse_id = new.warehouse_id, code, "Creating zone");

        let zone = sqlx::query_as::<_, WarehouseZone>(
            r#"
            INSERT INTO warehouse_zones (warehouse_id, code, name, description, display_order,
                                         created_at, created_by)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(new.warehouse_id)
        .bind(code)
        .bind(new.name.trim())
        .bind(&new.description)
        .bind(new.display_order)
        .bind(Utc::now())
        .bind(&new.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            DbError::from(e).on_unique(|| {
                CoreError::duplicate_code(format!("warehouse {} zones", new.warehouse_id), code)
            })
        })?;

        info!(zone_id = zone.id, warehouse_id = zone.warehouse_id, code, "Zone created");
        Ok(zone)
    }

    /// Creates a bin, optionally inside a zone of the same warehouse.
    ///
    /// Bin codes are unique per warehouse, whatever the zone.
    pub async fn create_bin(&self, new: &NewBin) -> DbResult<WarehouseBin> {
        validate_code("code", &new.code)?;
        validate_name("name", &new.name)?;
        if let Some(capacity) = new.capacity {
            validate_threshold("capacity", capacity)?;
        }

        self.get_warehouse(new.warehouse_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Warehouse", new.warehouse_id))?;
        if let Some(zone_id) = new.zone_id {
            let zone = self
                .get_zone(zone_id)
                .await?
                .ok_or_else(|| CoreError::not_found("WarehouseZone", zone_id))?;
            if zone.warehouse_id != new.warehouse_id {
                return Err(CoreError::InvalidLocation {
                    reason: format!(
                        "zone {} belongs to warehouse {}, not {}",
                        zone.code, zone.warehouse_id, new.warehouse_id
                    ),
                }
                .into());
            }
        }

        let code = new.code.trim();
        debug!(warehouse_id = new.warehouse_id, zone_id = ?new.zone_id, code, "Creating bin");

        let bin = sqlx::query_as::<_, WarehouseBin>(
            r#"
            INSERT INTO warehouse_bins (warehouse_id, zone_id, code, name, description, capacity,
                                        created_at, created_by)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(new.warehouse_id)
        .bind(new.zone_id)
        .bind(code)
        .bind(new.name.trim())
        .bind(&new.description)
        .bind(new.capacity)
        .bind(Utc::now())
        .bind(&new.created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            DbError::from(e).on_unique(|| {
                CoreError::duplicate_code(format!("warehouse {} bins", new.warehouse_id), code)
            })
        })?;

        info!(bin_id = bin.id, warehouse_id = bin.warehouse_id, code, "Bin created");
        Ok(bin)
    }

    // =========================================================================
    // Read
    // =========================================================================

    pub async fn get_warehouse(&self, id: i64) -> DbResult<Option<Warehouse>> {
        Self::fetch_warehouse(&self.pool, id).await
    }

    pub async fn list_warehouses(&self) -> DbResult<Vec<Warehouse>> {
        let warehouses = sqlx::query_as::<_, Warehouse>(
            "SELECT * FROM warehouses WHERE is_deleted = 0 ORDER BY is_default DESC, code",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(warehouses)
    }

    /// The warehouse flagged as default, if any.
    pub async fn default_warehouse(&self) -> DbResult<Option<Warehouse>> {
        let warehouse = sqlx::query_as::<_, Warehouse>(
            "SELECT * FROM warehouses WHERE is_default = 1 AND is_deleted = 0 LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(warehouse)
    }

    pub async fn get_zone(&self, id: i64) -> DbResult<Option<WarehouseZone>> {
        Self::fetch_zone(&self.pool, id).await
    }

    /// Zones of a warehouse in display order.
    pub async fn list_zones(&self, warehouse_id: i64) -> DbResult<Vec<WarehouseZone>> {
        let zones = sqlx::query_as::<_, WarehouseZone>(
            r#"
            SELECT * FROM warehouse_zones
            WHERE warehouse_id = ? AND is_deleted = 0
            ORDER BY display_order, code
            "#,
        )
        .bind(warehouse_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(zones)
    }

    pub async fn get_bin(&self, id: i64) -> DbResult<Option<WarehouseBin>> {
        Self::fetch_bin(&self.pool, id).await
    }

    pub async fn list_bins(&self, warehouse_id: i64) -> DbResult<Vec<WarehouseBin>> {
        let bins = sqlx::query_as::<_, WarehouseBin>(
            "SELECT * FROM warehouse_bins WHERE warehouse_id = ? AND is_deleted = 0 ORDER BY code",
        )
        .bind(warehouse_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bins)
    }

    pub async fn find_bin_by_code(
        &self,
        warehouse_id: i64,
        code: &str,
    ) -> DbResult<Option<WarehouseBin>> {
        let bin = sqlx::query_as::<_, WarehouseBin>(
            "SELECT * FROM warehouse_bins WHERE warehouse_id = ? AND code = ? AND is_deleted = 0",
        )
        .bind(warehouse_id)
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(bin)
    }

    /// The warehouse's default bin, if any.
    pub async fn default_bin(&self, warehouse_id: i64) -> DbResult<Option<WarehouseBin>> {
        let bin = sqlx::query_as::<_, WarehouseBin>(
            r#"
            SELECT * FROM warehouse_bins
            WHERE warehouse_id = ? AND is_default = 1 AND is_deleted = 0
            LIMIT 1
            "#,
        )
        .bind(warehouse_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(bin)
    }

    // =========================================================================
    // Defaults
    // =========================================================================

    /// Makes `id` the only default warehouse.
    pub async fn set_default_warehouse(&self, id: i64) -> DbResult<Warehouse> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let warehouse = sqlx::query_as::<_, Warehouse>(
            r#"
            UPDATE warehouses SET is_default = 1, updated_at = ?
            WHERE id = ? AND is_deleted = 0
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found("Warehouse", id))?;

        let cleared = sqlx::query(
            "UPDATE warehouses SET is_default = 0, updated_at = ? WHERE id <> ? AND is_default = 1",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        info!(warehouse_id = id, cleared, "Default warehouse set");
        Ok(warehouse)
    }

    /// Makes `bin_id` the only default bin of its warehouse.
    pub async fn set_default_bin(&self, bin_id: i64) -> DbResult<WarehouseBin> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let bin = sqlx::query_as::<_, WarehouseBin>(
            r#"
            UPDATE warehouse_bins SET is_default = 1, updated_at = ?
            WHERE id = ? AND is_deleted = 0
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(bin_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| CoreError::not_found("WarehouseBin", bin_id))?;

        sqlx::query(
            r#"
            UPDATE warehouse_bins SET is_default = 0, updated_at = ?
            WHERE warehouse_id = ? AND id <> ? AND is_default = 1
            "#,
        )
        .bind(now)
        .bind(bin.warehouse_id)
        .bind(bin_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(bin_id, warehouse_id = bin.warehouse_id, "Default bin set");
        Ok(bin)
    }

    // =========================================================================
    // Placement
    // =========================================================================

    /// Validates a placement and fills in the implied levels (a bin implies
    /// its warehouse and zone).
    pub async fn resolve_location(&self, location: &BatchLocation) -> DbResult<BatchLocation> {
        let mut conn = self.pool.acquire().await?;
        Self::resolve_in(&mut conn, location).await
    }

    pub(crate) async fn resolve_in(
        conn: &mut SqliteConnection,
        location: &BatchLocation,
    ) -> DbResult<BatchLocation> {
        if location.is_unplaced() {
            return Ok(*location);
        }

        let zone = match location.zone_id {
            Some(id) => Some(
                Self::fetch_zone(&mut *conn, id)
                    .await?
                    .filter(|z| z.is_active)
                    .ok_or_else(|| missing("zone", id))?,
            ),
            None => None,
        };
        let bin = match location.bin_id {
            Some(id) => Some(
                Self::fetch_bin(&mut *conn, id)
                    .await?
                    .filter(|b| b.is_active)
                    .ok_or_else(|| missing("bin", id))?,
            ),
            None => None,
        };

        let resolved = location.resolve(zone.as_ref(), bin.as_ref())?;

        if let Some(warehouse_id) = resolved.warehouse_id {
            Self::fetch_warehouse(&mut *conn, warehouse_id)
                .await?
                .filter(|w| w.is_active)
                .ok_or_else(|| missing("warehouse", warehouse_id))?;
        }

        Ok(resolved)
    }

    // =========================================================================
    // Soft delete
    // =========================================================================

    /// Soft-deletes a warehouse with its zones and bins. Refused while any
    /// batch placed there still holds stock.
    pub async fn soft_delete_warehouse(&self, id: i64, deleted_by: Option<&str>) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        ensure_empty(&mut tx, "warehouse_id", id, "warehouse").await?;

        let result = sqlx::query(
            r#"
            UPDATE warehouses SET is_deleted = 1, is_active = 0, is_default = 0,
                                  deleted_at = ?, deleted_by = ?
            WHERE id = ? AND is_deleted = 0
            "#,
        )
        .bind(now)
        .bind(deleted_by)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("Warehouse", id).into());
        }

        for table in ["warehouse_zones", "warehouse_bins"] {
            sqlx::query(&format!(
                "UPDATE {table} SET is_deleted = 1, is_active = 0, deleted_at = ?, deleted_by = ? \
                 WHERE warehouse_id = ? AND is_deleted = 0"
            ))
            .bind(now)
            .bind(deleted_by)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(warehouse_id = id, "Warehouse soft deleted");
        Ok(())
    }

    /// Soft-deletes a zone and the bins inside it.
    pub async fn soft_delete_zone(&self, id: i64, deleted_by: Option<&str>) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        ensure_empty(&mut tx, "zone_id", id, "zone").await?;

        let result = sqlx::query(
            r#"
            UPDATE warehouse_zones SET is_deleted = 1, is_active = 0, deleted_at = ?, deleted_by = ?
            WHERE id = ? AND is_deleted = 0
            "#,
        )
        .bind(now)
        .bind(deleted_by)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("WarehouseZone", id).into());
        }

        sqlx::query(
            r#"
            UPDATE warehouse_bins SET is_deleted = 1, is_active = 0, deleted_at = ?, deleted_by = ?
            WHERE zone_id = ? AND is_deleted = 0
            "#,
        )
        .bind(now)
        .bind(deleted_by)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(zone_id = id, "Zone soft deleted");
        Ok(())
    }

    pub async fn soft_delete_bin(&self, id: i64, deleted_by: Option<&str>) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        ensure_empty(&mut tx, "bin_id", id, "bin").await?;

        let result = sqlx::query(
            r#"
            UPDATE warehouse_bins SET is_deleted = 1, is_active = 0, is_default = 0,
                                      deleted_at = ?, deleted_by = ?
            WHERE id = ? AND is_deleted = 0
            "#,
        )
        .bind(Utc::now())
        .bind(deleted_by)
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found("WarehouseBin", id).into());
        }

        tx.commit().await?;
        info!(bin_id = id, "Bin soft deleted");
        Ok(())
    }

    // =========================================================================
    // Executor-generic lookups
    // =========================================================================

    pub(crate) async fn fetch_warehouse<'e, E>(executor: E, id: i64) -> DbResult<Option<Warehouse>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let warehouse =
            sqlx::query_as::<_, Warehouse>("SELECT * FROM warehouses WHERE id = ? AND is_deleted = 0")
                .bind(id)
                .fetch_optional(executor)
                .await?;
        Ok(warehouse)
    }

    pub(crate) async fn fetch_zone<'e, E>(executor: E, id: i64) -> DbResult<Option<WarehouseZone>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let zone = sqlx::query_as::<_, WarehouseZone>(
            "SELECT * FROM warehouse_zones WHERE id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(zone)
    }

    pub(crate) async fn fetch_bin<'e, E>(executor: E, id: i64) -> DbResult<Option<WarehouseBin>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let bin = sqlx::query_as::<_, WarehouseBin>(
            "SELECT * FROM warehouse_bins WHERE id = ? AND is_deleted = 0",
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;
        Ok(bin)
    }
}

fn missing(level: &str, id: i64) -> CoreError {
    CoreError::InvalidLocation {
        reason: format!("{level} {id} does not exist or is inactive"),
    }
}

/// Refuses when a stocked batch is still placed at `column = id`.
async fn ensure_empty(
    conn: &mut SqliteConnection,
    column: &str,
    id: i64,
    level: &str,
) -> DbResult<()> {
    let stocked: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM part_inventory_batches \
         WHERE {column} = ? AND quantity_remaining > 0 AND is_deleted = 0"
    ))
    .bind(id)
    .fetch_one(&mut *conn)
    .await?;

    if stocked > 0 {
        return Err(CoreError::InvalidLocation {
            reason: format!("{level} {id} still holds {stocked} stocked batch(es)"),
        }
        .into());
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
