//! # Warehouse Topology
//!
//! Three-level physical location hierarchy.
//!
//! ```text
//! Warehouse (code unique)
//!   ├── Zone   (code unique within warehouse)
//!   │     └── Bin (code unique within warehouse, zone optional)
//!   └── Bin   (no zone)
//! ```
//!
//! A batch sits in at most one place at a time, described by a
//! [`BatchLocation`]. Placement is validated against the loaded zone and bin
//! with [`BatchLocation::resolve`] before it is persisted.

use serde::{Deserialize, Serialize};

use crate::audit::Audit;
use crate::error::{CoreError, CoreResult};

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Warehouse {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub manager_name: Option<String>,
    pub phone_number: Option<String>,
    /// At most one warehouse is the default, enforced by the topology store.
    pub is_default: bool,
    pub is_active: bool,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct WarehouseZone {
    pub id: i64,
    pub warehouse_id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub display_order: i64,
    pub is_active: bool,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub audit: Audit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct WarehouseBin {
    pub id: i64,
    pub warehouse_id: i64,
    pub zone_id: Option<i64>,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    /// Nominal capacity in default units. Informational only.
    pub capacity: Option<i64>,
    /// At most one default bin per warehouse.
    pub is_default: bool,
    pub is_active: bool,
    #[cfg_attr(feature = "sqlx", sqlx(flatten))]
    #[serde(flatten)]
    pub audit: Audit,
}

crate::impl_audited!(Warehouse, WarehouseZone, WarehouseBin);

// =============================================================================
// Inputs
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWarehouse {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub manager_name: Option<String>,
    pub phone_number: Option<String>,
    pub created_by: Option<String>,
}

impl NewWarehouse {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        NewWarehouse {
            code: code.into(),
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewZone {
    pub warehouse_id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub display_order: i64,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBin {
    pub warehouse_id: i64,
    pub zone_id: Option<i64>,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub capacity: Option<i64>,
    pub created_by: Option<String>,
}

// =============================================================================
// Batch Location
// =============================================================================

/// Where a batch is placed. Every level is optional; an all-`None` location
/// means "unplaced".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct BatchLocation {
    pub warehouse_id: Option<i64>,
    pub zone_id: Option<i64>,
    pub bin_id: Option<i64>,
}

impl BatchLocation {
    pub const UNPLACED: BatchLocation = BatchLocation {
        warehouse_id: None,
        zone_id: None,
        bin_id: None,
    };

    pub fn warehouse(warehouse_id: i64) -> Self {
        BatchLocation {
            warehouse_id: Some(warehouse_id),
            ..Self::UNPLACED
        }
    }

    pub fn bin(warehouse_id: i64, bin_id: i64) -> Self {
        BatchLocation {
            warehouse_id: Some(warehouse_id),
            zone_id: None,
            bin_id: Some(bin_id),
        }
    }

    pub fn is_unplaced(&self) -> bool {
        self.warehouse_id.is_none() && self.zone_id.is_none() && self.bin_id.is_none()
    }

    /// Checks the requested placement against the zone and bin it names and
    /// fills in the levels implied by them.
    ///
    /// ## Rules
    /// - the zone must belong to the warehouse
    /// - the bin must belong to the warehouse
    /// - when both are given, the bin must sit in that zone
    /// - a bin inside a zone implies that zone, a zone implies its warehouse
    ///
    /// `zone` and `bin` must be the entities loaded for `self.zone_id` and
    /// `self.bin_id` (or `None` when the id is `None`).
    pub fn resolve(
        &self,
        zone: Option<&WarehouseZone>,
        bin: Option<&WarehouseBin>,
    ) -> CoreResult<BatchLocation> {
        let mut resolved = *self;

        if let Some(zone) = zone {
            match resolved.warehouse_id {
                Some(w) if w != zone.warehouse_id => {
                    return Err(invalid(format!(
                        "zone {} belongs to warehouse {}, not {}",
                        zone.code, zone.warehouse_id, w
                    )));
                }
                _ => resolved.warehouse_id = Some(zone.warehouse_id),
            }
        }

        if let Some(bin) = bin {
            match resolved.warehouse_id {
                Some(w) if w != bin.warehouse_id => {
                    return Err(invalid(format!(
                        "bin {} belongs to warehouse {}, not {}",
                        bin.code, bin.warehouse_id, w
                    )));
                }
                _ => resolved.warehouse_id = Some(bin.warehouse_id),
            }

            match (resolved.zone_id, bin.zone_id) {
                (Some(z), Some(bz)) if z != bz => {
                    return Err(invalid(format!(
                        "bin {} is in zone {}, not {}",
                        bin.code, bz, z
                    )));
                }
                (Some(z), None) => {
                    return Err(invalid(format!(
                        "bin {} is not inside zone {}",
                        bin.code, z
                    )));
                }
                (None, Some(bz)) => resolved.zone_id = Some(bz),
                _ => {}
            }
        }

        Ok(resolved)
    }
}

fn invalid(reason: String) -> CoreError {
    CoreError::InvalidLocation { reason }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn zone(id: i64, warehouse_id: i64) -> WarehouseZone {
        WarehouseZone {
            id,
            warehouse_id,
            code: format!("Z{id}"),
            name: "Zone".into(),
            description: None,
            display_order: 0,
            is_active: true,
            audit: Audit::created(Utc::now(), None),
        }
    }

    fn bin(id: i64, warehouse_id: i64, zone_id: Option<i64>) -> WarehouseBin {
        WarehouseBin {
            id,
            warehouse_id,
            zone_id,
            code: format!("B{id}"),
            name: "Bin".into(),
            description: None,
            capacity: None,
            is_default: false,
            is_active: true,
            audit: Audit::created(Utc::now(), None),
        }
    }

    #[test]
    fn test_bin_implies_zone_and_warehouse() {
        let b = bin(7, 1, Some(3));
        let loc = BatchLocation {
            bin_id: Some(7),
            ..BatchLocation::UNPLACED
        };
        let resolved = loc.resolve(None, Some(&b)).unwrap();
        assert_eq!(resolved.warehouse_id, Some(1));
        assert_eq!(resolved.zone_id, Some(3));
        assert_eq!(resolved.bin_id, Some(7));
    }

    #[test]
    fn test_zone_from_other_warehouse_is_rejected() {
        let z = zone(3, 2);
        let loc = BatchLocation {
            warehouse_id: Some(1),
            zone_id: Some(3),
            bin_id: None,
        };
        assert!(matches!(
            loc.resolve(Some(&z), None),
            Err(CoreError::InvalidLocation { .. })
        ));
    }

    #[test]
    fn test_bin_outside_requested_zone_is_rejected() {
        let z = zone(3, 1);
        let other_zone_bin = bin(7, 1, Some(4));
        let zoneless_bin = bin(8, 1, None);
        let loc = BatchLocation {
            warehouse_id: Some(1),
            zone_id: Some(3),
            bin_id: Some(7),
        };
        assert!(loc.resolve(Some(&z), Some(&other_zone_bin)).is_err());
        assert!(loc.resolve(Some(&z), Some(&zoneless_bin)).is_err());
    }

    #[test]
    fn test_unplaced_resolves_to_itself() {
        let resolved = BatchLocation::UNPLACED.resolve(None, None).unwrap();
        assert!(resolved.is_unplaced());
    }
}
