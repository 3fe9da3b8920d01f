//! # Stock Alerts
//!
//! Pure evaluation of a part's stock position into alerts for purchasing.
//!
//! | Kind         | Condition                                   | Severity                     |
//! |--------------|---------------------------------------------|------------------------------|
//! | OutOfStock   | on-hand = 0                                 | Critical                     |
//! | LowStock     | 0 < on-hand ≤ minimum, minimum > 0          | High if ≤ ½ minimum, else Medium |
//! | Overstock    | on-hand > 3 × reorder level                 | Low                          |
//! | ExpiringSoon | earliest stocked batch expiring in window   | ≤7d Critical, ≤14d High, else Medium |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::batch::InventoryBatch;
use crate::catalog::Part;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    OutOfStock,
    LowStock,
    Overstock,
    ExpiringSoon,
}

/// Ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAlert {
    pub part_id: i64,
    pub part_number: String,
    pub part_name: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub quantity_in_stock: i64,
    /// Minimum stock or reorder level the alert was raised against.
    pub threshold: Option<i64>,
    pub suggested_reorder_quantity: Option<i64>,
    pub batch_id: Option<i64>,
    pub expiry_date: Option<NaiveDate>,
    pub days_until_expiry: Option<i64>,
}

impl StockAlert {
    fn for_part(part: &Part, kind: AlertKind, severity: AlertSeverity) -> Self {
        StockAlert {
            part_id: part.id,
            part_number: part.part_number.clone(),
            part_name: part.name.clone(),
            kind,
            severity,
            quantity_in_stock: part.quantity_in_stock,
            threshold: None,
            suggested_reorder_quantity: None,
            batch_id: None,
            expiry_date: None,
            days_until_expiry: None,
        }
    }
}

/// Level-based alert for a part, if any. At most one of out-of-stock,
/// low-stock and overstock applies.
pub fn evaluate_stock_level(part: &Part) -> Option<StockAlert> {
    let on_hand = part.quantity_in_stock;

    if on_hand <= 0 {
        let mut alert = StockAlert::for_part(part, AlertKind::OutOfStock, AlertSeverity::Critical);
        alert.suggested_reorder_quantity = Some(part.suggested_reorder_quantity());
        return Some(alert);
    }

    if part.minimum_stock > 0 && on_hand <= part.minimum_stock {
        let severity = if on_hand * 2 <= part.minimum_stock {
            AlertSeverity::High
        } else {
            AlertSeverity::Medium
        };
        let mut alert = StockAlert::for_part(part, AlertKind::LowStock, severity);
        alert.threshold = Some(part.minimum_stock);
        alert.suggested_reorder_quantity = Some(part.suggested_reorder_quantity());
        return Some(alert);
    }

    match part.reorder_level {
        Some(level) if level > 0 && on_hand > level * 3 => {
            let mut alert = StockAlert::for_part(part, AlertKind::Overstock, AlertSeverity::Low);
            alert.threshold = Some(level);
            Some(alert)
        }
        _ => None,
    }
}

/// Expiry alert for the part's earliest-expiring stocked batch that expires
/// within `warning_days` of `today` (already-expired batches are ignored).
pub fn evaluate_expiry(
    part: &Part,
    batches: &[InventoryBatch],
    today: NaiveDate,
    warning_days: i64,
) -> Option<StockAlert> {
    let batch = batches
        .iter()
        .filter(|b| b.part_id == part.id && b.is_stocked())
        .filter_map(|b| b.expiry_date.map(|d| (b, d)))
        .filter(|(_, d)| *d >= today && (*d - today).num_days() <= warning_days)
        .min_by(|(a, da), (b, db)| da.cmp(db).then(a.id.cmp(&b.id)))?;

    let (batch, expiry) = batch;
    let days = (expiry - today).num_days();
    let severity = match days {
        d if d <= 7 => AlertSeverity::Critical,
        d if d <= 14 => AlertSeverity::High,
        _ => AlertSeverity::Medium,
    };

    let mut alert = StockAlert::for_part(part, AlertKind::ExpiringSoon, severity);
    alert.batch_id = Some(batch.id);
    alert.expiry_date = Some(expiry);
    alert.days_until_expiry = Some(days);
    Some(alert)
}

/// All alerts for one part.
pub fn evaluate_part(
    part: &Part,
    batches: &[InventoryBatch],
    today: NaiveDate,
    warning_days: i64,
) -> Vec<StockAlert> {
    evaluate_stock_level(part)
        .into_iter()
        .chain(evaluate_expiry(part, batches, today, warning_days))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Audit;
    use crate::batch::tests::batch;
    use crate::catalog::{PartSourcing, UsageFlags};
    use chrono::Utc;

    fn part(on_hand: i64, minimum: i64, reorder_level: Option<i64>) -> Part {
        Part {
            id: 1,
            part_number: "OIL-5W30".into(),
            sku: None,
            barcode: None,
            name: "Engine oil".into(),
            description: None,
            category: None,
            brand: None,
            cost_price_cents: 0,
            average_cost_cents: 0,
            sell_price_cents: 0,
            quantity_in_stock: on_hand,
            minimum_stock: minimum,
            reorder_level,
            default_unit: "litre".into(),
            sourcing: PartSourcing::Aftermarket,
            is_active: true,
            usage: UsageFlags::ALL,
            row_version: 0,
            audit: Audit::created(Utc::now(), None),
        }
    }

    #[test]
    fn test_out_of_stock_is_critical() {
        let alert = evaluate_stock_level(&part(0, 10, None)).unwrap();
        assert_eq!(alert.kind, AlertKind::OutOfStock);
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.suggested_reorder_quantity, Some(20));
    }

    #[test]
    fn test_low_stock_severity() {
        let high = evaluate_stock_level(&part(5, 10, None)).unwrap();
        assert_eq!(high.kind, AlertKind::LowStock);
        assert_eq!(high.severity, AlertSeverity::High);

        let medium = evaluate_stock_level(&part(6, 10, None)).unwrap();
        assert_eq!(medium.severity, AlertSeverity::Medium);

        assert!(evaluate_stock_level(&part(11, 10, None)).is_none());
        assert!(evaluate_stock_level(&part(3, 0, None)).is_none());
    }

    #[test]
    fn test_overstock() {
        let alert = evaluate_stock_level(&part(31, 0, Some(10))).unwrap();
        assert_eq!(alert.kind, AlertKind::Overstock);
        assert_eq!(alert.severity, AlertSeverity::Low);
        assert!(evaluate_stock_level(&part(30, 0, Some(10))).is_none());
    }

    #[test]
    fn test_expiring_soon_picks_earliest_batch() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut soon = batch(1, 1, 3, 100);
        soon.expiry_date = NaiveDate::from_ymd_opt(2024, 6, 6);
        let mut later = batch(2, 2, 3, 100);
        later.expiry_date = NaiveDate::from_ymd_opt(2024, 6, 20);
        let mut gone = batch(3, 3, 3, 100);
        gone.expiry_date = NaiveDate::from_ymd_opt(2024, 5, 20);

        let p = part(9, 0, None);
        let alert = evaluate_expiry(&p, &[later.clone(), soon, gone], today, 30).unwrap();
        assert_eq!(alert.batch_id, Some(1));
        assert_eq!(alert.days_until_expiry, Some(5));
        assert_eq!(alert.severity, AlertSeverity::Critical);

        let alert = evaluate_expiry(&p, &[later.clone()], today, 30).unwrap();
        assert_eq!(alert.severity, AlertSeverity::Medium);

        assert!(evaluate_expiry(&p, &[later], today, 7).is_none());
    }

    #[test]
    fn test_evaluate_part_combines() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut b = batch(1, 1, 2, 100);
        b.expiry_date = NaiveDate::from_ymd_opt(2024, 6, 12);
        let alerts = evaluate_part(&part(2, 10, None), &[b], today, 30);
        let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![AlertKind::LowStock, AlertKind::ExpiringSoon]);
        assert_eq!(alerts[1].severity, AlertSeverity::High);
    }
}
