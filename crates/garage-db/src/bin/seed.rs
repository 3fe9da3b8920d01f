//! # Seed Data Generator
//!
//! Populates a development database with a small repair-shop inventory and
//! walks it through the ledger operations.
//!
//! ## Usage
//! ```bash
//! # Database from garage-inventory.toml / GARAGE_DB_PATH
//! cargo run -p garage-db --bin seed
//!
//! # Specify database path
//! cargo run -p garage-db --bin seed -- --db ./data/garage.db
//!
//! # More logging
//! RUST_LOG=garage_db=trace cargo run -p garage-db --bin seed
//! ```
//!
//! ## What It Does
//! 1. Creates a main warehouse with one zone and two bins
//! 2. Creates a handful of parts with reorder thresholds
//! 3. Receives two batches per part at different costs
//! 4. Allocates to a service order, returns part of it, expires a batch
//! 5. Counts the oil filters and applies the shortage
//! 6. Prints alerts and a JSON reconciliation per part

use std::env;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use garage_core::{
    AllocationRequest, BatchLocation, BatchSource, CogsMethod, NewBin, NewPart, NewStockCheck,
    NewWarehouse, NewZone, ReceiveBatch,
};
use garage_db::{Database, InventoryConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (part number, name, cost cents, sell cents, minimum, reorder level)
const PARTS: &[(&str, &str, i64, i64, i64, Option<i64>)] = &[
    ("BRK-PAD-F", "Front brake pad set", 2400, 3900, 4, Some(8)),
    ("OIL-5W30-4L", "Engine oil 5W-30 4L", 1800, 2900, 6, Some(12)),
    ("FLT-OIL-01", "Oil filter", 450, 900, 10, None),
    ("WPR-600", "Wiper blade 600mm", 700, 1400, 2, Some(4)),
    ("CLT-50", "Coolant concentrate 5L", 1500, 2600, 2, None),
];

const SERVICE_ORDER: i64 = 1001;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Garage Inventory Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (overrides config)");
                println!("  -c, --config <PATH>   Config file (default: platform config dir)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = InventoryConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = path;
    }

    println!("Garage Inventory Seed Data Generator");
    println!("====================================");
    println!("Database: {}", config.database.path.display());
    println!();

    let db = Database::open(&config).await?;
    println!("✓ Connected to database, migrations applied");

    let existing = db.parts().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} parts, skipping seed", existing);
    } else {
        seed(&db).await?;
    }

    println!();
    println!("Alerts:");
    for alert in db.ledger().scan_alerts(Utc::now()).await? {
        println!(
            "  [{:?}] {} {:?} (on hand {})",
            alert.severity, alert.part_number, alert.kind, alert.quantity_in_stock
        );
    }

    println!();
    println!("Reconciliation:");
    for part in db.parts().list_active(100).await? {
        let reconciliation = db.ledger().reconcile_part(part.id).await?;
        if !reconciliation.is_consistent() {
            warn!(part_id = part.id, "Part does not reconcile");
        }
        println!("{}", serde_json::to_string(&reconciliation)?);
    }

    db.close().await;
    println!();
    println!("✓ Seed complete!");
    Ok(())
}

async fn seed(db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    let warehouses = db.warehouses();
    let main = warehouses
        .create_warehouse(&NewWarehouse::new("MAIN", "Main workshop store"))
        .await?;
    warehouses.set_default_warehouse(main.id).await?;

    let zone = warehouses
        .create_zone(&NewZone {
            warehouse_id: main.id,
            code: "A".into(),
            name: "Aisle A".into(),
            ..Default::default()
        })
        .await?;
    let mut bins = Vec::new();
    for code in ["A-01", "A-02"] {
        let bin = warehouses
            .create_bin(&NewBin {
                warehouse_id: main.id,
                zone_id: Some(zone.id),
                code: code.into(),
                name: format!("Shelf {code}"),
                ..Default::default()
            })
            .await?;
        bins.push(bin);
    }
    println!("✓ Warehouse {} with {} bins", main.code, bins.len());

    let ledger = db.ledger();
    let now = Utc::now();
    let mut part_ids = Vec::new();

    for (index, (number, name, cost, sell, minimum, reorder)) in PARTS.iter().enumerate() {
        let part = db
            .parts()
            .create(
                &NewPart::new(*number, *name)
                    .with_prices(*cost, *sell)
                    .with_thresholds(*minimum, *reorder),
            )
            .await?;
        let bin = &bins[index % bins.len()];

        // Older, cheaper batch first so FIFO cost differs from the latest price.
        let older = ReceiveBatch::purchase(part.id, 6, cost - cost / 10, 1, format!("INV-{}-A", index + 1))
            .received_at(now - Duration::days(40))
            .placed_at(BatchLocation::bin(main.id, bin.id));
        ledger.receive_batch(older).await?;

        let newer = ReceiveBatch::purchase(part.id, 10, *cost, 1, format!("INV-{}-B", index + 1))
            .received_at(now - Duration::days(5))
            .placed_at(BatchLocation::bin(main.id, bin.id));
        ledger.receive_batch(newer).await?;

        part_ids.push(part.id);
    }
    println!("✓ {} parts received in two batches each", part_ids.len());

    // Salvage stock that went past its expiry date.
    let salvage = ReceiveBatch::new(part_ids[4], 3, 0, BatchSource::Salvage)
        .received_at(now - Duration::days(60))
        .expiring((now - Duration::days(2)).date_naive());
    ledger.receive_batch(salvage).await?;

    let allocation = ledger
        .allocate(AllocationRequest::new(part_ids[0], 8, SERVICE_ORDER).for_vehicle(1, "51A-123.45"))
        .await?;
    println!(
        "✓ Allocated {} x {} at {} per unit across {} batches",
        allocation.quantity,
        PARTS[0].0,
        allocation.weighted_unit_cost,
        allocation.usages.len()
    );

    if let Some(usage) = allocation.usages.last() {
        ledger
            .return_to_batch(usage.batch_id, 1, Some(SERVICE_ORDER), Some("seed"))
            .await?;
        println!("✓ Returned 1 x {} to batch {}", PARTS[0].0, usage.batch_id);
    }

    let expired = ledger.expire_batches(now).await?;
    println!("✓ Expired {} batches", expired.len());

    // Shelf count finds one oil filter missing.
    let checks = db.stock_checks();
    let check = checks
        .create(&NewStockCheck::new("Aisle A count").covering(BatchLocation::warehouse(main.id)))
        .await?;
    let filters = db.parts().get(part_ids[2]).await?;
    checks
        .record_count(check.id, filters.id, filters.quantity_in_stock - 1, None, Some("seed"))
        .await?;
    checks.complete(check.id, Some("seed")).await?;
    let applied = ledger.apply_stock_check(check.id, Some("seed")).await?;
    println!(
        "✓ Stock check {} applied {} adjustment(s)",
        check.code,
        applied.transactions.len()
    );

    for cost in ledger
        .cost_of_goods_for_order(SERVICE_ORDER, CogsMethod::WeightedAverage)
        .await?
    {
        info!(
            part_id = cost.part_id,
            quantity = cost.quantity,
            unit_cost = cost.unit_cost.cents(),
            total_cost = cost.total_cost.cents(),
            "Service order cost of goods"
        );
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,garage=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
