//! # Database Migrations
//!
//! Embedded SQL migrations for the inventory schema.
//!
//! ## How Migrations Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Process                                  │
//! │                                                                         │
//! │  Database::new                                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Check _sqlx_migrations table (create if missing)                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Compare embedded migrations vs applied                                │
//! │       │                                                                 │
//! │       └── 001_initial_schema.sql   catalog, topology, batch ledger,    │
//! │                                    append-only stock_transactions      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Run pending migrations in order, record each in _sqlx_migrations      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. Create a new file in `migrations/sqlite/` with the next sequence number
//! 2. Name format: `NNN_description.sql`
//! 3. **NEVER** modify existing migrations, always add new ones

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

/// Embedded migrations from the `migrations/sqlite` directory.
///
/// `sqlx::migrate!()` embeds the SQL files at compile time; no runtime file
/// access is needed.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Runs all pending database migrations.
///
/// Idempotent, and each migration runs in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("All migrations applied successfully");
    Ok(())
}

/// Returns `(embedded, applied)` migration counts for diagnostics.
///
/// A database that has never been migrated reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let total = MIGRATOR.migrations.len();

    let has_table: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    if has_table == 0 {
        debug!("No _sqlx_migrations table yet");
        return Ok((total, 0));
    }

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;

    Ok((total, applied as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_unmigrated_database_reports_zero() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();
        let (total, applied) = migration_status(db.pool()).await.unwrap();
        assert!(total >= 1);
        assert_eq!(applied, 0);

        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();
        let (_, applied) = migration_status(db.pool()).await.unwrap();
        assert_eq!(applied, total);
    }

    #[tokio::test]
    async fn test_stock_transactions_are_append_only() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = chrono::Utc::now();

        sqlx::query(
            "INSERT INTO parts (part_number, name, created_at) VALUES ('P-1', 'Filter', ?)",
        )
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();
        sqlx::query(
            r#"
            INSERT INTO stock_transactions
                (transaction_number, part_id, transaction_type, quantity_delta,
                 quantity_before, quantity_after, transaction_date, created_at)
            VALUES ('STK-1', 1, 'receipt', 5, 0, 5, ?, ?)
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();

        let update = sqlx::query("UPDATE stock_transactions SET notes = 'edited'")
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM stock_transactions")
            .execute(db.pool())
            .await;
        assert!(delete.is_err());

        let bad_chain = sqlx::query(
            r#"
            INSERT INTO stock_transactions
                (transaction_number, part_id, transaction_type, quantity_delta,
                 quantity_before, quantity_after, transaction_date, created_at)
            VALUES ('STK-2', 1, 'issue', -2, 5, 4, ?, ?)
            "#,
        )
        .bind(now)
        .bind(now)
        .execute(db.pool())
        .await;
        assert!(bad_chain.is_err());
    }
}
