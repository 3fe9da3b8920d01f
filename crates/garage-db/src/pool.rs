//! # Database Pool Management
//!
//! Connection pool creation and configuration for SQLite.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Collaborator startup                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  InventoryConfig::load(None) ← file + GARAGE_* environment             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::open(&config).await ← Create pool + run migrations          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐   ┌──────────────────┐    │
//! │  │            SqlitePool                    │   │    PartLocks     │    │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │   │  part 7 ─► 🔒    │    │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │   │  part 9 ─► 🔒    │    │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │   └──────────────────┘    │
//! │  └─────────────────────────────────────────┘           │               │
//! │       │                                                 │               │
//! │       ├── db.parts() / db.warehouses() / ...  (reads, catalog edits)   │
//! │       └── db.ledger()  ◄────────────────────────────────┘               │
//! │             every quantity change, serialized per part                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled for file databases:
//! - Readers don't block writers
//! - Writers don't block readers
//! - Better crash recovery

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{InventoryConfig, LedgerSettings};
use crate::error::{DbError, DbResult};
use crate::ledger::locks::PartLocks;
use crate::ledger::InventoryLedger;
use crate::migrations;
use crate::repository::batch::BatchRepository;
use crate::repository::part::PartRepository;
use crate::repository::stock_check::StockCheckRepository;
use crate::repository::stock_transaction::StockTransactionRepository;
use crate::repository::usage::UsageRepository;
use crate::repository::warehouse::WarehouseRepository;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/garage/inventory.db")
///     .max_connections(5)
///     .busy_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// Connection acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections
    /// open for the life of the pool.
    pub idle_timeout: Option<Duration>,

    /// How long a statement waits on a locked database before `Busy`.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the SQLite busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// An in-memory database lives and dies with its single connection, so
    /// the pool holds exactly one and never recycles it.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::in_memory()).await?;
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: None,
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = if self.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            let connect_url = format!("sqlite://{}?mode=rwc", self.database_path.display());
            SqliteConnectOptions::from_str(&connect_url)
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
                .journal_mode(SqliteJournalMode::Wal)
                .create_if_missing(true)
        };

        Ok(options
            // NORMAL synchronous: safe from corruption, may lose the last
            // transaction on power loss
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout))
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository and ledger access.
///
/// Cloning is cheap: clones share the pool and the per-part lock registry,
/// so every ledger handed out by any clone serializes against the others.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::open(&InventoryConfig::load(None)?).await?;
///
/// let pad = db.parts().create(&NewPart::new("BRK-001", "Brake pad")).await?;
/// db.ledger().receive_batch(ReceiveBatch::new(pad.id, 10, 1200, BatchSource::Purchase)).await?;
/// let issued = db.ledger().allocate(AllocationRequest::new(pad.id, 4, order_id)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Per-part ledger locks shared by every ledger handle.
    locks: Arc<PartLocks>,

    ledger_settings: LedgerSettings,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite: WAL, NORMAL synchronous, foreign keys, busy timeout
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        let connect_options = config.connect_options()?;
        debug!("Connection options configured");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout);
        if config.is_in_memory() {
            pool_options = pool_options.max_lifetime(None::<Duration>);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            locks: Arc::new(PartLocks::new()),
            ledger_settings: LedgerSettings::default(),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Opens the database described by a loaded [`InventoryConfig`], with its
    /// ledger settings applied.
    pub async fn open(config: &InventoryConfig) -> DbResult<Self> {
        let db = Self::new(config.db_config()).await?;
        Ok(db.with_ledger_settings(config.ledger.clone()))
    }

    /// Replaces the settings used by ledgers handed out from now on.
    pub fn with_ledger_settings(mut self, settings: LedgerSettings) -> Self {
        self.ledger_settings = settings;
        self
    }

    /// Runs database migrations.
    ///
    /// Idempotent: applied migrations are tracked in `_sqlx_migrations`.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    ///
    /// Prefer repository methods; quantities must only change through
    /// [`Database::ledger`].
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn ledger_settings(&self) -> &LedgerSettings {
        &self.ledger_settings
    }

    pub(crate) fn locks(&self) -> &Arc<PartLocks> {
        &self.locks
    }

    /// Returns the part catalog repository.
    pub fn parts(&self) -> PartRepository {
        PartRepository::new(self.pool.clone())
    }

    /// Returns the warehouse / zone / bin repository.
    pub fn warehouses(&self) -> WarehouseRepository {
        WarehouseRepository::new(self.pool.clone())
    }

    /// Returns the read side of the batch ledger.
    pub fn batches(&self) -> BatchRepository {
        BatchRepository::new(self.pool.clone())
    }

    pub fn usages(&self) -> UsageRepository {
        UsageRepository::new(self.pool.clone())
    }

    pub fn transactions(&self) -> StockTransactionRepository {
        StockTransactionRepository::new(self.pool.clone())
    }

    /// Returns the stock check repository; apply checks through the ledger.
    pub fn stock_checks(&self) -> StockCheckRepository {
        StockCheckRepository::new(self.pool.clone())
    }

    /// Returns the inventory ledger: the only writer of quantities.
    pub fn ledger(&self) -> InventoryLedger {
        InventoryLedger::new(
            self.pool.clone(),
            Arc::clone(&self.locks),
            self.ledger_settings.clone(),
        )
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository and ledger operations fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn test_config_builder() {
        let config = DbConfig::new("/tmp/garage-test.db")
            .max_connections(10)
            .min_connections(2)
            .busy_timeout(Duration::from_millis(250));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }

    #[tokio::test]
    async fn test_open_applies_ledger_settings() {
        let mut config = InventoryConfig::default();
        config.database.path = PathBuf::from(":memory:");
        config.ledger.lock_timeout_ms = 123;

        let db = Database::open(&config).await.unwrap();
        assert_eq!(db.ledger_settings().lock_timeout_ms, 123);
        assert_eq!(db.ledger().settings().lock_timeout_ms, 123);
    }

    #[tokio::test]
    async fn test_close_fails_health_check() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }
}
