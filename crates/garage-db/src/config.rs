//! # Inventory Configuration
//!
//! Configuration for the database pool and the inventory ledger.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     GARAGE_DB_PATH=/var/lib/garage/inventory.db                        │
//! │     GARAGE_LOCK_TIMEOUT_MS=2000                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/garage-inventory/garage-inventory.toml (Linux)           │
//! │     ~/Library/Application Support/com.garage.inventory/... (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     ./garage-inventory.db, FIFO, 5s lock wait                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/garage/inventory.db"
//! max_connections = 5
//! min_connections = 1
//! connect_timeout_secs = 30
//! busy_timeout_ms = 5000
//!
//! [ledger]
//! lock_timeout_ms = 5000
//! default_policy = "fifo"   # fifo | lifo | fefo
//! history_page_size = 100
//! expiry_warning_days = 30
//! ```

use garage_core::{
    AllocationPolicy, DEFAULT_EXPIRY_WARNING_DAYS, DEFAULT_HISTORY_PAGE_SIZE,
    DEFAULT_LOCK_TIMEOUT_MS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

/// Config file name looked up in the platform config directory.
pub const CONFIG_FILE_NAME: &str = "garage-inventory.toml";

// =============================================================================
// Database Section
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// How long SQLite waits on a locked database before reporting busy.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("garage-inventory.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

// =============================================================================
// Ledger Section
// =============================================================================

/// `[ledger]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Bounded wait for a part's ledger lock.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,

    /// Batch order used when an allocation request names no policy.
    #[serde(default)]
    pub default_policy: AllocationPolicy,

    /// Rows fetched per round trip by `StockHistory`.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: u32,

    /// Days ahead an expiring batch raises an alert.
    #[serde(default = "default_expiry_warning_days")]
    pub expiry_warning_days: i64,
}

fn default_lock_timeout() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

fn default_history_page_size() -> u32 {
    DEFAULT_HISTORY_PAGE_SIZE
}

fn default_expiry_warning_days() -> i64 {
    DEFAULT_EXPIRY_WARNING_DAYS
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            lock_timeout_ms: default_lock_timeout(),
            default_policy: AllocationPolicy::default(),
            history_page_size: default_history_page_size(),
            expiry_warning_days: default_expiry_warning_days(),
        }
    }
}

impl LedgerSettings {
    #[inline]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_default_policy(mut self, policy: AllocationPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn with_history_page_size(mut self, size: u32) -> Self {
        self.history_page_size = size;
        self
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete inventory configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub ledger: LedgerSettings,
}

impl InventoryConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`garage-inventory.toml`)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading inventory config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load inventory config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Parses a TOML file without applying overrides.
    pub fn from_file(path: &Path) -> DbResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| DbError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> DbResult<Self> {
        toml::from_str(contents).map_err(|e| DbError::Config(e.to_string()))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.max_connections == 0 {
            return Err(DbError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(DbError::Config(
                "database.min_connections cannot exceed max_connections".into(),
            ));
        }
        if self.ledger.lock_timeout_ms == 0 {
            return Err(DbError::Config(
                "ledger.lock_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.ledger.history_page_size == 0 {
            return Err(DbError::Config(
                "ledger.history_page_size must be greater than 0".into(),
            ));
        }
        if self.ledger.expiry_warning_days < 0 {
            return Err(DbError::Config(
                "ledger.expiry_warning_days cannot be negative".into(),
            ));
        }
        Ok(())
    }

    /// Applies `GARAGE_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("GARAGE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("GARAGE_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid GARAGE_DB_MAX_CONNECTIONS"),
            }
        }

        if let Some(ms) = lookup("GARAGE_LOCK_TIMEOUT_MS") {
            match ms.parse::<u64>() {
                Ok(n) => {
                    debug!(lock_timeout_ms = n, "Overriding lock timeout from environment");
                    self.ledger.lock_timeout_ms = n;
                }
                Err(_) => warn!(value = %ms, "Ignoring invalid GARAGE_LOCK_TIMEOUT_MS"),
            }
        }

        if let Some(policy) = lookup("GARAGE_ALLOCATION_POLICY") {
            match policy.parse::<AllocationPolicy>() {
                Ok(p) => self.ledger.default_policy = p,
                Err(_) => warn!(value = %policy, "Unknown allocation policy in environment"),
            }
        }

        if let Some(size) = lookup("GARAGE_HISTORY_PAGE_SIZE") {
            match size.parse::<u32>() {
                Ok(n) => self.ledger.history_page_size = n,
                Err(_) => warn!(value = %size, "Ignoring invalid GARAGE_HISTORY_PAGE_SIZE"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "garage", "inventory")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Pool configuration derived from the `[database]` section.
    pub fn db_config(&self) -> DbConfig {
        let base = if self.database.path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.database.path)
                .max_connections(self.database.max_connections)
                .min_connections(self.database.min_connections)
        };
        base.connect_timeout(Duration::from_secs(self.database.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = InventoryConfig::default();
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.ledger.default_policy, AllocationPolicy::Fifo);
        assert_eq!(config.ledger.lock_timeout_ms, DEFAULT_LOCK_TIMEOUT_MS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = InventoryConfig::from_toml(
            r#"
            [ledger]
            default_policy = "fefo"
            lock_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.ledger.default_policy, AllocationPolicy::Fefo);
        assert_eq!(config.ledger.lock_timeout(), Duration::from_millis(250));
        assert_eq!(config.ledger.history_page_size, DEFAULT_HISTORY_PAGE_SIZE);
        assert_eq!(config.database.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = InventoryConfig::from_toml("[ledger]\ndefault_policy = \"random\"").unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("GARAGE_DB_PATH", ":memory:"),
            ("GARAGE_LOCK_TIMEOUT_MS", "75"),
            ("GARAGE_ALLOCATION_POLICY", "LIFO"),
            ("GARAGE_HISTORY_PAGE_SIZE", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = InventoryConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from(":memory:"));
        assert_eq!(config.ledger.lock_timeout_ms, 75);
        assert_eq!(config.ledger.default_policy, AllocationPolicy::Lifo);
        assert_eq!(config.ledger.history_page_size, DEFAULT_HISTORY_PAGE_SIZE);
        assert_eq!(config.db_config().max_connections, 1);
    }

    #[test]
    fn test_validation() {
        let mut config = InventoryConfig::default();
        config.ledger.lock_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = InventoryConfig::default();
        config.ledger.history_page_size = 0;
        assert!(config.validate().is_err());

        let mut config = InventoryConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_has_sections() {
        let toml_str = toml::to_string_pretty(&InventoryConfig::default()).unwrap();
        assert!(toml_str.contains("[database]"));
        assert!(toml_str.contains("[ledger]"));
    }
}
