//! # Database Error Types
//!
//! Error types for database operations and ledger units of work.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          Inventory rule (CoreError)        │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  DbError (this module) ◄──────── DbError::Domain                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Collaborator (order fulfillment, procurement)                         │
//! │       │                                                                 │
//! │       └── is_retryable()? retry with backoff : report to user          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use garage_core::{CoreError, ValidationError};
use thiserror::Error;

/// Database operation errors.
///
/// These errors wrap sqlx errors and inventory rule violations and provide
/// context for the collaborator deciding whether to retry.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - ID doesn't exist
    /// - Soft-deleted record
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation not already translated into a domain error.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Referencing non-existent part_id
    /// - Referencing non-existent warehouse / zone / bin
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// SQLite reported the database as locked or busy past `busy_timeout`.
    #[error("Database busy: {0}")]
    Busy(String),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    /// - Pool closed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed (CHECK constraint, trigger abort, bad SQL).
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The batch ledger and the part's cached totals disagree.
    ///
    /// ## When This Occurs
    /// Only if something wrote quantities outside the ledger. The unit of
    /// work is rolled back; nothing is committed.
    #[error("Ledger integrity violation for part {part_id}: {detail}")]
    LedgerIntegrity { part_id: i64, detail: String },

    /// Inventory rule violation.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Returns the wrapped inventory rule violation, if any.
    pub fn domain(&self) -> Option<&CoreError> {
        match self {
            DbError::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the collaborator may retry the same request (with backoff).
    ///
    /// Stock-level and validation errors are never retryable: retrying
    /// without new stock or new input fails the same way.
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::Busy(_) | DbError::PoolExhausted | DbError::ConnectionFailed(_) => true,
            DbError::Domain(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Replaces a unique-constraint failure with the domain error the caller
    /// expects for it.
    pub(crate) fn on_unique(self, domain: impl FnOnce() -> CoreError) -> DbError {
        match self {
            DbError::UniqueViolation { .. } => DbError::Domain(domain()),
            other => other,
        }
    }

    /// Replaces a row-not-found with a domain `NotFound` for `entity`.
    pub(crate) fn on_missing(self, entity: &str, id: impl ToString) -> DbError {
        match self {
            DbError::NotFound { .. } => DbError::Domain(CoreError::not_found(entity, id)),
            other => other,
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type / busy
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::PoolClosed     → DbError::ConnectionFailed
/// sqlx::Error::Io             → DbError::ConnectionFailed
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite messages:
                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint:     "FOREIGN KEY constraint failed"
                // SQLITE_BUSY (5):   "database is locked"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("database is locked")
                    || msg.contains("database is busy")
                    || db_err.code().as_deref() == Some("5")
                {
                    DbError::Busy(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::Io(e) => DbError::ConnectionFailed(e.to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
