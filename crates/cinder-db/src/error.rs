//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CheckoutError::PersistenceFailure ← transient or fatal                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller decides whether to retry (is_retryable)                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting duplicate SKU
    /// - Duplicate receipt number within a store
    /// - Second override for the same failed verification
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// CHECK constraint or immutability trigger rejected the write.
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    /// SQLite could not take the write lock within `busy_timeout`.
    ///
    /// Transient: the whole unit of work can be retried.
    #[error("Database busy: {0}")]
    Busy(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction begin/commit/rollback failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Whether retrying the same operation against fresh state may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Busy(_) | DbError::PoolExhausted)
    }

    /// True for a UNIQUE violation on the given column, e.g. `receipt_number`.
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { field, .. } if field.contains(column))
    }
}

// SQLite primary result codes for lock contention.
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";
const SQLITE_BUSY_SNAPSHOT: &str = "517";
const SQLITE_LOCKED_SHAREDCACHE: &str = "262";

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Busy / Unique / ForeignKey / Constraint / QueryFailed
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
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
                let code = db_err.code();
                let code = code.as_deref();

                if matches!(
                    code,
                    Some(SQLITE_BUSY | SQLITE_LOCKED | SQLITE_BUSY_SNAPSHOT | SQLITE_LOCKED_SHAREDCACHE)
                ) || msg.contains("database is locked")
                {
                    DbError::Busy(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    // "UNIQUE constraint failed: <table>.<column>[, <table>.<column>]"
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
                } else if msg.contains("CHECK constraint failed")
                    || msg.contains("immutable")
                    || msg.contains("append-only")
                {
                    DbError::ConstraintViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Internal(format!("JSON column: {err}"))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(DbError::Busy("locked".into()).is_transient());
        assert!(DbError::PoolExhausted.is_transient());
        assert!(!DbError::not_found("Product", "p1").is_transient());
    }

    #[test]
    fn test_unique_violation_on() {
        let err = DbError::duplicate("transactions.store_id, transactions.receipt_number", "x");
        assert!(err.is_unique_violation_on("receipt_number"));
        assert!(!err.is_unique_violation_on("sku"));
    }
}
