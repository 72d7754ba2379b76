//! Error types for the migration system
//!
//! Every failure is fatal to the run that hit it; nothing here is retried.

use std::fmt;

/// ORM result type alias
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for migration operations
#[derive(Debug, Clone)]
pub enum OrmError {
    /// Filesystem error while reading or writing migration files
    Io(String),
    /// Database query error
    Database(String),
    /// Connection pool error
    Connection(String),
    /// Transaction control error (begin/commit/rollback)
    Transaction(String),
    /// A migration body or its ledger entry failed to apply
    Migration(String),
    /// Migration lock could not be acquired or released
    Lock(String),
    /// An already-applied migration changed on disk
    ChecksumMismatch {
        filename: String,
        recorded: String,
        current: String,
    },
    /// Configuration error
    Configuration(String),
}

impl fmt::Display for OrmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrmError::Io(msg) => write!(f, "IO error: {}", msg),
            OrmError::Database(msg) => write!(f, "Database error: {}", msg),
            OrmError::Connection(msg) => write!(f, "Connection error: {}", msg),
            OrmError::Transaction(msg) => write!(f, "Transaction error: {}", msg),
            OrmError::Migration(msg) => write!(f, "Migration error: {}", msg),
            OrmError::Lock(msg) => write!(f, "Lock error: {}", msg),
            OrmError::ChecksumMismatch {
                filename,
                recorded,
                current,
            } => write!(
                f,
                "Migration {} was modified after it was applied (recorded {}, found {})",
                filename, recorded, current
            ),
            OrmError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for OrmError {}

// Convert from sqlx errors
impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        OrmError::Database(err.to_string())
    }
}

impl From<std::io::Error> for OrmError {
    fn from(err: std::io::Error) -> Self {
        OrmError::Io(err.to_string())
    }
}

impl From<showroom_core::ConfigError> for OrmError {
    fn from(err: showroom_core::ConfigError) -> Self {
        OrmError::Configuration(err.to_string())
    }
}
