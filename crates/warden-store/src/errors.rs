//! Storage error types.

use thiserror::Error;

/// Errors from the `SQLite` layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Database directory could not be created.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON column could not be encoded or decoded.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which migration failed and why.
        message: String,
    },
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, StoreError>;
