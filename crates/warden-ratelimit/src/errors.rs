//! Rate limiter errors.

use thiserror::Error;
use warden_store::{PoolError, StoreError};

/// Failures loading or saving rate state.
///
/// Callers must treat any of these as a rejection (fail closed).
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Backing store failed.
    #[error("rate store error: {0}")]
    Store(#[from] StoreError),

    /// Stored windows could not be decoded.
    #[error("corrupt rate state for {identity}: {source}")]
    Corrupt {
        /// Identity whose row is unreadable.
        identity: String,
        /// Decode error.
        #[source]
        source: serde_json::Error,
    },

    /// Blocking store task panicked or was cancelled.
    #[error("rate store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<rusqlite::Error> for RateLimitError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(err))
    }
}

impl From<PoolError> for RateLimitError {
    fn from(err: PoolError) -> Self {
        Self::Store(StoreError::Pool(err))
    }
}
