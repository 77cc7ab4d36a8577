//! Conversation store errors.

use thiserror::Error;
use warden_core::GatewayError;
use warden_store::{PoolError, StoreError};

/// Failures reading or writing conversation history.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Backing store failed.
    #[error("conversation store error: {0}")]
    Store(#[from] StoreError),

    /// A stored row could not be interpreted.
    #[error("corrupt conversation {conversation_id}: {message}")]
    Corrupt {
        /// Conversation whose data is unreadable.
        conversation_id: String,
        /// What was wrong.
        message: String,
    },

    /// Blocking store task panicked or was cancelled.
    #[error("conversation store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(err))
    }
}

impl From<PoolError> for MemoryError {
    fn from(err: PoolError) -> Self {
        Self::Store(StoreError::Pool(err))
    }
}

impl From<MemoryError> for GatewayError {
    fn from(err: MemoryError) -> Self {
        Self::Upstream(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_upstream() {
        let err = MemoryError::Corrupt {
            conversation_id: "conv-1".into(),
            message: "bad role".into(),
        };
        let gw: GatewayError = err.into();
        assert_eq!(gw.code(), "UPSTREAM_FAILURE");
        assert!(gw.to_string().contains("conv-1"));
    }
}
