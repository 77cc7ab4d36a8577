//! Runtime error types.

use warden_llm::CompletionError;
use warden_memory::MemoryError;

/// Failures inside the relay and summarization paths.
///
/// These never reach an HTTP status line: relay failures are reported
/// in-band and summarization failures are logged.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Summarization queue is at capacity.
    #[error("summary queue full")]
    QueueFull,

    /// Summarization worker has stopped.
    #[error("summary queue closed")]
    QueueClosed,

    /// Conversation store failed.
    #[error("conversation store: {0}")]
    Store(#[from] MemoryError),

    /// Completion backend failed.
    #[error("completion: {0}")]
    Completion(#[from] CompletionError),
}

impl RuntimeError {
    /// Metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::QueueClosed => "queue_closed",
            Self::Store(_) => "store",
            Self::Completion(_) => "completion",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(RuntimeError::QueueFull.kind(), "queue_full");
        assert_eq!(RuntimeError::QueueClosed.to_string(), "summary queue closed");
    }
}
