//! Error types for validation and signature compilation.

use thiserror::Error;
use warden_core::GatewayError;

/// A request field failed shape, length or format checks.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Message missing, not a string, or the empty string.
    #[error("Invalid message type")]
    InvalidMessageType,

    /// Message longer than the configured cap.
    #[error("Message too long. Maximum {max} characters.")]
    MessageTooLong {
        /// Configured cap.
        max: usize,
        /// Actual length in characters.
        actual: usize,
    },

    /// Message contains only whitespace.
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// Conversation id missing, not a string, or empty.
    #[error("Invalid conversationId type")]
    InvalidConversationIdType,

    /// Conversation id longer than the maximum.
    #[error("Invalid conversationId length")]
    ConversationIdTooLong,

    /// Conversation id not of the form `conv-<digits>`.
    #[error("Invalid conversationId format")]
    ConversationIdFormat,
}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        GatewayError::Validation(err.to_string())
    }
}

/// Errors building a custom signature set.
#[derive(Debug, Error)]
pub enum GuardrailError {
    /// A signature pattern failed to compile.
    #[error("invalid pattern for signature {id}: {source}")]
    Pattern {
        /// Signature id.
        id: String,
        /// Compilation error.
        #[source]
        source: regex::Error,
    },

    /// Two signatures share an id.
    #[error("duplicate signature id: {id}")]
    DuplicateId {
        /// The repeated id.
        id: String,
    },
}
