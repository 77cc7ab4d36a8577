//! Completion errors.

use warden_core::GatewayError;

/// Failures talking to the completion backend.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request or response body was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description from the body.
        message: String,
    },

    /// Backend reported an error inside the stream.
    #[error("stream error: {message}")]
    Stream {
        /// Error description.
        message: String,
    },
}

impl CompletionError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Json(_) | Self::Stream { .. } => false,
        }
    }
}

impl From<CompletionError> for GatewayError {
    fn from(err: CompletionError) -> Self {
        Self::Upstream(err.to_string())
    }
}
