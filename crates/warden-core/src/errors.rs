//! Gateway error taxonomy.
//!
//! Every failure a caller can observe maps onto one [`GatewayError`] variant
//! with a stable reason code. Crate-local errors (rate store, conversation
//! store, completion client, validation) convert into it at the pipeline
//! boundary.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse failure category used for logging and metrics labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad shape, length or format. User-correctable.
    Validation,
    /// Content screening rejected the input.
    Security,
    /// Admission controller refused the request.
    RateLimit,
    /// Completion service or conversation store unavailable.
    Upstream,
    /// Failure after the response stream started.
    Stream,
}

impl ErrorCategory {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Security => "security",
            Self::RateLimit => "rate_limit",
            Self::Upstream => "upstream",
            Self::Stream => "stream",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure surfaced to a gateway caller.
#[derive(Clone, Debug, Error)]
pub enum GatewayError {
    /// Request body failed shape, length or format checks.
    #[error("{0}")]
    Validation(String),

    /// Input was screened out. Carries signature ids, never the text.
    #[error("message contains potentially harmful content")]
    SecurityRejection {
        /// Threat score at the time of rejection.
        score: u8,
        /// Identifiers of the matched signatures.
        patterns: Vec<String>,
        /// Whether an encoding attack triggered the rejection.
        encoding_attack: bool,
    },

    /// Caller exceeded one of the admission windows.
    #[error("too many requests, please try again later")]
    RateLimitExceeded {
        /// Name of the first exceeded window, if known.
        window: Option<String>,
        /// Time until the caller may retry.
        retry_after: Duration,
    },

    /// A collaborator (completion service, store) failed before streaming.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Failure after the response headers were committed.
    #[error("stream failure: {0}")]
    Stream(String),
}

impl GatewayError {
    /// Stable machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::SecurityRejection { .. } => "SECURITY_REJECTED",
            Self::RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Upstream(_) => "UPSTREAM_FAILURE",
            Self::Stream(_) => "STREAM_FAILURE",
        }
    }

    /// Failure category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::SecurityRejection { .. } => ErrorCategory::Security,
            Self::RateLimitExceeded { .. } => ErrorCategory::RateLimit,
            Self::Upstream(_) => ErrorCategory::Upstream,
            Self::Stream(_) => ErrorCategory::Stream,
        }
    }

    /// HTTP status for errors raised before the stream starts.
    ///
    /// `Stream` failures are delivered in-band; 500 is only used if one ever
    /// escapes before headers are written.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::SecurityRejection { .. } => 400,
            Self::RateLimitExceeded { .. } => 429,
            Self::Upstream(_) => 502,
            Self::Stream(_) => 500,
        }
    }

    /// Retry hint, only for rate-limit rejections.
    pub fn retry_after(&self) -> Option<Duration> {
        if let Self::RateLimitExceeded { retry_after, .. } = self {
            Some(*retry_after)
        } else {
            None
        }
    }

    /// Fail-closed admission rejection used when the rate store is unusable.
    pub fn fail_closed(retry_after: Duration) -> Self {
        Self::RateLimitExceeded {
            window: None,
            retry_after,
        }
    }
}
