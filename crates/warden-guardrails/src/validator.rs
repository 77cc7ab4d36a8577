//! Request field validation.
//!
//! Untyped JSON values are validated into closed result types before any
//! other code touches them.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use serde_json::{Value, json};
use warden_core::ConversationId;

use crate::errors::ValidationError;
use crate::scoring::{ThreatAssessment, assess};
use crate::signatures::SignatureSet;

/// Default message length cap, in characters.
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Maximum conversation id length.
pub const MAX_CONVERSATION_ID_LEN: usize = 100;

static CONVERSATION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^conv-[0-9]+$").expect("valid regex"));

/// A message that passed shape checks, with its threat assessment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedMessage {
    /// Trimmed text.
    pub sanitized: String,
    /// At least one signature matched.
    pub suspicious: bool,
    /// Threat score in `0..=100`.
    pub score: u8,
    /// Matched signature ids, in table order.
    pub matched_patterns: Vec<String>,
}

/// Outcome of message validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageVerdict {
    /// Failed a shape or length check.
    Rejected(ValidationError),
    /// Well-formed; may still be suspicious.
    Accepted(AcceptedMessage),
}

impl MessageVerdict {
    /// Whether the message passed shape checks.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    /// Flat `{valid, error?, sanitized, suspicious, score, matchedPatterns}` view.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Rejected(err) => json!({
                "valid": false,
                "error": err.to_string(),
                "suspicious": false,
                "score": 0,
                "matchedPatterns": [],
            }),
            Self::Accepted(msg) => json!({
                "valid": true,
                "sanitized": msg.sanitized,
                "suspicious": msg.suspicious,
                "score": msg.score,
                "matchedPatterns": msg.matched_patterns,
            }),
        }
    }
}

/// Message validator with a configurable cap and signature table.
#[derive(Clone, Debug)]
pub struct Validator {
    max_chars: usize,
    signatures: Arc<SignatureSet>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_CHARS)
    }
}

impl Validator {
    /// Validator using the built-in signature table.
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            signatures: SignatureSet::builtin(),
        }
    }

    /// Validator using a custom signature table.
    pub fn with_signatures(max_chars: usize, signatures: Arc<SignatureSet>) -> Self {
        Self {
            max_chars,
            signatures,
        }
    }

    /// Configured length cap.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Validate a raw message value.
    ///
    /// Checks, in order: non-empty string, length cap, non-blank after trim,
    /// then threat signatures against the trimmed text.
    pub fn validate_message(&self, raw: &Value) -> MessageVerdict {
        let Some(text) = raw.as_str().filter(|s| !s.is_empty()) else {
            return MessageVerdict::Rejected(ValidationError::InvalidMessageType);
        };

        let len = text.chars().count();
        if len > self.max_chars {
            return MessageVerdict::Rejected(ValidationError::MessageTooLong {
                max: self.max_chars,
                actual: len,
            });
        }

        let trimmed = text.trim();
        if trimmed.is_empty() {
            return MessageVerdict::Rejected(ValidationError::EmptyMessage);
        }

        let assessment: ThreatAssessment = assess(trimmed, &self.signatures);
        MessageVerdict::Accepted(AcceptedMessage {
            sanitized: trimmed.to_string(),
            suspicious: assessment.suspicious(),
            score: assessment.score,
            matched_patterns: assessment.matched_patterns,
        })
    }
}

/// Validate a message with the default cap and signature table.
pub fn validate_message(raw: &Value) -> MessageVerdict {
    Validator::default().validate_message(raw)
}

/// Validate a raw conversation id.
///
/// Must be a non-empty string of at most 100 characters matching
/// `^conv-[0-9]+$` (ASCII digits only). Non-conforming ids are rejected, never coerced.
pub fn validate_conversation_id(raw: &Value) -> Result<ConversationId, ValidationError> {
    let Some(id) = raw.as_str().filter(|s| !s.is_empty()) else {
        return Err(ValidationError::InvalidConversationIdType);
    };
    if id.chars().count() > MAX_CONVERSATION_ID_LEN {
        return Err(ValidationError::ConversationIdTooLong);
    }
    if !CONVERSATION_ID_RE.is_match(id) {
        return Err(ValidationError::ConversationIdFormat);
    }
    Ok(ConversationId::from_raw(id))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
