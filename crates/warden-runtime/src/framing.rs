//! Outbound event-stream frames.
//!
//! `data: {"token": "..."}\n\n` per token, `data: [DONE]\n\n` on success,
//! `data: {"error": "..."}\n\n` on failure.

use bytes::Bytes;
use serde_json::json;

/// One frame written to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamFrame {
    /// A generated token.
    Token(String),
    /// Terminal success sentinel.
    Done,
    /// Terminal failure.
    Error(String),
}

impl StreamFrame {
    /// Wire bytes.
    pub fn encode(&self) -> Bytes {
        let text = match self {
            Self::Token(token) => format!("data: {}\n\n", json!({ "token": token })),
            Self::Done => "data: [DONE]\n\n".to_owned(),
            Self::Error(message) => format!("data: {}\n\n", json!({ "error": message })),
        };
        Bytes::from(text)
    }

    /// Parse one frame back from its wire form.
    pub fn decode(frame: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(frame).ok()?;
        let data = text.strip_prefix("data: ")?.strip_suffix("\n\n")?;
        if data == "[DONE]" {
            return Some(Self::Done);
        }
        let value: serde_json::Value = serde_json::from_str(data).ok()?;
        if let Some(token) = value.get("token").and_then(serde_json::Value::as_str) {
            return Some(Self::Token(token.to_owned()));
        }
        value
            .get("error")
            .and_then(serde_json::Value::as_str)
            .map(|e| Self::Error(e.to_owned()))
    }
}
