//! Completion backend settings.

use serde::{Deserialize, Serialize};

/// OpenAI-compatible chat completion endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionSettings {
    /// Base URL; `/chat/completions` is appended.
    pub base_url: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Bearer token, if the endpoint needs one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Token cap for chat replies.
    pub max_tokens: u32,
    /// Token cap for summaries.
    pub summary_max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/v1".to_string(),
            model: "llama-3.3-70b-instruct".to_string(),
            api_key: None,
            max_tokens: 1024,
            summary_max_tokens: 256,
            temperature: 0.7,
            connect_timeout_ms: 10_000,
        }
    }
}
