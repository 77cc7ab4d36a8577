//! OpenAI-compatible streaming chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::debug;
use warden_core::ChatMessage;

use crate::errors::CompletionError;
use crate::service::{CompletionOptions, CompletionService, TokenStream};
use crate::sse::token_stream;

/// Connection settings for [`OpenAiCompatClient`].
#[derive(Clone, Debug)]
pub struct OpenAiCompatConfig {
    /// Base URL up to and including the version segment, e.g. `http://host/v1`.
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Bearer token, if the backend needs one.
    pub api_key: Option<String>,
    /// Default sampling temperature.
    pub temperature: Option<f32>,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/v1".into(),
            model: "llama-3.3-70b-instruct".into(),
            api_key: None,
            temperature: None,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Client for any server exposing `POST /chat/completions` with SSE streaming.
#[derive(Clone, Debug)]
pub struct OpenAiCompatClient {
    config: OpenAiCompatConfig,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Build a client; fails only if the TLS backend cannot initialize.
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, CompletionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// Model this client requests.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_headers(&self) -> Result<HeaderMap, CompletionError> {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let _ = headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        if let Some(key) = &self.config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                CompletionError::Api {
                    status: 0,
                    message: format!("invalid API key header: {e}"),
                }
            })?;
            let _ = headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

/// Message from an error body, falling back to the raw text.
fn parse_api_error(body: &str, status: u16) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json["error"]["message"]
                .as_str()
                .or_else(|| json["error"].as_str())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| format!("HTTP {status}: {body}"))
}

#[async_trait]
impl CompletionService for OpenAiCompatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<TokenStream, CompletionError> {
        debug!(
            model = %self.config.model,
            message_count = messages.len(),
            "starting completion stream"
        );

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            stream: true,
            max_tokens: options.max_tokens,
            temperature: options.temperature.or(self.config.temperature),
        };

        let response = self
            .client
            .post(self.endpoint())
            .headers(self.build_headers()?)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                message: parse_api_error(&body, status.as_u16()),
            });
        }

        Ok(Box::pin(token_stream(response.bytes_stream())))
    }
}
