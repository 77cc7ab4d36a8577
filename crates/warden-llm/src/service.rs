//! Completion service port.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use warden_core::ChatMessage;

use crate::errors::CompletionError;

/// Tokens in generation order; the first `Err` ends the stream.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// Per-call generation options.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompletionOptions {
    /// Upper bound on generated tokens.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(1024),
            temperature: None,
        }
    }
}

impl CompletionOptions {
    /// Options with a token cap and backend-default temperature.
    pub fn with_max_tokens(max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            temperature: None,
        }
    }
}

/// A token-streaming language model.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Start generating a reply to `messages`.
    ///
    /// Errors returned here happen before any token is produced.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<TokenStream, CompletionError>;
}

/// Drain a token stream into one string.
pub async fn collect_text(mut tokens: TokenStream) -> Result<String, CompletionError> {
    let mut text = String::new();
    while let Some(token) = tokens.next().await {
        text.push_str(&token?);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn collect_joins_tokens() {
        let stream: TokenStream = Box::pin(futures::stream::iter(vec![
            Ok("Hel".to_string()),
            Ok("lo".to_string()),
        ]));
        assert_eq!(collect_text(stream).await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn collect_stops_at_error() {
        let stream: TokenStream = Box::pin(futures::stream::iter(vec![
            Ok("a".to_string()),
            Err(CompletionError::Stream {
                message: "cut".into(),
            }),
            Ok("b".to_string()),
        ]));
        assert!(collect_text(stream).await.is_err());
    }
}
