//! Scripted completion service.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use warden_core::ChatMessage;

use crate::errors::CompletionError;
use crate::service::{CompletionOptions, CompletionService, TokenStream};

/// One scripted reply.
#[derive(Clone, Debug)]
pub enum MockReply {
    /// Stream these tokens, then end.
    Tokens(Vec<String>),
    /// Stream `tokens`, then fail with `message`.
    FailAfter {
        /// Tokens emitted before the failure.
        tokens: Vec<String>,
        /// Stream error message.
        message: String,
    },
    /// Refuse to start.
    Refuse(String),
}

impl MockReply {
    /// Reply streaming `tokens`.
    pub fn tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Tokens(tokens.into_iter().map(Into::into).collect())
    }
}

/// Recorded call to [`MockCompletion::complete`].
#[derive(Clone, Debug)]
pub struct RecordedCall {
    /// Context that was sent.
    pub messages: Vec<ChatMessage>,
    /// Options that were sent.
    pub options: CompletionOptions,
}

/// Completion service that plays back scripted replies.
///
/// Queued replies are used in order; once the queue is empty every call gets
/// the fallback reply.
#[derive(Debug)]
pub struct MockCompletion {
    queue: Mutex<VecDeque<MockReply>>,
    fallback: MockReply,
    token_delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockCompletion {
    /// Always reply with `reply`.
    pub fn new(reply: MockReply) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: reply,
            token_delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always stream `tokens`.
    pub fn with_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MockReply::tokens(tokens))
    }

    /// Sleep before each token.
    #[must_use]
    pub fn token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = Some(delay);
        self
    }

    /// Queue a reply for the next unanswered call.
    pub fn push_reply(&self, reply: MockReply) {
        self.queue.lock().push_back(reply);
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    fn next_reply(&self) -> MockReply {
        self.queue.lock().pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl CompletionService for MockCompletion {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<TokenStream, CompletionError> {
        self.calls.lock().push(RecordedCall {
            messages: messages.to_vec(),
            options: *options,
        });

        let (tokens, failure) = match self.next_reply() {
            MockReply::Refuse(message) => {
                return Err(CompletionError::Api {
                    status: 503,
                    message,
                });
            }
            MockReply::Tokens(tokens) => (tokens, None),
            MockReply::FailAfter { tokens, message } => (tokens, Some(message)),
        };

        let delay = self.token_delay;
        let items = tokens
            .into_iter()
            .map(Ok::<String, CompletionError>)
            .chain(failure.map(|message| Err(CompletionError::Stream { message })));
        let stream = futures::stream::iter(items).then(move |item| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            item
        });
        Ok(Box::pin(stream))
    }
}
