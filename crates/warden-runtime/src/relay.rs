//! Streaming orchestrator.
//!
//! One relay per request. The relay task owns the token source, the outbound
//! channel and the accumulator:
//!
//! ```text
//! Init ─▶ Streaming ─┬─▶ Complete   (persist user + assistant, trigger, [DONE])
//!                    ├─▶ Errored    (error frame, nothing persisted)
//!                    └─▶ Cancelled  (receiver dropped, nothing persisted)
//! ```

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, Span, debug, info, warn};
use warden_core::{
    ChatMessage, ClientIdentity, Clock, ConversationId, ConversationTurn, GatewayError,
};
use warden_llm::TokenStream;
use warden_memory::ConversationStore;

use crate::framing::StreamFrame;
use crate::summarize::{SummarizationRequest, SummaryQueue, should_summarize};

/// Outbound frames buffered between the relay task and the HTTP body.
const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Per-request data the relay needs once the stream ends.
#[derive(Clone, Debug)]
pub struct RelayContext {
    /// Caller the stream is relayed to.
    pub client_id: ClientIdentity,
    /// Conversation the exchange belongs to.
    pub conversation_id: ConversationId,
    /// Validated user message.
    pub user_message: String,
    /// When the user message was received (ms).
    pub received_at: i64,
    /// Turns retained before this exchange.
    pub prior_turns: Vec<ConversationTurn>,
}

/// How a relay ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Tokens relayed, turns persisted, `[DONE]` sent.
    Complete {
        /// Full accumulated reply.
        text: String,
        /// Number of frames forwarded.
        tokens: usize,
        /// Conversation turn count after persistence.
        turn_count: u64,
        /// Whether a summarization request was queued.
        summarized: bool,
    },
    /// Token source or persistence failed; an error frame was sent.
    Errored(String),
    /// Caller went away before the terminal frame.
    Cancelled,
}

impl RelayOutcome {
    /// Metrics label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Complete { .. } => "complete",
            Self::Errored(_) => "errored",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Relays completion tokens to callers and runs post-stream side effects.
#[derive(Clone)]
pub struct StreamOrchestrator {
    store: Arc<dyn ConversationStore>,
    queue: Arc<dyn SummaryQueue>,
    clock: Arc<dyn Clock>,
    summarize_threshold: u64,
    channel_capacity: usize,
}

impl std::fmt::Debug for StreamOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOrchestrator")
            .field("summarize_threshold", &self.summarize_threshold)
            .field("channel_capacity", &self.channel_capacity)
            .finish_non_exhaustive()
    }
}

impl StreamOrchestrator {
    /// Orchestrator persisting to `store` and queueing summaries on `queue`.
    pub fn new(
        store: Arc<dyn ConversationStore>,
        queue: Arc<dyn SummaryQueue>,
        clock: Arc<dyn Clock>,
        summarize_threshold: u64,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            summarize_threshold,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Outbound buffer size.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Spawn a relay and return the caller's end of the frame stream.
    ///
    /// The relay task inherits the caller's current span.
    pub fn relay(&self, tokens: TokenStream, ctx: RelayContext) -> ReceiverStream<Bytes> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let this = self.clone();
        drop(tokio::spawn(
            async move {
                let _ = this.drive(tokens, ctx, tx).await;
            }
            .instrument(Span::current()),
        ));
        ReceiverStream::new(rx)
    }

    /// Run a relay to completion on the current task.
    #[allow(clippy::cast_precision_loss)]
    pub async fn drive(
        &self,
        mut tokens: TokenStream,
        ctx: RelayContext,
        tx: mpsc::Sender<Bytes>,
    ) -> RelayOutcome {
        let mut accumulated = String::new();
        let mut forwarded = 0usize;

        let outcome = loop {
            let next = tokio::select! {
                biased;
                () = tx.closed() => break RelayOutcome::Cancelled,
                next = tokens.next() => next,
            };
            match next {
                Some(Ok(token)) => {
                    if token.is_empty() {
                        continue;
                    }
                    accumulated.push_str(&token);
                    if tx.send(StreamFrame::Token(token).encode()).await.is_err() {
                        break RelayOutcome::Cancelled;
                    }
                    forwarded += 1;
                }
                Some(Err(e)) => break self.fail(&ctx, &tx, "token source failed", e.to_string()).await,
                None => break self.complete(&ctx, accumulated, forwarded, &tx).await,
            }
        };

        metrics::counter!("relay_outcomes_total", "outcome" => outcome.label()).increment(1);
        metrics::histogram!("relay_tokens").record(forwarded as f64);
        if outcome == RelayOutcome::Cancelled {
            info!(
                client_id = %ctx.client_id,
                conversation_id = %ctx.conversation_id,
                forwarded,
                "caller disconnected mid-stream"
            );
        }
        outcome
    }

    async fn complete(
        &self,
        ctx: &RelayContext,
        text: String,
        tokens: usize,
        tx: &mpsc::Sender<Bytes>,
    ) -> RelayOutcome {
        if tx.is_closed() {
            return RelayOutcome::Cancelled;
        }

        let user = ConversationTurn::user(ctx.user_message.clone(), ctx.received_at);
        let assistant = ConversationTurn::assistant(text.clone(), self.clock.now_ms());
        let turn_count = match self
            .store
            .append_exchange(&ctx.conversation_id, user, assistant)
            .await
        {
            Ok(count) => count,
            Err(e) => return self.fail(ctx, tx, "failed to persist exchange", e.to_string()).await,
        };

        let summarized = should_summarize(turn_count, self.summarize_threshold)
            && self.enqueue_summary(ctx, &text);

        // Frame delivery failure here is a late disconnect; the exchange is
        // already stored.
        let _ = tx.send(StreamFrame::Done.encode()).await;
        debug!(conversation_id = %ctx.conversation_id, tokens, turn_count, summarized, "relay complete");
        RelayOutcome::Complete {
            text,
            tokens,
            turn_count,
            summarized,
        }
    }

    fn enqueue_summary(&self, ctx: &RelayContext, reply: &str) -> bool {
        let mut messages: Vec<ChatMessage> = ctx.prior_turns.iter().map(ChatMessage::from).collect();
        messages.push(ChatMessage::user(ctx.user_message.clone()));
        messages.push(ChatMessage::assistant(reply));

        let request = SummarizationRequest {
            conversation_id: ctx.conversation_id.clone(),
            messages,
        };
        match self.queue.enqueue(request) {
            Ok(()) => {
                metrics::counter!("summarization_enqueued_total").increment(1);
                true
            }
            Err(e) => {
                metrics::counter!("summarization_enqueue_failures_total", "reason" => e.kind())
                    .increment(1);
                warn!(
                    client_id = %ctx.client_id,
                    conversation_id = %ctx.conversation_id,
                    error = %e,
                    "could not queue summarization"
                );
                false
            }
        }
    }

    async fn fail(
        &self,
        ctx: &RelayContext,
        tx: &mpsc::Sender<Bytes>,
        what: &str,
        message: String,
    ) -> RelayOutcome {
        let err = GatewayError::Stream(message.clone());
        warn!(
            client_id = %ctx.client_id,
            conversation_id = %ctx.conversation_id,
            category = %err.category(),
            error = %err,
            "{what}"
        );
        let _ = tx.send(StreamFrame::Error(message.clone()).encode()).await;
        RelayOutcome::Errored(message)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tracing::Level;
    use warden_core::ManualClock;
    use warden_core::logging::capture_logs;
    use warden_llm::CompletionError;
    use warden_memory::{ConversationState, MemoryConversationStore, MemoryError};

    use super::*;
    use crate::errors::RuntimeError;
    use crate::summarize::ChannelSummaryQueue;

    fn tokens(items: Vec<Result<&'static str, &'static str>>) -> TokenStream {
        Box::pin(futures::stream::iter(items.into_iter().map(|item| {
            item.map(str::to_owned)
                .map_err(|m| CompletionError::Stream { message: m.into() })
        })))
    }

    fn ctx() -> RelayContext {
        RelayContext {
            client_id: ClientIdentity::from_raw("192.0.2.10"),
            conversation_id: ConversationId::from_raw("conv-1"),
            user_message: "hi".into(),
            received_at: 100,
            prior_turns: Vec::new(),
        }
    }

    fn orchestrator(
        store: Arc<dyn ConversationStore>,
        threshold: u64,
    ) -> (StreamOrchestrator, mpsc::Receiver<SummarizationRequest>) {
        let (queue, rx) = ChannelSummaryQueue::bounded(8);
        let orch = StreamOrchestrator::new(store, Arc::new(queue), Arc::new(ManualClock::new(200)), threshold);
        (orch, rx)
    }

    async fn frames(mut rx: mpsc::Receiver<Bytes>) -> Vec<StreamFrame> {
        let mut out = Vec::new();
        while let Some(bytes) = rx.recv().await {
            out.push(StreamFrame::decode(&bytes).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn empty_tokens_are_skipped() {
        let store = Arc::new(MemoryConversationStore::default());
        let (orch, _q) = orchestrator(store.clone(), 10);
        let (tx, rx) = mpsc::channel(16);
        let outcome = orch.drive(tokens(vec![Ok("a"), Ok(""), Ok("b")]), ctx(), tx).await;
        assert_eq!(
            frames(rx).await,
            vec![
                StreamFrame::Token("a".into()),
                StreamFrame::Token("b".into()),
                StreamFrame::Done
            ]
        );
        assert!(matches!(outcome, RelayOutcome::Complete { tokens: 2, .. }));
    }

    #[tokio::test]
    async fn turn_timestamps() {
        let store = Arc::new(MemoryConversationStore::default());
        let (orch, _q) = orchestrator(store.clone(), 10);
        let (tx, _rx) = mpsc::channel(16);
        let _ = orch.drive(tokens(vec![Ok("ok")]), ctx(), tx).await;
        let state = store.get_state(&ConversationId::from_raw("conv-1")).await.unwrap();
        assert_eq!(state.turns[0].timestamp, 100);
        assert_eq!(state.turns[1].timestamp, 200);
    }

    #[tokio::test]
    async fn summary_payload_includes_prior_and_exchange() {
        let store = Arc::new(MemoryConversationStore::default());
        let id = ConversationId::from_raw("conv-1");
        let _ = store.append_turn(&id, ConversationTurn::user("first", 1)).await.unwrap();
        let _ = store.append_turn(&id, ConversationTurn::assistant("reply", 2)).await.unwrap();

        let (orch, mut q) = orchestrator(store.clone(), 4);
        let mut relay_ctx = ctx();
        relay_ctx.prior_turns = store.get_state(&id).await.unwrap().turns;
        let (tx, _rx) = mpsc::channel(16);
        let outcome = orch.drive(tokens(vec![Ok("second reply")]), relay_ctx, tx).await;
        assert!(matches!(outcome, RelayOutcome::Complete { turn_count: 4, summarized: true, .. }));

        let request = q.try_recv().unwrap();
        let contents: Vec<_> = request.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "reply", "hi", "second reply"]);
    }

    struct FailingStore;

    #[async_trait]
    impl ConversationStore for FailingStore {
        async fn get_state(&self, _id: &ConversationId) -> Result<ConversationState, MemoryError> {
            Ok(ConversationState::default())
        }
        async fn append_turn(&self, id: &ConversationId, _turn: ConversationTurn) -> Result<u64, MemoryError> {
            Err(MemoryError::Corrupt {
                conversation_id: id.to_string(),
                message: "disk full".into(),
            })
        }
        async fn append_exchange(
            &self,
            id: &ConversationId,
            user: ConversationTurn,
            _assistant: ConversationTurn,
        ) -> Result<u64, MemoryError> {
            self.append_turn(id, user).await
        }
        async fn set_summary(&self, _id: &ConversationId, _summary: &str) -> Result<(), MemoryError> {
            Ok(())
        }
        async fn clear(&self, _id: &ConversationId) -> Result<(), MemoryError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn persistence_failure_sends_error_instead_of_done() {
        let (orch, mut q) = orchestrator(Arc::new(FailingStore), 2);
        let (tx, rx) = mpsc::channel(16);
        let outcome = orch.drive(tokens(vec![Ok("x")]), ctx(), tx).await;
        assert!(matches!(outcome, RelayOutcome::Errored(_)));
        let frames = frames(rx).await;
        assert!(matches!(frames.last(), Some(StreamFrame::Error(_))));
        assert!(!frames.contains(&StreamFrame::Done));
        assert!(q.try_recv().is_err());
    }

    #[tokio::test]
    async fn failures_are_logged_with_caller_and_category() {
        let (logs, _guard) = capture_logs();
        let store = Arc::new(MemoryConversationStore::default());
        let (orch, _q) = orchestrator(store, 10);
        let rx = orch.relay(tokens(vec![Ok("partial"), Err("backend reset")]), ctx());
        let frames: Vec<_> = rx.collect().await;
        assert_eq!(frames.len(), 2);

        let event = logs.find(Level::WARN, "token source failed").unwrap();
        assert_eq!(event.field("client_id"), Some("192.0.2.10"));
        assert_eq!(event.field("conversation_id"), Some("conv-1"));
        assert_eq!(event.field("category"), Some("stream"));
        assert!(event.field("error").unwrap().contains("backend reset"));
    }

    #[tokio::test]
    async fn persistence_failure_logs_caller() {
        let (logs, _guard) = capture_logs();
        let (orch, _q) = orchestrator(Arc::new(FailingStore), 10);
        let rx = orch.relay(tokens(vec![Ok("x")]), ctx());
        let _: Vec<_> = rx.collect().await;

        let event = logs.find(Level::WARN, "failed to persist exchange").unwrap();
        assert_eq!(event.field("client_id"), Some("192.0.2.10"));
    }

    struct RejectingQueue;

    impl SummaryQueue for RejectingQueue {
        fn enqueue(&self, _request: SummarizationRequest) -> Result<(), RuntimeError> {
            Err(RuntimeError::QueueFull)
        }
    }

    #[tokio::test]
    async fn enqueue_failure_does_not_fail_stream() {
        let store = Arc::new(MemoryConversationStore::default());
        let orch = StreamOrchestrator::new(store, Arc::new(RejectingQueue), Arc::new(ManualClock::new(0)), 2);
        let (tx, rx) = mpsc::channel(16);
        let outcome = orch.drive(tokens(vec![Ok("x")]), ctx(), tx).await;
        assert!(matches!(outcome, RelayOutcome::Complete { summarized: false, turn_count: 2, .. }));
        assert_eq!(frames(rx).await.last(), Some(&StreamFrame::Done));
    }
}
