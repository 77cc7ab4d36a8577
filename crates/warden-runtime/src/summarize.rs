//! Summarization trigger, queue and worker.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warden_core::{ChatMessage, ConversationId};
use warden_llm::prompts::{SUMMARY_MAX_TOKENS, summarization_context};
use warden_llm::{CompletionOptions, CompletionService, collect_text};
use warden_memory::ConversationStore;

use crate::errors::RuntimeError;

/// Whether the conversation should be summarized now that it holds
/// `turn_count` turns. A zero threshold disables summarization.
pub fn should_summarize(turn_count: u64, threshold: u64) -> bool {
    threshold != 0 && turn_count != 0 && turn_count % threshold == 0
}

/// Work item handed to the summarizer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizationRequest {
    /// Conversation to summarize.
    pub conversation_id: ConversationId,
    /// Prior retained turns followed by the latest exchange.
    pub messages: Vec<ChatMessage>,
}

/// Non-blocking sink for summarization work.
pub trait SummaryQueue: Send + Sync {
    /// Submit `request` without waiting.
    fn enqueue(&self, request: SummarizationRequest) -> Result<(), RuntimeError>;
}

/// [`SummaryQueue`] over a bounded tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelSummaryQueue {
    tx: mpsc::Sender<SummarizationRequest>,
}

impl ChannelSummaryQueue {
    /// Queue with room for `capacity` pending requests, plus its receiver.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<SummarizationRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl SummaryQueue for ChannelSummaryQueue {
    fn enqueue(&self, request: SummarizationRequest) -> Result<(), RuntimeError> {
        self.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RuntimeError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => RuntimeError::QueueClosed,
        })
    }
}

/// Background consumer that turns requests into stored summaries.
pub struct SummarizationWorker {
    completion: Arc<dyn CompletionService>,
    store: Arc<dyn ConversationStore>,
    options: CompletionOptions,
}

impl SummarizationWorker {
    /// Worker writing summaries generated by `completion` into `store`.
    pub fn new(completion: Arc<dyn CompletionService>, store: Arc<dyn ConversationStore>) -> Self {
        Self {
            completion,
            store,
            options: CompletionOptions::with_max_tokens(SUMMARY_MAX_TOKENS),
        }
    }

    /// Override generation options.
    #[must_use]
    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    /// Summarize one conversation and store the result.
    ///
    /// An empty reply leaves the previous summary in place.
    pub async fn process(&self, request: &SummarizationRequest) -> Result<Option<String>, RuntimeError> {
        let context = summarization_context(&request.messages);
        let tokens = self.completion.complete(&context, &self.options).await?;
        let summary = collect_text(tokens).await?;
        let summary = summary.trim();
        if summary.is_empty() {
            warn!(conversation_id = %request.conversation_id, "summarizer returned empty text");
            return Ok(None);
        }
        self.store.set_summary(&request.conversation_id, summary).await?;
        Ok(Some(summary.to_owned()))
    }

    /// Drain `rx` until it closes or `cancel` fires.
    pub fn spawn(
        self,
        mut rx: mpsc::Receiver<SummarizationRequest>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let request = tokio::select! {
                    () = cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(request) => request,
                        None => break,
                    },
                };
                match self.process(&request).await {
                    Ok(Some(_)) => {
                        metrics::counter!("summaries_total", "outcome" => "stored").increment(1);
                        info!(conversation_id = %request.conversation_id, "summary stored");
                    }
                    Ok(None) => {
                        metrics::counter!("summaries_total", "outcome" => "empty").increment(1);
                    }
                    Err(e) => {
                        metrics::counter!("summaries_total", "outcome" => "failed").increment(1);
                        warn!(conversation_id = %request.conversation_id, error = %e, "summarization failed");
                    }
                }
            }
            debug!("summarization worker stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use warden_llm::{MockCompletion, MockReply};
    use warden_memory::MemoryConversationStore;

    use super::*;

    fn request(n: u32) -> SummarizationRequest {
        SummarizationRequest {
            conversation_id: ConversationId::from_raw(format!("conv-{n}")),
            messages: vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
        }
    }

    // ── trigger ──

    #[test]
    fn trigger_fires_on_multiples() {
        assert!(!should_summarize(2, 10));
        assert!(should_summarize(10, 10));
        assert!(should_summarize(20, 10));
        assert!(!should_summarize(12, 10));
    }

    #[test]
    fn trigger_edge_cases() {
        assert!(!should_summarize(0, 10));
        assert!(!should_summarize(10, 0));
        assert!(should_summarize(2, 2));
    }

    // ── queue ──

    #[test]
    fn bounded_queue_reports_full_and_closed() {
        let (queue, rx) = ChannelSummaryQueue::bounded(1);
        queue.enqueue(request(1)).unwrap();
        assert!(matches!(queue.enqueue(request(2)), Err(RuntimeError::QueueFull)));
        drop(rx);
        assert!(matches!(queue.enqueue(request(3)), Err(RuntimeError::QueueClosed)));
    }

    #[test]
    fn request_payload_shape() {
        let json = serde_json::to_value(request(7)).unwrap();
        assert_eq!(json["conversationId"], "conv-7");
        assert_eq!(json["messages"][1]["role"], "assistant");
    }

    // ── worker ──

    #[tokio::test]
    async fn process_stores_summary_with_summarizer_prompt() {
        let completion = Arc::new(MockCompletion::with_tokens(["Greeting ", "exchanged."]));
        let store = Arc::new(MemoryConversationStore::default());
        let worker = SummarizationWorker::new(completion.clone(), store.clone());

        let stored = worker.process(&request(1)).await.unwrap();
        assert_eq!(stored.as_deref(), Some("Greeting exchanged."));
        let state = store.get_state(&ConversationId::from_raw("conv-1")).await.unwrap();
        assert_eq!(state.summary, "Greeting exchanged.");

        let call = &completion.calls()[0];
        assert_eq!(call.options.max_tokens, Some(256));
        assert!(call.messages[1].content.ends_with("user: hi\nassistant: hello"));
    }

    #[tokio::test]
    async fn failure_keeps_previous_summary() {
        let completion = Arc::new(MockCompletion::new(MockReply::Refuse("down".into())));
        let store = Arc::new(MemoryConversationStore::default());
        let id = ConversationId::from_raw("conv-1");
        store.set_summary(&id, "older").await.unwrap();

        let worker = SummarizationWorker::new(completion, store.clone());
        assert!(worker.process(&request(1)).await.is_err());
        assert_eq!(store.get_state(&id).await.unwrap().summary, "older");
    }

    #[tokio::test]
    async fn spawned_worker_drains_queue() {
        let completion = Arc::new(MockCompletion::with_tokens(["sum"]));
        let store = Arc::new(MemoryConversationStore::default());
        let (queue, rx) = ChannelSummaryQueue::bounded(8);
        let handle = SummarizationWorker::new(completion, store.clone())
            .spawn(rx, CancellationToken::new());

        queue.enqueue(request(1)).unwrap();
        queue.enqueue(request(2)).unwrap();
        drop(queue);
        handle.await.unwrap();

        for n in [1, 2] {
            let id = ConversationId::from_raw(format!("conv-{n}"));
            assert_eq!(store.get_state(&id).await.unwrap().summary, "sum");
        }
    }

    #[tokio::test]
    async fn cancel_stops_worker() {
        let completion = Arc::new(MockCompletion::with_tokens(["sum"]));
        let store = Arc::new(MemoryConversationStore::default());
        let (_queue, rx) = ChannelSummaryQueue::bounded(8);
        let cancel = CancellationToken::new();
        let handle = SummarizationWorker::new(completion, store).spawn(rx, cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
    }
}
