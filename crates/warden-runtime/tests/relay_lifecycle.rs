//! End-to-end relay behavior over the in-memory store and channel queue.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use warden_core::{ClientIdentity, ConversationId, ConversationTurn, ManualClock, Role};
use warden_llm::{CompletionOptions, CompletionService, MockCompletion, MockReply, TokenStream};
use warden_memory::{ConversationStore, MemoryConversationStore};
use warden_runtime::{
    ChannelSummaryQueue, RelayContext, RelayOutcome, StreamFrame, StreamOrchestrator,
    SummarizationRequest,
};

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

struct Fixture {
    store: Arc<MemoryConversationStore>,
    orchestrator: StreamOrchestrator,
    summaries: mpsc::Receiver<SummarizationRequest>,
}

fn fixture(threshold: u64) -> Fixture {
    let store = Arc::new(MemoryConversationStore::default());
    let (queue, summaries) = ChannelSummaryQueue::bounded(16);
    let orchestrator = StreamOrchestrator::new(
        store.clone(),
        Arc::new(queue),
        Arc::new(ManualClock::new(1_700_000_000_000)),
        threshold,
    );
    Fixture {
        store,
        orchestrator,
        summaries,
    }
}

fn conv() -> ConversationId {
    ConversationId::from_raw("conv-42")
}

async fn seed_turns(store: &MemoryConversationStore, n: usize) -> Vec<ConversationTurn> {
    for i in 0..n {
        let turn = if i % 2 == 0 {
            ConversationTurn::user(format!("q{i}"), i as i64)
        } else {
            ConversationTurn::assistant(format!("a{i}"), i as i64)
        };
        let _ = store.append_turn(&conv(), turn).await.unwrap();
    }
    store.get_state(&conv()).await.unwrap().turns
}

fn context(prior_turns: Vec<ConversationTurn>) -> RelayContext {
    RelayContext {
        client_id: ClientIdentity::from_raw("203.0.113.9"),
        conversation_id: conv(),
        user_message: "hello?".into(),
        received_at: 1_700_000_000_000,
        prior_turns,
    }
}

async fn tokens(mock: &MockCompletion) -> TokenStream {
    mock.complete(&[], &CompletionOptions::default()).await.unwrap()
}

async fn decode_all(rx: mpsc::Receiver<Bytes>) -> Vec<StreamFrame> {
    tokio_stream::wrappers::ReceiverStream::new(rx)
        .map(|b| StreamFrame::decode(&b).unwrap())
        .collect()
        .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Complete
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tokens_then_done_then_persisted() {
    let fx = fixture(10);
    let mock = MockCompletion::with_tokens(["Hel", "lo", " world"]);
    let (tx, rx) = mpsc::channel(8);

    let outcome = fx.orchestrator.drive(tokens(&mock).await, context(vec![]), tx).await;

    assert_eq!(
        decode_all(rx).await,
        vec![
            StreamFrame::Token("Hel".into()),
            StreamFrame::Token("lo".into()),
            StreamFrame::Token(" world".into()),
            StreamFrame::Done,
        ]
    );
    assert_matches!(outcome, RelayOutcome::Complete { ref text, tokens: 3, turn_count: 2, summarized: false } if text == "Hello world");

    let state = fx.store.get_state(&conv()).await.unwrap();
    assert_eq!(state.turns.len(), 2);
    assert_eq!(state.turns[0].role, Role::User);
    assert_eq!(state.turns[0].content, "hello?");
    assert_eq!(state.turns[1].role, Role::Assistant);
    assert_eq!(state.turns[1].content, "Hello world");
}

#[tokio::test]
async fn spawned_relay_delivers_frames() {
    let fx = fixture(10);
    let mock = MockCompletion::with_tokens(["a", "b"]);
    let stream = fx.orchestrator.relay(tokens(&mock).await, context(vec![]));
    let frames: Vec<StreamFrame> = stream.map(|b| StreamFrame::decode(&b).unwrap()).collect().await;
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[2], StreamFrame::Done);
}

// ─────────────────────────────────────────────────────────────────────────────
// Summarization trigger
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reaching_threshold_enqueues_exactly_once() {
    let mut fx = fixture(10);
    let prior = seed_turns(&fx.store, 8).await;
    let mock = MockCompletion::with_tokens(["fine"]);
    let (tx, _rx) = mpsc::channel(8);

    let outcome = fx.orchestrator.drive(tokens(&mock).await, context(prior), tx).await;
    assert_matches!(outcome, RelayOutcome::Complete { turn_count: 10, summarized: true, .. });

    let request = fx.summaries.try_recv().unwrap();
    assert_eq!(request.conversation_id, conv());
    assert_eq!(request.messages.len(), 10);
    assert_eq!(request.messages[8].content, "hello?");
    assert_eq!(request.messages[9].content, "fine");
    assert!(fx.summaries.try_recv().is_err());
}

#[tokio::test]
async fn off_threshold_enqueues_nothing() {
    let mut fx = fixture(10);
    let prior = seed_turns(&fx.store, 6).await;
    let mock = MockCompletion::with_tokens(["fine"]);
    let (tx, _rx) = mpsc::channel(8);

    let outcome = fx.orchestrator.drive(tokens(&mock).await, context(prior), tx).await;
    assert_matches!(outcome, RelayOutcome::Complete { turn_count: 8, summarized: false, .. });
    assert!(fx.summaries.try_recv().is_err());
}

#[tokio::test]
async fn trigger_uses_total_count_not_retained_window() {
    let mut fx = fixture(10);
    // 28 appended, only 20 retained.
    let prior = seed_turns(&fx.store, 28).await;
    assert_eq!(prior.len(), 20);
    let mock = MockCompletion::with_tokens(["x"]);
    let (tx, _rx) = mpsc::channel(8);

    let outcome = fx.orchestrator.drive(tokens(&mock).await, context(prior), tx).await;
    assert_matches!(outcome, RelayOutcome::Complete { turn_count: 30, summarized: true, .. });
    assert_eq!(fx.summaries.try_recv().unwrap().messages.len(), 22);
}

// ─────────────────────────────────────────────────────────────────────────────
// Errored
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn source_error_sends_error_frame_and_persists_nothing() {
    let mut fx = fixture(2);
    let mock = MockCompletion::new(MockReply::FailAfter {
        tokens: vec!["par".into(), "tial".into()],
        message: "backend reset".into(),
    });
    let (tx, rx) = mpsc::channel(8);

    let outcome = fx.orchestrator.drive(tokens(&mock).await, context(vec![]), tx).await;
    assert_matches!(outcome, RelayOutcome::Errored(ref m) if m.contains("backend reset"));

    let frames = decode_all(rx).await;
    assert_eq!(frames.len(), 3);
    assert_matches!(&frames[2], StreamFrame::Error(m) if m.contains("backend reset"));
    assert!(!frames.contains(&StreamFrame::Done));

    let state = fx.store.get_state(&conv()).await.unwrap();
    assert!(state.turns.is_empty());
    assert_eq!(state.turn_count, 0);
    assert!(fx.summaries.try_recv().is_err());
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancelled
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn early_disconnect_persists_nothing() {
    let fx = fixture(10);
    let mock = MockCompletion::with_tokens(["one", "two", "three", "four"])
        .token_delay(Duration::from_millis(50));
    let (tx, mut rx) = mpsc::channel(8);

    let orchestrator = fx.orchestrator.clone();
    let source = tokens(&mock).await;
    let relay = tokio::spawn(async move { orchestrator.drive(source, context(vec![]), tx).await });

    let first = rx.recv().await.unwrap();
    assert_eq!(StreamFrame::decode(&first), Some(StreamFrame::Token("one".into())));
    drop(rx);

    let outcome = relay.await.unwrap();
    assert_eq!(outcome, RelayOutcome::Cancelled);

    let state = fx.store.get_state(&conv()).await.unwrap();
    assert!(state.turns.iter().all(|t| t.role != Role::Assistant));
    assert!(state.turns.is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_noticed_while_waiting_for_tokens() {
    let fx = fixture(10);
    let source: TokenStream = Box::pin(async_stream::stream! {
        yield Ok("first".to_string());
        tokio::time::sleep(Duration::from_secs(3_600)).await;
        yield Ok("never".to_string());
    });
    let (tx, mut rx) = mpsc::channel(8);

    let orchestrator = fx.orchestrator.clone();
    let relay = tokio::spawn(async move { orchestrator.drive(source, context(vec![]), tx).await });

    let _ = rx.recv().await.unwrap();
    drop(rx);

    let outcome = tokio::time::timeout(Duration::from_secs(1), relay)
        .await
        .expect("relay should stop without waiting for the next token")
        .unwrap();
    assert_eq!(outcome, RelayOutcome::Cancelled);
}
