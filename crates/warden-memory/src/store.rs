//! Conversation store port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_core::{ConversationId, ConversationTurn};

use crate::errors::MemoryError;

/// Turns retained per conversation unless configured otherwise.
pub const DEFAULT_MAX_TURNS: usize = 20;

/// Snapshot of one conversation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    /// Most recent turns, oldest first.
    pub turns: Vec<ConversationTurn>,
    /// Running summary; empty until the first summarization lands.
    pub summary: String,
    /// Every turn ever appended, including ones no longer retained.
    pub turn_count: u64,
}

impl ConversationState {
    /// Summary, if one has been written.
    pub fn summary(&self) -> Option<&str> {
        if self.summary.is_empty() {
            None
        } else {
            Some(&self.summary)
        }
    }
}

/// Keyed conversation history.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Current state; unknown conversations are empty.
    async fn get_state(&self, id: &ConversationId) -> Result<ConversationState, MemoryError>;

    /// Append a turn, trimming to the retention window. Returns the new
    /// `turn_count`.
    async fn append_turn(
        &self,
        id: &ConversationId,
        turn: ConversationTurn,
    ) -> Result<u64, MemoryError>;

    /// Append a user turn and its reply as one unit, so no other append
    /// lands between them. Returns the new `turn_count`.
    async fn append_exchange(
        &self,
        id: &ConversationId,
        user: ConversationTurn,
        assistant: ConversationTurn,
    ) -> Result<u64, MemoryError>;

    /// Replace the running summary.
    async fn set_summary(&self, id: &ConversationId, summary: &str) -> Result<(), MemoryError>;

    /// Forget the conversation entirely.
    async fn clear(&self, id: &ConversationId) -> Result<(), MemoryError>;
}
