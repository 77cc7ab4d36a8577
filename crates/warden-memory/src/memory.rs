//! In-process conversation store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use warden_core::{ConversationId, ConversationTurn};

use crate::errors::MemoryError;
use crate::store::{ConversationState, ConversationStore, DEFAULT_MAX_TURNS};

/// Conversation store held in memory.
///
/// Each conversation sits behind its own async mutex, so appends to one
/// conversation are serialized while others proceed.
#[derive(Debug)]
pub struct MemoryConversationStore {
    conversations: DashMap<ConversationId, Arc<Mutex<ConversationState>>>,
    max_turns: usize,
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl MemoryConversationStore {
    /// Store retaining at most `max_turns` turns per conversation.
    pub fn new(max_turns: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            max_turns: max_turns.max(1),
        }
    }

    fn slot(&self, id: &ConversationId) -> Arc<Mutex<ConversationState>> {
        self.conversations.entry(id.clone()).or_default().clone()
    }

    fn push<const N: usize>(&self, state: &mut ConversationState, turns: [ConversationTurn; N]) -> u64 {
        state.turns.extend(turns);
        state.turn_count += N as u64;
        if state.turns.len() > self.max_turns {
            let excess = state.turns.len() - self.max_turns;
            let _ = state.turns.drain(..excess);
        }
        state.turn_count
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn get_state(&self, id: &ConversationId) -> Result<ConversationState, MemoryError> {
        let Some(slot) = self.conversations.get(id).map(|entry| entry.value().clone()) else {
            return Ok(ConversationState::default());
        };
        let state = slot.lock().await;
        Ok(state.clone())
    }

    async fn append_turn(
        &self,
        id: &ConversationId,
        turn: ConversationTurn,
    ) -> Result<u64, MemoryError> {
        let slot = self.slot(id);
        let mut state = slot.lock().await;
        Ok(self.push(&mut state, [turn]))
    }

    async fn append_exchange(
        &self,
        id: &ConversationId,
        user: ConversationTurn,
        assistant: ConversationTurn,
    ) -> Result<u64, MemoryError> {
        let slot = self.slot(id);
        let mut state = slot.lock().await;
        Ok(self.push(&mut state, [user, assistant]))
    }

    async fn set_summary(&self, id: &ConversationId, summary: &str) -> Result<(), MemoryError> {
        let slot = self.slot(id);
        slot.lock().await.summary = summary.to_owned();
        Ok(())
    }

    async fn clear(&self, id: &ConversationId) -> Result<(), MemoryError> {
        let _ = self.conversations.remove(id);
        Ok(())
    }
}
