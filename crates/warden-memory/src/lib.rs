//! # warden-memory
//!
//! Conversation history behind the [`ConversationStore`] port.
//!
//! Each conversation keeps a bounded window of its most recent turns, a
//! running summary, and a count of every turn ever appended. The count keeps
//! growing after old turns fall out of the window; the summarization trigger
//! is computed from it.
//!
//! Two adapters:
//! - [`MemoryConversationStore`]: process-local, one async mutex per
//!   conversation.
//! - [`SqliteConversationStore`]: `conversations` + `conversation_turns`
//!   tables from `warden-store`.

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use errors::MemoryError;
pub use memory::MemoryConversationStore;
pub use sqlite::SqliteConversationStore;
pub use store::{ConversationState, ConversationStore, DEFAULT_MAX_TURNS};
