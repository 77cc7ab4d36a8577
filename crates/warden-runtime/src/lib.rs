//! # warden-runtime
//!
//! Request pipeline for the chat gateway.
//!
//! - **Gateway** ([`ChatGateway`]): admission → validation → screening →
//!   context → completion → relay
//! - **Relay** ([`StreamOrchestrator`]): forwards tokens as SSE frames while
//!   accumulating the reply; persists both turns once the stream completes,
//!   evaluates the summarization trigger, then emits the terminal frame
//! - **Summarization** ([`SummaryQueue`], [`SummarizationWorker`]): bounded
//!   hand-off from the relay to a background worker that writes summaries
//!   back to the conversation store
//!
//! ## Ordering
//!
//! Within one relay: every token frame precedes persistence, persistence
//! precedes the trigger check, and the trigger check precedes `[DONE]`. A
//! relay whose caller disconnects, or whose token source fails, persists
//! nothing.

#![deny(unsafe_code)]

pub mod errors;
pub mod framing;
pub mod gateway;
pub mod relay;
pub mod summarize;

pub use errors::RuntimeError;
pub use framing::StreamFrame;
pub use gateway::{ChatGateway, GatewayConfig, GatewayDeps};
pub use relay::{RelayContext, RelayOutcome, StreamOrchestrator};
pub use summarize::{
    ChannelSummaryQueue, SummarizationRequest, SummarizationWorker, SummaryQueue, should_summarize,
};
