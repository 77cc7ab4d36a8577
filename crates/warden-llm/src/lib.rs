//! # warden-llm
//!
//! Completion backend abstraction for the gateway.
//!
//! - [`CompletionService`]: trait returning a boxed stream of text tokens
//! - [`OpenAiCompatClient`]: `POST {base}/chat/completions` with `stream: true`,
//!   parsed from SSE
//! - [`MockCompletion`]: scripted replies for tests and offline runs
//! - [`prompts`]: assistant and summarizer prompts and context assembly

#![deny(unsafe_code)]

pub mod errors;
pub mod mock;
pub mod openai;
pub mod prompts;
pub mod service;
pub mod sse;

pub use errors::CompletionError;
pub use mock::{MockCompletion, MockReply};
pub use openai::{OpenAiCompatClient, OpenAiCompatConfig};
pub use service::{CompletionOptions, CompletionService, TokenStream, collect_text};
