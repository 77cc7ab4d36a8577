//! # warden-server
//!
//! Axum HTTP surface over [`warden_runtime::ChatGateway`].
//!
//! - `POST /api/chat`: event stream of tokens
//! - `GET|DELETE /api/conversations/{id}`: conversation state
//! - `GET /api/rate-limit/stats`: caller's admission usage
//! - `GET /health`, `GET /metrics`
//!
//! Errors raised before streaming become `{error, code, retryAfter?}` JSON
//! bodies; 429 responses also carry `Retry-After`.

#![deny(unsafe_code)]

pub mod error;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod shutdown;

pub use error::ApiError;
pub use identity::{Caller, client_identity};
pub use server::{AppState, WardenServer};
pub use shutdown::ShutdownCoordinator;
