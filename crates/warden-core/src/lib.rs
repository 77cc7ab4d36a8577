//! # warden-core
//!
//! Foundation types shared by every Warden crate:
//!
//! - **Identities**: `ClientIdentity` (rate-limit partition key) and
//!   `ConversationId` as newtypes
//! - **Turns**: `ConversationTurn`, `Role`, and the `ChatMessage` context shape
//! - **Errors**: `GatewayError` taxonomy with stable reason codes
//! - **Clock**: millisecond clock port with system and manual implementations
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod clock;
pub mod constants;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{ErrorCategory, GatewayError};
pub use ids::{ClientIdentity, ConversationId};
pub use messages::{ChatMessage, ChatRole, ConversationTurn, Role};
