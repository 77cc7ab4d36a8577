//! # warden-guardrails
//!
//! Pure, stateless screening of chat input.
//!
//! - [`validate_message`]: shape, length and trim checks followed by threat
//!   scoring against the ordered [`SignatureSet`]
//! - [`validate_conversation_id`]: strict `conv-<digits>` format check
//! - [`detect_encoding_attack`] / [`has_excessive_special_chars`]: obfuscation
//!   heuristics independent of the score
//! - [`ScreeningPolicy`]: caller-side decision (reject / flag / allow)
//!
//! Scoring is heuristic defense-in-depth. False negatives are expected; the
//! high hard-reject threshold bounds false positives.

#![deny(unsafe_code)]

pub mod encoding;
pub mod errors;
pub mod policy;
pub mod scoring;
pub mod signatures;
pub mod validator;

pub use encoding::{detect_encoding_attack, has_excessive_special_chars};
pub use errors::{GuardrailError, ValidationError};
pub use policy::{FlagReason, RejectReason, ScreeningDecision, ScreeningPolicy};
pub use scoring::{ThreatAssessment, assess};
pub use signatures::{Signature, SignatureSet, SignatureSpec, ThreatCategory};
pub use validator::{
    AcceptedMessage, MessageVerdict, Validator, validate_conversation_id, validate_message,
};
