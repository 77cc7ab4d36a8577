//! Caller-side screening policy applied to an accepted message.

use serde::Serialize;

use crate::encoding::{detect_encoding_attack, has_excessive_special_chars};
use crate::validator::AcceptedMessage;

/// Why a message was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Score above the hard-reject threshold.
    Score,
    /// Encoded or escaped payload detected.
    EncodingAttack,
}

/// Why an allowed message was flagged for monitoring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    /// Score in the monitoring band.
    ElevatedScore,
    /// Unusually high share of special characters.
    SpecialCharacters,
}

/// Screening outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScreeningDecision {
    /// Let the message through.
    Allow,
    /// Let the message through and record it.
    Flag(Vec<FlagReason>),
    /// Refuse the message.
    Reject(RejectReason),
}

/// Thresholds for turning a threat assessment into a decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScreeningPolicy {
    /// Scores strictly above this are rejected.
    pub reject_above: u8,
    /// Scores strictly above this (and not rejected) are flagged.
    pub flag_above: u8,
    /// Reject encoded payloads regardless of score.
    pub reject_encoding_attacks: bool,
}

impl Default for ScreeningPolicy {
    fn default() -> Self {
        Self {
            reject_above: 80,
            flag_above: 50,
            reject_encoding_attacks: true,
        }
    }
}

impl ScreeningPolicy {
    /// Decide what to do with `message`.
    pub fn evaluate(&self, message: &AcceptedMessage) -> ScreeningDecision {
        if self.reject_encoding_attacks && detect_encoding_attack(&message.sanitized) {
            return ScreeningDecision::Reject(RejectReason::EncodingAttack);
        }
        if message.score > self.reject_above {
            return ScreeningDecision::Reject(RejectReason::Score);
        }

        let mut flags = Vec::new();
        if message.score > self.flag_above {
            flags.push(FlagReason::ElevatedScore);
        }
        if has_excessive_special_chars(&message.sanitized) {
            flags.push(FlagReason::SpecialCharacters);
        }

        if flags.is_empty() {
            ScreeningDecision::Allow
        } else {
            ScreeningDecision::Flag(flags)
        }
    }
}
