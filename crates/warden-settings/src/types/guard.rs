//! Admission, screening and conversation settings.

use serde::{Deserialize, Serialize};

/// Per-identity request limits for each sliding window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSettings {
    /// Requests per trailing 60 seconds.
    pub per_minute: usize,
    /// Requests per trailing hour.
    pub per_hour: usize,
    /// Requests per trailing day.
    pub per_day: usize,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_minute: 10,
            per_hour: 100,
            per_day: 500,
        }
    }
}

/// Content screening thresholds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreeningSettings {
    /// Maximum message length in characters.
    pub max_message_chars: usize,
    /// Scores strictly above this are rejected.
    pub reject_above: u8,
    /// Scores strictly above this (and not rejected) are flagged.
    pub flag_above: u8,
    /// Reject messages that look like escaped or encoded payloads.
    pub reject_encoding_attacks: bool,
}

impl Default for ScreeningSettings {
    fn default() -> Self {
        Self {
            max_message_chars: 4000,
            reject_above: 80,
            flag_above: 50,
            reject_encoding_attacks: true,
        }
    }
}

/// History retention and summarization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationSettings {
    /// Turns kept per conversation.
    pub max_turns: usize,
    /// Summarize whenever the turn count reaches a multiple of this.
    pub summarize_threshold: u64,
    /// Capacity of the summarization queue.
    pub summary_queue_capacity: usize,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            max_turns: 20,
            summarize_threshold: 10,
            summary_queue_capacity: 64,
        }
    }
}
