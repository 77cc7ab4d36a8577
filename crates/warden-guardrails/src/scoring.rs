//! Threat score computation.
//!
//! Score is 0 when no signature matches. Otherwise it is the sum of matched
//! signature weights plus bounded secondary increments, capped at 100:
//!
//! - +5 per distinct injection keyword present
//! - +20 when more than two delimiter runs appear
//! - +15 per role marker

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::signatures::SignatureSet;

/// Upper bound of the score.
pub const MAX_SCORE: u8 = 100;

const INJECTION_KEYWORDS: &[&str] = &["ignore", "disregard", "system", "prompt", "instructions"];
const KEYWORD_WEIGHT: u32 = 5;
const DELIMITER_BONUS: u32 = 20;
const DELIMITER_THRESHOLD: usize = 2;
const ROLE_MARKER_WEIGHT: u32 = 15;

static DELIMITER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"---|"""|```|\*\*\*"#).expect("valid regex"));

static ROLE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[?(system|user|assistant)\]?:").expect("valid regex"));

/// Result of scoring one text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreatAssessment {
    /// Bounded score in `0..=100`.
    pub score: u8,
    /// Ids of matched signatures, in table order.
    pub matched_patterns: Vec<String>,
}

impl ThreatAssessment {
    /// At least one signature matched.
    pub fn suspicious(&self) -> bool {
        !self.matched_patterns.is_empty()
    }
}

/// Score `text` against `signatures`.
pub fn assess(text: &str, signatures: &SignatureSet) -> ThreatAssessment {
    let mut base = 0u32;
    let mut matched_patterns = Vec::new();
    for signature in signatures.matches(text) {
        base = base.saturating_add(signature.weight);
        matched_patterns.push(signature.id.clone());
    }

    if matched_patterns.is_empty() {
        return ThreatAssessment::default();
    }

    let total = base
        .saturating_add(keyword_bonus(text))
        .saturating_add(delimiter_bonus(text))
        .saturating_add(role_marker_bonus(text));

    ThreatAssessment {
        score: total.min(u32::from(MAX_SCORE)) as u8,
        matched_patterns,
    }
}

fn keyword_bonus(text: &str) -> u32 {
    let lower = text.to_lowercase();
    let present = INJECTION_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .count();
    present as u32 * KEYWORD_WEIGHT
}

fn delimiter_bonus(text: &str) -> u32 {
    if DELIMITER_RE.find_iter(text).count() > DELIMITER_THRESHOLD {
        DELIMITER_BONUS
    } else {
        0
    }
}

fn role_marker_bonus(text: &str) -> u32 {
    let markers = ROLE_MARKER_RE.find_iter(text).count();
    markers as u32 * ROLE_MARKER_WEIGHT
}
