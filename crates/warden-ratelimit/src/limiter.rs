//! Admission controller.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, instrument};
use warden_core::{ClientIdentity, Clock};

use crate::errors::RateLimitError;
use crate::locks::KeyedLocks;
use crate::state::{RateWindowState, WindowCounts};
use crate::store::RateStore;
use crate::window::Window;

/// Per-window admission limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RateLimits {
    /// Admissions per trailing minute.
    pub minute: usize,
    /// Admissions per trailing hour.
    pub hour: usize,
    /// Admissions per trailing day.
    pub day: usize,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            minute: 10,
            hour: 100,
            day: 500,
        }
    }
}

impl RateLimits {
    /// Limit for one window.
    pub fn limit(&self, window: Window) -> usize {
        match window {
            Window::Minute => self.minute,
            Window::Hour => self.hour,
            Window::Day => self.day,
        }
    }
}

/// Outcome of an admission check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdmissionDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// First window found at its limit.
    pub exceeded: Option<Window>,
    /// Time until the exceeded window frees a slot.
    pub retry_after: Option<Duration>,
}

impl AdmissionDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            exceeded: None,
            retry_after: None,
        }
    }

    fn reject(window: Window, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            exceeded: Some(window),
            retry_after: Some(retry_after),
        }
    }
}

/// Read-only view of an identity's usage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateStats {
    /// Admissions inside each window right now.
    pub counts_per_window: WindowCounts,
    /// Configured limits.
    pub limits: RateLimits,
}

/// Multi-window sliding limiter keyed by client identity.
pub struct AdmissionController {
    store: Arc<dyn RateStore>,
    limits: RateLimits,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<ClientIdentity>,
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("limits", &self.limits)
            .field("tracked_locks", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl AdmissionController {
    /// Controller over `store` with the given limits.
    pub fn new(store: Arc<dyn RateStore>, limits: RateLimits, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            limits,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    /// Configured limits.
    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    /// Decide whether `identity` may make another request, recording it if so.
    ///
    /// Rejections leave stored state untouched. Store failures are returned to
    /// the caller, which must treat them as a rejection.
    #[instrument(skip(self, identity), fields(identity = %identity))]
    pub async fn check(
        &self,
        identity: &ClientIdentity,
    ) -> Result<AdmissionDecision, RateLimitError> {
        let _guard = self.locks.lock(identity).await;
        let now = self.clock.now_ms();

        let mut state = self.store.load(identity).await?;
        state.prune(now);

        if let Some((window, retry_after)) = self.first_exceeded(&state, now) {
            debug!(%window, retry_after_secs = retry_after.as_secs(), "admission rejected");
            metrics::counter!("admission_decisions_total", "outcome" => "rejected", "window" => window.as_str())
                .increment(1);
            return Ok(AdmissionDecision::reject(window, retry_after));
        }

        state.record(now);
        self.store.save(identity, &state, now).await?;
        metrics::counter!("admission_decisions_total", "outcome" => "allowed").increment(1);
        Ok(AdmissionDecision::allow())
    }

    /// Current usage for `identity`. Never records anything.
    pub async fn stats(&self, identity: &ClientIdentity) -> Result<RateStats, RateLimitError> {
        let now = self.clock.now_ms();
        let mut state = self.store.load(identity).await?;
        state.prune(now);
        Ok(RateStats {
            counts_per_window: state.counts(),
            limits: self.limits,
        })
    }

    fn first_exceeded(&self, state: &RateWindowState, now: i64) -> Option<(Window, Duration)> {
        Window::ALL.into_iter().find_map(|window| {
            let limit = self.limits.limit(window);
            let entries = state.entries(window);
            if entries.len() < limit {
                return None;
            }
            // Entry whose expiry brings the count back under the limit.
            let pivot = entries.get(entries.len() - limit).copied().unwrap_or(now);
            Some((window, retry_after(pivot, window, now)))
        })
    }
}

/// Time until `ts` leaves `window`, rounded up to whole seconds, at least 1 s.
fn retry_after(ts: i64, window: Window, now: i64) -> Duration {
    let remaining_ms = (ts + window.duration_ms() - now).max(0);
    let secs = (remaining_ms + 999) / 1_000;
    Duration::from_secs(secs.max(1) as u64)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
