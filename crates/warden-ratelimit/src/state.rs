//! Per-identity window state.

use serde::{Deserialize, Serialize};

use crate::window::Window;

/// Three ascending lists of admitted-request timestamps (ms).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindowState {
    /// Admissions within the trailing minute.
    pub minute: Vec<i64>,
    /// Admissions within the trailing hour.
    pub hour: Vec<i64>,
    /// Admissions within the trailing day.
    pub day: Vec<i64>,
}

/// Number of admissions per window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WindowCounts {
    /// Trailing minute.
    pub minute: usize,
    /// Trailing hour.
    pub hour: usize,
    /// Trailing day.
    pub day: usize,
}

impl WindowCounts {
    /// Count for one window.
    pub fn get(&self, window: Window) -> usize {
        match window {
            Window::Minute => self.minute,
            Window::Hour => self.hour,
            Window::Day => self.day,
        }
    }
}

impl RateWindowState {
    /// Timestamps for one window.
    pub fn entries(&self, window: Window) -> &[i64] {
        match window {
            Window::Minute => &self.minute,
            Window::Hour => &self.hour,
            Window::Day => &self.day,
        }
    }

    fn entries_mut(&mut self, window: Window) -> &mut Vec<i64> {
        match window {
            Window::Minute => &mut self.minute,
            Window::Hour => &mut self.hour,
            Window::Day => &mut self.day,
        }
    }

    /// Drop entries outside each window. An entry `ts` is kept iff
    /// `ts > now - window`.
    pub fn prune(&mut self, now_ms: i64) {
        for window in Window::ALL {
            let cutoff = now_ms - window.duration_ms();
            self.entries_mut(window).retain(|&ts| ts > cutoff);
        }
    }

    /// Append an admission to every window, keeping lists ascending.
    pub fn record(&mut self, now_ms: i64) {
        for window in Window::ALL {
            let entries = self.entries_mut(window);
            let at = entries.partition_point(|&ts| ts <= now_ms);
            entries.insert(at, now_ms);
        }
    }

    /// Current counts.
    pub fn counts(&self) -> WindowCounts {
        WindowCounts {
            minute: self.minute.len(),
            hour: self.hour.len(),
            day: self.day.len(),
        }
    }
}
