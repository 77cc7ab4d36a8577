//! The three admission windows.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// A trailing time window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// Trailing 60 seconds.
    Minute,
    /// Trailing hour.
    Hour,
    /// Trailing day.
    Day,
}

impl Window {
    /// All windows, in the order they are checked.
    pub const ALL: [Self; 3] = [Self::Minute, Self::Hour, Self::Day];

    /// Window length.
    pub fn duration(self) -> Duration {
        match self {
            Self::Minute => Duration::from_secs(60),
            Self::Hour => Duration::from_secs(3_600),
            Self::Day => Duration::from_secs(86_400),
        }
    }

    /// Window length in milliseconds.
    pub fn duration_ms(self) -> i64 {
        match self {
            Self::Minute => 60_000,
            Self::Hour => 3_600_000,
            Self::Day => 86_400_000,
        }
    }

    /// Persisted name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
