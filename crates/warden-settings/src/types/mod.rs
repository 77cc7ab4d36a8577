//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file only needs the keys it changes.

mod completion;
mod guard;
mod server;

pub use completion::*;
pub use guard::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000 },
///   "rateLimit": { "perMinute": 20 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WardenSettings {
    /// HTTP listener.
    pub server: ServerSettings,
    /// Log output.
    pub logging: LoggingSettings,
    /// Persistence backend.
    pub storage: StorageSettings,
    /// Admission windows.
    pub rate_limit: RateLimitSettings,
    /// Input screening thresholds.
    pub screening: ScreeningSettings,
    /// History retention and summarization trigger.
    pub conversation: ConversationSettings,
    /// Upstream completion backend.
    pub completion: CompletionSettings,
}

impl WardenSettings {
    /// Reject combinations that would make the gateway misbehave.
    pub fn validate(&self) -> crate::Result<()> {
        if self.conversation.summarize_threshold == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "conversation.summarizeThreshold must be greater than zero".into(),
            ));
        }
        if self.screening.flag_above > self.screening.reject_above {
            return Err(crate::SettingsError::InvalidValue(format!(
                "screening.flagAbove ({}) exceeds screening.rejectAbove ({})",
                self.screening.flag_above, self.screening.reject_above
            )));
        }
        let rl = &self.rate_limit;
        if rl.per_minute == 0 || rl.per_hour == 0 || rl.per_day == 0 {
            return Err(crate::SettingsError::InvalidValue(
                "rate limits must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
