//! # warden-settings
//!
//! Layered configuration for the Warden gateway.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WardenSettings::default()`]
//! 2. **User file**: `~/.warden/settings.json` or an explicit path, deep-merged
//!    over the defaults
//! 3. **Environment variables**: `WARDEN_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<WardenSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// Loads from the default path on first access and falls back to compiled
/// defaults if the file cannot be read.
pub fn get_settings() -> &'static WardenSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Install settings loaded elsewhere (e.g. from `--config`).
///
/// Returns the value back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: WardenSettings) -> std::result::Result<(), WardenSettings> {
    SETTINGS.set(settings)
}
