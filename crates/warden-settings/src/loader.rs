//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WardenSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `WARDEN_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::WardenSettings;

/// Resolve the default settings file (`~/.warden/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home)
        .join(format!(".{}", warden_core::constants::NAME))
        .join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WardenSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<WardenSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<WardenSettings> {
    let defaults = serde_json::to_value(WardenSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut WardenSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning and the file/default value is
/// kept. Empty strings count as unset.
pub fn apply_overrides_from<F>(settings: &mut WardenSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.u64_range("WARDEN_PORT", 1, 65_535) {
        settings.server.port = v as u16;
    }
    if let Some(v) = env.string("WARDEN_HOST") {
        settings.server.host = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("WARDEN_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("WARDEN_LOG_JSON") {
        settings.logging.json = v;
    }

    // ── Rate limits ─────────────────────────────────────────────────
    if let Some(v) = env.u64_range("WARDEN_RATE_PER_MINUTE", 1, 1_000_000) {
        settings.rate_limit.per_minute = v as usize;
    }
    if let Some(v) = env.u64_range("WARDEN_RATE_PER_HOUR", 1, 1_000_000) {
        settings.rate_limit.per_hour = v as usize;
    }
    if let Some(v) = env.u64_range("WARDEN_RATE_PER_DAY", 1, 10_000_000) {
        settings.rate_limit.per_day = v as usize;
    }

    // ── Conversation ────────────────────────────────────────────────
    if let Some(v) = env.u64_range("WARDEN_SUMMARIZE_THRESHOLD", 1, 10_000) {
        settings.conversation.summarize_threshold = v;
    }

    // ── Completion backend ──────────────────────────────────────────
    if let Some(v) = env.string("WARDEN_COMPLETION_URL") {
        settings.completion.base_url = v;
    }
    if let Some(v) = env.string("WARDEN_COMPLETION_MODEL") {
        settings.completion.model = v;
    }
    if let Some(v) = env.string("WARDEN_COMPLETION_API_KEY") {
        settings.completion.api_key = Some(v);
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = env.string("WARDEN_DATABASE") {
        settings.storage.database_path = Some(v);
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env readers ─────────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = self.string(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64_range(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, min, max, "invalid integer env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8787, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.server.port, 8787);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"rateLimit": {"perMinute": 3}, "conversation": {"summarizeThreshold": 4}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.rate_limit.per_minute, 3);
        assert_eq!(settings.rate_limit.per_hour, 100);
        assert_eq!(settings.conversation.summarize_threshold, 4);
        assert_eq!(settings.conversation.max_turns, 20);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_file_layer(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_invalid_combination() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"conversation": {"summarizeThreshold": 0}}"#).unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::InvalidValue(_)));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = WardenSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("WARDEN_PORT", "9000"),
                ("WARDEN_HOST", "127.0.0.1"),
                ("WARDEN_LOG_JSON", "yes"),
                ("WARDEN_RATE_PER_MINUTE", "5"),
                ("WARDEN_RATE_PER_HOUR", "50"),
                ("WARDEN_RATE_PER_DAY", "250"),
                ("WARDEN_SUMMARIZE_THRESHOLD", "6"),
                ("WARDEN_COMPLETION_URL", "http://llm.internal/v1"),
                ("WARDEN_COMPLETION_MODEL", "small"),
                ("WARDEN_COMPLETION_API_KEY", "k"),
                ("WARDEN_DATABASE", "/var/lib/warden.db"),
            ]),
        );
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert!(settings.logging.json);
        assert_eq!(settings.rate_limit.per_minute, 5);
        assert_eq!(settings.rate_limit.per_hour, 50);
        assert_eq!(settings.rate_limit.per_day, 250);
        assert_eq!(settings.conversation.summarize_threshold, 6);
        assert_eq!(settings.completion.base_url, "http://llm.internal/v1");
        assert_eq!(settings.completion.model, "small");
        assert_eq!(settings.completion.api_key.as_deref(), Some("k"));
        assert_eq!(
            settings.storage.database_path.as_deref(),
            Some("/var/lib/warden.db")
        );
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = WardenSettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("WARDEN_PORT", "0"),
                ("WARDEN_LOG_JSON", "maybe"),
                ("WARDEN_RATE_PER_MINUTE", "-3"),
                ("WARDEN_SUMMARIZE_THRESHOLD", "0"),
                ("WARDEN_HOST", ""),
            ]),
        );
        assert_eq!(settings.server.port, 8787);
        assert!(!settings.logging.json);
        assert_eq!(settings.rate_limit.per_minute, 10);
        assert_eq!(settings.conversation.summarize_threshold, 10);
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "1", "YES", "On"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "no", "OFF"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("10", 1, 10), Some(10));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("0", 1, 10), None);
        assert_eq!(parse_u64_range("abc", 1, 10), None);
    }
}
