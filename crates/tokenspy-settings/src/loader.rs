//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TokenSpySettings::default()`]
//! 2. If the settings file exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokenspy_core::logging::{LogFormat, LogLevel};
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::TokenSpySettings;

/// Resolve the path to the settings file (`~/.tokenspy/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tokenspy").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TokenSpySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or an out-of-range value, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<TokenSpySettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Defaults merged with the settings file, without env overrides.
fn load_file_layer(path: &Path) -> Result<TokenSpySettings> {
    let defaults = serde_json::to_value(TokenSpySettings::default())?;

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

/// Apply `TOKENSPY_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut TokenSpySettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` as the variable source.
///
/// Invalid values are logged and ignored, falling back to file/default.
pub fn apply_overrides_from<F>(settings: &mut TokenSpySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("TOKENSPY_DB_PATH") {
        settings.storage.db_path = v;
    }
    if let Some(v) = read("TOKENSPY_LOG_LEVEL") {
        match LogLevel::parse(&v) {
            Some(level) => settings.logging.level = level,
            None => warn!(key = "TOKENSPY_LOG_LEVEL", value = %v, "invalid log level env var, ignoring"),
        }
    }
    if let Some(v) = read("TOKENSPY_LOG_FORMAT") {
        match LogFormat::parse(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "TOKENSPY_LOG_FORMAT", value = %v, "invalid log format env var, ignoring"),
        }
    }
    if let Some(v) = read("TOKENSPY_CHAR_LIMIT") {
        if let Some(n) = checked("TOKENSPY_CHAR_LIMIT", &v, parse_u64_range(&v, 1, 100_000_000)) {
            settings.session.char_limit = n;
        }
    }
    if let Some(v) = read("TOKENSPY_LOOKBACK_HOURS") {
        if let Some(n) = checked("TOKENSPY_LOOKBACK_HOURS", &v, parse_u32_range(&v, 1, 8760)) {
            settings.session.lookback_hours = n;
        }
    }
    if let Some(v) = read("TOKENSPY_POOL_SIZE") {
        if let Some(n) = checked("TOKENSPY_POOL_SIZE", &v, parse_u32_range(&v, 1, 64)) {
            settings.storage.pool_size = n;
        }
    }
}

/// Reject settings that would make the store or analyzer misbehave.
pub fn validate(settings: &TokenSpySettings) -> Result<()> {
    if settings.storage.pool_size == 0 {
        return Err(SettingsError::InvalidValue(
            "storage.poolSize must be at least 1".into(),
        ));
    }
    if settings.storage.db_path.trim().is_empty() {
        return Err(SettingsError::InvalidValue(
            "storage.dbPath must not be empty".into(),
        ));
    }
    if settings.session.char_limit == 0 {
        return Err(SettingsError::InvalidValue(
            "session.charLimit must be positive".into(),
        ));
    }
    if settings.session.lookback_hours == 0 {
        return Err(SettingsError::InvalidValue(
            "session.lookbackHours must be positive".into(),
        ));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn checked<T>(key: &str, raw: &str, parsed: Option<T>) -> Option<T> {
    if parsed.is_none() {
        warn!(key, value = %raw, "invalid numeric env var, ignoring");
    }
    parsed
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

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
        let target = serde_json::json!({"session": {"charLimit": 1, "lookbackHours": 24}});
        let source = serde_json::json!({"session": {"charLimit": 5}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["session"]["charLimit"], 5);
        assert_eq!(merged["session"]["lookbackHours"], 24);
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(serde_json::json!({"a": 1}), serde_json::json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(
            serde_json::json!({"a": [1, 2, 3]}),
            serde_json::json!({"a": [9]}),
        );
        assert_eq!(merged["a"], serde_json::json!([9]));
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.session.char_limit, 200_000);
        assert_eq!(settings.session.lookback_hours, 24);
        assert_eq!(settings.query.usage_limit, 200);
        assert_eq!(settings.query.recent_limit, 100);
        assert_eq!(settings.http.connect_timeout_ms, 10_000);
        assert_eq!(settings.http.read_timeout_ms, 300_000);
        assert_eq!(settings.http.max_idle_per_host, 10);
        assert!(settings.providers.is_empty());
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"session": {"charLimit": 150000}, "logging": {"level": "debug", "format": "json"},
                "providers": {"local": {"baseUrl": "http://gpu-box:8000"}}}"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.session.char_limit, 150_000);
        assert_eq!(settings.session.lookback_hours, 24);
        assert_eq!(settings.logging.level, LogLevel::Debug);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(
            settings
                .provider_override("LOCAL")
                .and_then(|o| o.base_url.as_deref()),
            Some("http://gpu-box:8000")
        );
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn load_rejects_zero_pool_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"storage": {"poolSize": 0}}"#).unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_matches!(validate(&settings), Err(SettingsError::InvalidValue(_)));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = TokenSpySettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("TOKENSPY_DB_PATH", "/var/lib/tokenspy.db"),
                ("TOKENSPY_CHAR_LIMIT", "50000"),
                ("TOKENSPY_LOOKBACK_HOURS", "48"),
                ("TOKENSPY_POOL_SIZE", "4"),
                ("TOKENSPY_LOG_LEVEL", "INFO"),
                ("TOKENSPY_LOG_FORMAT", "json"),
            ]),
        );
        assert_eq!(settings.storage.db_path, "/var/lib/tokenspy.db");
        assert_eq!(settings.session.char_limit, 50_000);
        assert_eq!(settings.session.lookback_hours, 48);
        assert_eq!(settings.storage.pool_size, 4);
        assert_eq!(settings.logging.level, LogLevel::Info);
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = TokenSpySettings::default();
        apply_overrides_from(
            &mut settings,
            env(&[
                ("TOKENSPY_CHAR_LIMIT", "0"),
                ("TOKENSPY_POOL_SIZE", "500"),
                ("TOKENSPY_LOG_LEVEL", "chatty"),
                ("TOKENSPY_DB_PATH", ""),
            ]),
        );
        let defaults = TokenSpySettings::default();
        assert_eq!(settings.session.char_limit, defaults.session.char_limit);
        assert_eq!(settings.storage.pool_size, defaults.storage.pool_size);
        assert_eq!(settings.logging.level, defaults.logging.level);
        assert_eq!(settings.storage.db_path, defaults.storage.db_path);
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u32_range("48", 1, 8760), Some(48));
        assert_eq!(parse_u32_range("0", 1, 8760), None);
        assert_eq!(parse_u32_range("abc", 1, 8760), None);
        assert_eq!(parse_u64_range(" 200000 ", 1, 100_000_000), Some(200_000));
        assert_eq!(parse_u64_range("100000001", 1, 100_000_000), None);
    }
}
