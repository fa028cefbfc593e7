//! Settings loading with deep merge and environment variable overrides.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{ChatSettings, LogFormat};

/// Default settings file (`~/.chatte/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chatte").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<ChatSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error. The result is
/// validated before it is returned.
pub fn load_settings_from_path(path: &Path) -> Result<ChatSettings> {
    let defaults = serde_json::to_value(ChatSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ChatSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
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

/// Apply `CHATTE_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut ChatSettings) {
    apply_overrides_with(settings, |key| std::env::var(key).ok());
}

/// Apply `CHATTE_*` overrides read through `lookup`.
///
/// Unparseable or out-of-range values are logged and ignored.
pub fn apply_overrides_with<F>(settings: &mut ChatSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = read("CHATTE_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_ranged::<u16>(&read, "CHATTE_PORT", 0, u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = read_ranged::<usize>(&read, "CHATTE_MAX_CONNECTIONS", 1, 1_000_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = read("CHATTE_STATIC_DIR") {
        settings.server.static_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = read("CHATTE_ALLOWED_ORIGINS") {
        settings.server.allowed_origins = v
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(v) = read_ranged::<u64>(&read, "CHATTE_INACTIVITY_TIMEOUT_MS", 1, u64::MAX) {
        settings.hub.inactivity_timeout_ms = v;
    }
    if let Some(v) = read_ranged::<u64>(&read, "CHATTE_SWEEP_INTERVAL_MS", 1, u64::MAX) {
        settings.hub.sweep_interval_ms = v;
    }
    if let Some(v) = read_ranged::<u64>(&read, "CHATTE_DISPATCH_TIMEOUT_MS", 1, 3_600_000) {
        settings.hub.dispatch_timeout_ms = v;
    }
    if let Some(v) = read_ranged::<usize>(&read, "CHATTE_INBOUND_CAPACITY", 1, 1_000_000) {
        settings.hub.inbound_capacity = v;
    }
    if let Some(v) = read("CHATTE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("CHATTE_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "CHATTE_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

/// Parse `pretty` / `json` (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "pretty" | "text" => Some(LogFormat::Pretty),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

fn read_ranged<T>(read: &impl Fn(&str) -> Option<String>, key: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Copy,
{
    let val = read(key)?;
    let parsed = val.parse::<T>().ok().filter(|n| *n >= min && *n <= max);
    if parsed.is_none() {
        warn!(key, value = %val, "invalid numeric env var, ignoring");
    }
    parsed
}
