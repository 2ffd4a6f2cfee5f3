//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RunlogSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `RUNLOG_*` environment overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use runlog_logging::{LogFormat, LogLevel};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::RunlogSettings;

/// Directory holding the settings file and, by default, the database.
pub fn settings_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".runlog")
}

/// Default settings file (`~/.runlog/settings.json`).
pub fn settings_path() -> PathBuf {
    settings_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RunlogSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path` with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RunlogSettings> {
    let mut settings = read_file_layer(path)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

fn read_file_layer(path: &Path) -> Result<RunlogSettings> {
    let defaults = serde_json::to_value(RunlogSettings::default())?;

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

/// Reject settings no pool or query can run with.
pub fn validate(settings: &RunlogSettings) -> Result<()> {
    if settings.database.path.trim().is_empty() {
        return Err(SettingsError::InvalidValue("database.path is empty".into()));
    }
    if settings.database.pool_size == 0 {
        return Err(SettingsError::InvalidValue(
            "database.poolSize must be at least 1".into(),
        ));
    }
    if settings.query.default_session_limit == 0 {
        return Err(SettingsError::InvalidValue(
            "query.defaultSessionLimit must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Apply `RUNLOG_*` environment overrides. Invalid values are ignored with a
/// warning.
pub fn apply_env_overrides(settings: &mut RunlogSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
pub fn apply_overrides(settings: &mut RunlogSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("RUNLOG_DB_PATH").filter(|v| !v.trim().is_empty()) {
        settings.database.path = v;
    }
    if let Some(v) = parsed(&lookup, "RUNLOG_POOL_SIZE", |v| parse_u32_range(v, 1, 64)) {
        settings.database.pool_size = v;
    }
    if let Some(v) = parsed(&lookup, "RUNLOG_BUSY_TIMEOUT_MS", |v| {
        parse_u32_range(v, 0, 600_000)
    }) {
        settings.database.busy_timeout_ms = v;
    }
    if let Some(v) = parsed(&lookup, "RUNLOG_LOG_LEVEL", |v| v.parse::<LogLevel>().ok()) {
        settings.logging.level = v;
    }
    if let Some(v) = parsed(&lookup, "RUNLOG_LOG_FORMAT", |v| v.parse::<LogFormat>().ok()) {
        settings.logging.format = v;
    }
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Option<T> {
    let val = lookup(name)?;
    let result = parse(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid env var, ignoring");
    }
    result
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
