//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TrellisSettings::default()`]
//! 2. If `~/.trellis/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TRELLIS_*` environment variable overrides (highest priority)
//! 4. Validate the result

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::TrellisSettings;

/// Resolve the path to the settings file (`~/.trellis/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".trellis").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TrellisSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TrellisSettings> {
    load_settings_with_env(path, |key| std::env::var(key).ok())
}

/// Load settings from a path, reading overrides through `env`.
pub fn load_settings_with_env(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<TrellisSettings> {
    let defaults = serde_json::to_value(TrellisSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TrellisSettings = serde_json::from_value(merged)?;
    apply_env_overrides_from(&mut settings, env);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut TrellisSettings) {
    apply_env_overrides_from(settings, |key| std::env::var(key).ok());
}

/// Apply overrides read through `env`. Invalid values are ignored with a
/// warning.
pub fn apply_env_overrides_from(
    settings: &mut TrellisSettings,
    env: impl Fn(&str) -> Option<String>,
) {
    let string = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = string("TRELLIS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("TRELLIS_DEFAULT_MODEL") {
        settings.agent.default_model = v;
    }
    if let Some(v) = string("TRELLIS_DEFAULT_PROVIDER") {
        settings.agent.default_provider = v;
    }
    if let Some(v) = string("TRELLIS_SYSTEM_PROMPT") {
        settings.agent.system_prompt = Some(v);
    }
    if let Some(raw) = string("TRELLIS_MAX_PARALLEL_TOOLS") {
        match parse_usize_range(&raw, 1, 1024) {
            Some(v) => settings.tools.max_parallel_calls = Some(v),
            None => {
                warn!(key = "TRELLIS_MAX_PARALLEL_TOOLS", value = %raw, "invalid usize env var, ignoring");
            }
        }
    }
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
