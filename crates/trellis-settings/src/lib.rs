//! # trellis-settings
//!
//! Layered configuration for the engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TrellisSettings::default()`]
//! 2. **User file**: `~/.trellis/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TRELLIS_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path,
    load_settings_with_env, settings_path,
};
pub use types::{AgentSettings, LoggingSettings, ToolSettings, TrellisSettings};

use std::sync::OnceLock;

static SETTINGS: OnceLock<TrellisSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// Loads from `~/.trellis/settings.json` with env overrides on first call.
/// Falls back to compiled defaults if loading fails.
pub fn get_settings() -> &'static TrellisSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            TrellisSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// Returns the value back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: TrellisSettings) -> std::result::Result<(), TrellisSettings> {
    SETTINGS.set(settings)
}
