//! Settings type definitions.
//!
//! All types use camelCase field names and `#[serde(default)]`, so a partial
//! JSON file only needs the keys it overrides.

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "logging": { "level": "debug" },
///   "agent": { "defaultModel": "claude-sonnet" },
///   "tools": { "maxParallelCalls": 4 }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrellisSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Agent defaults.
    pub agent: AgentSettings,
    /// Tool dispatch settings.
    pub tools: ToolSettings,
}

impl Default for TrellisSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "trellis".to_string(),
            logging: LoggingSettings::default(),
            agent: AgentSettings::default(),
            tools: ToolSettings::default(),
        }
    }
}

impl TrellisSettings {
    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> crate::Result<()> {
        if self.tools.max_parallel_calls == Some(0) {
            return Err(crate::SettingsError::InvalidValue(
                "tools.maxParallelCalls must be at least 1".into(),
            ));
        }
        if self.agent.default_model.trim().is_empty() {
            return Err(crate::SettingsError::InvalidValue(
                "agent.defaultModel must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Agent defaults applied when a builder does not override them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Provider family of the default model.
    pub default_provider: String,
    /// Default model ID.
    pub default_model: String,
    /// System prompt prepended to every run, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            default_provider: "anthropic".to_string(),
            default_model: "claude-sonnet-4-5".to_string(),
            system_prompt: None,
        }
    }
}

/// Tool dispatch settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSettings {
    /// Cap on concurrently executing tool calls in one batch. `None` is
    /// unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel_calls: Option<usize>,
}
