//! Agent configuration.

use serde::{Deserialize, Serialize};
use trellis_core::messages::LlmModel;
use trellis_settings::TrellisSettings;

/// Configuration for an [`AgentOrchestrator`](crate::AgentOrchestrator).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    /// Model every LLM node calls.
    pub model: LlmModel,
    /// System prompt seeded into each run's prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Cap on concurrently executing tool calls. `None` is unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel_tool_calls: Option<usize>,
}

impl AgentConfig {
    /// Build from loaded settings.
    #[must_use]
    pub fn from_settings(settings: &TrellisSettings) -> Self {
        Self {
            model: LlmModel::new(
                settings.agent.default_provider.clone(),
                settings.agent.default_model.clone(),
            ),
            system_prompt: settings.agent.system_prompt.clone(),
            max_parallel_tool_calls: settings.tools.max_parallel_calls,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::from_settings(&TrellisSettings::default())
    }
}
