//! Lifecycle event kinds and their payloads.
//!
//! Every [`EventContext`] variant carries the session it fired in and an
//! RFC 3339 timestamp. Node inputs and outputs are carried as JSON values so
//! features can observe strategies of any type.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use trellis_core::ids::ToolCallId;
use trellis_core::messages::{LlmModel, Message, Prompt};

/// The fixed set of lifecycle events a feature can intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A run acquired its session.
    AgentStarted,
    /// The strategy graph walk began.
    StrategyStarted,
    /// The strategy graph reached its finish node.
    StrategyFinished,
    /// A node is about to execute.
    BeforeNode,
    /// A node finished executing.
    AfterNode,
    /// A prompt is about to be sent to the model.
    BeforeLlmCall,
    /// The model responded.
    AfterLlmCall,
    /// A tool call decoded successfully and is about to execute.
    ToolCall,
    /// A tool rejected its arguments.
    ToolValidationError,
    /// A tool failed during execution.
    ToolCallFailure,
    /// A tool returned a result.
    ToolCallResult,
    /// The run terminated with a result.
    AgentFinished,
    /// The run failed.
    AgentRunError,
}

impl EventKind {
    /// Returns all event kinds, in lifecycle order.
    #[must_use]
    pub fn all() -> &'static [EventKind] {
        &[
            Self::AgentStarted,
            Self::StrategyStarted,
            Self::StrategyFinished,
            Self::BeforeNode,
            Self::AfterNode,
            Self::BeforeLlmCall,
            Self::AfterLlmCall,
            Self::ToolCall,
            Self::ToolValidationError,
            Self::ToolCallFailure,
            Self::ToolCallResult,
            Self::AgentFinished,
            Self::AgentRunError,
        ]
    }

    /// Whether this event reports a failure.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::ToolValidationError | Self::ToolCallFailure | Self::AgentRunError
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AgentStarted => "AgentStarted",
            Self::StrategyStarted => "StrategyStarted",
            Self::StrategyFinished => "StrategyFinished",
            Self::BeforeNode => "BeforeNode",
            Self::AfterNode => "AfterNode",
            Self::BeforeLlmCall => "BeforeLlmCall",
            Self::AfterLlmCall => "AfterLlmCall",
            Self::ToolCall => "ToolCall",
            Self::ToolValidationError => "ToolValidationError",
            Self::ToolCallFailure => "ToolCallFailure",
            Self::ToolCallResult => "ToolCallResult",
            Self::AgentFinished => "AgentFinished",
            Self::AgentRunError => "AgentRunError",
        };
        f.write_str(name)
    }
}

/// Event payload, one variant per [`EventKind`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventKind", rename_all = "camelCase")]
pub enum EventContext {
    /// Payload for [`EventKind::AgentStarted`].
    #[serde(rename_all = "camelCase")]
    AgentStarted {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Strategy about to run.
        strategy: String,
        /// Run input.
        input: Value,
    },
    /// Payload for [`EventKind::StrategyStarted`].
    #[serde(rename_all = "camelCase")]
    StrategyStarted {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Strategy name.
        strategy: String,
    },
    /// Payload for [`EventKind::StrategyFinished`].
    #[serde(rename_all = "camelCase")]
    StrategyFinished {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Strategy name.
        strategy: String,
        /// Output of the finish node.
        result: Value,
    },
    /// Payload for [`EventKind::BeforeNode`].
    #[serde(rename_all = "camelCase")]
    BeforeNode {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Node name.
        node: String,
        /// Node input.
        input: Value,
    },
    /// Payload for [`EventKind::AfterNode`].
    #[serde(rename_all = "camelCase")]
    AfterNode {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Node name.
        node: String,
        /// Node input.
        input: Value,
        /// Node output.
        output: Value,
    },
    /// Payload for [`EventKind::BeforeLlmCall`].
    #[serde(rename_all = "camelCase")]
    BeforeLlmCall {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Prompt being sent.
        prompt: Prompt,
        /// Target model.
        model: LlmModel,
        /// Names of the tools offered to the model.
        tools: Vec<String>,
    },
    /// Payload for [`EventKind::AfterLlmCall`].
    #[serde(rename_all = "camelCase")]
    AfterLlmCall {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Prompt that was sent.
        prompt: Prompt,
        /// Target model.
        model: LlmModel,
        /// Messages the model returned.
        responses: Vec<Message>,
    },
    /// Payload for [`EventKind::ToolCall`].
    #[serde(rename_all = "camelCase")]
    ToolCall {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Provider call ID, if any.
        call_id: Option<ToolCallId>,
        /// Tool being invoked.
        tool_name: String,
        /// Raw arguments.
        args: Value,
    },
    /// Payload for [`EventKind::ToolValidationError`].
    #[serde(rename_all = "camelCase")]
    ToolValidationError {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Provider call ID, if any.
        call_id: Option<ToolCallId>,
        /// Tool that rejected its arguments.
        tool_name: String,
        /// Raw arguments.
        args: Value,
        /// Validation message.
        error: String,
    },
    /// Payload for [`EventKind::ToolCallFailure`].
    #[serde(rename_all = "camelCase")]
    ToolCallFailure {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Provider call ID, if any.
        call_id: Option<ToolCallId>,
        /// Tool that failed.
        tool_name: String,
        /// Raw arguments.
        args: Value,
        /// Failure text.
        error: String,
    },
    /// Payload for [`EventKind::ToolCallResult`].
    #[serde(rename_all = "camelCase")]
    ToolCallResult {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Provider call ID, if any.
        call_id: Option<ToolCallId>,
        /// Tool that ran.
        tool_name: String,
        /// Raw arguments.
        args: Value,
        /// Typed result, serialized.
        result: Value,
    },
    /// Payload for [`EventKind::AgentFinished`].
    #[serde(rename_all = "camelCase")]
    AgentFinished {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Strategy that ran.
        strategy: String,
        /// Final result delivered through termination.
        result: Option<String>,
    },
    /// Payload for [`EventKind::AgentRunError`].
    #[serde(rename_all = "camelCase")]
    AgentRunError {
        /// Session this event fires in.
        session_id: String,
        /// RFC 3339 timestamp.
        timestamp: String,
        /// Error category label.
        category: String,
        /// Error description.
        error: String,
    },
}

impl EventContext {
    /// The kind of event this payload belongs to.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::AgentStarted { .. } => EventKind::AgentStarted,
            Self::StrategyStarted { .. } => EventKind::StrategyStarted,
            Self::StrategyFinished { .. } => EventKind::StrategyFinished,
            Self::BeforeNode { .. } => EventKind::BeforeNode,
            Self::AfterNode { .. } => EventKind::AfterNode,
            Self::BeforeLlmCall { .. } => EventKind::BeforeLlmCall,
            Self::AfterLlmCall { .. } => EventKind::AfterLlmCall,
            Self::ToolCall { .. } => EventKind::ToolCall,
            Self::ToolValidationError { .. } => EventKind::ToolValidationError,
            Self::ToolCallFailure { .. } => EventKind::ToolCallFailure,
            Self::ToolCallResult { .. } => EventKind::ToolCallResult,
            Self::AgentFinished { .. } => EventKind::AgentFinished,
            Self::AgentRunError { .. } => EventKind::AgentRunError,
        }
    }

    /// Session this event fired in.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            Self::AgentStarted { session_id, .. }
            | Self::StrategyStarted { session_id, .. }
            | Self::StrategyFinished { session_id, .. }
            | Self::BeforeNode { session_id, .. }
            | Self::AfterNode { session_id, .. }
            | Self::BeforeLlmCall { session_id, .. }
            | Self::AfterLlmCall { session_id, .. }
            | Self::ToolCall { session_id, .. }
            | Self::ToolValidationError { session_id, .. }
            | Self::ToolCallFailure { session_id, .. }
            | Self::ToolCallResult { session_id, .. }
            | Self::AgentFinished { session_id, .. }
            | Self::AgentRunError { session_id, .. } => session_id,
        }
    }

    /// Event timestamp.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        match self {
            Self::AgentStarted { timestamp, .. }
            | Self::StrategyStarted { timestamp, .. }
            | Self::StrategyFinished { timestamp, .. }
            | Self::BeforeNode { timestamp, .. }
            | Self::AfterNode { timestamp, .. }
            | Self::BeforeLlmCall { timestamp, .. }
            | Self::AfterLlmCall { timestamp, .. }
            | Self::ToolCall { timestamp, .. }
            | Self::ToolValidationError { timestamp, .. }
            | Self::ToolCallFailure { timestamp, .. }
            | Self::ToolCallResult { timestamp, .. }
            | Self::AgentFinished { timestamp, .. }
            | Self::AgentRunError { timestamp, .. } => timestamp,
        }
    }

    /// Node name for node events.
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        match self {
            Self::BeforeNode { node, .. } | Self::AfterNode { node, .. } => Some(node),
            _ => None,
        }
    }

    /// Tool name for tool events.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::ToolCall { tool_name, .. }
            | Self::ToolValidationError { tool_name, .. }
            | Self::ToolCallFailure { tool_name, .. }
            | Self::ToolCallResult { tool_name, .. } => Some(tool_name),
            _ => None,
        }
    }
}
