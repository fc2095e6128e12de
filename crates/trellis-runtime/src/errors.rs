//! Runtime error types.

use trellis_llm::ExecutorError;
use trellis_pipeline::PipelineError;
use trellis_tools::ToolError;

/// Errors that can occur while building or running an agent.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A run was requested while another is in flight.
    #[error("Agent is already running (session {0})")]
    ConcurrentRun(String),

    /// A final message broke the termination protocol.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A node body failed.
    #[error("Node '{node}' failed: {message}")]
    Strategy {
        /// Failing node.
        node: String,
        /// Failure description.
        message: String,
    },

    /// No outgoing edge accepted a node's output.
    #[error("No edge from node '{node}' accepts its output")]
    NoMatchingEdge {
        /// Node whose output matched nothing.
        node: String,
    },

    /// A value reaching a node had the wrong type.
    #[error("Type mismatch at node '{node}': expected {expected}")]
    TypeMismatch {
        /// Receiving node.
        node: String,
        /// Expected Rust type.
        expected: &'static str,
    },

    /// The strategy graph failed build-time validation.
    #[error("Invalid strategy graph: {0}")]
    InvalidGraph(String),

    /// The agent was built with missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An environment operation was called outside of a run.
    #[error("No active session")]
    NoActiveSession,

    /// Prompt executor failure.
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// A feature handler failed or vetoed.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Tool lookup or execution failure outside the dispatcher.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// A failure reported by the environment.
    #[error("{category}: {message}")]
    Reported {
        /// Category label.
        category: String,
        /// Failure description.
        message: String,
    },

    /// The run was aborted.
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal / unexpected error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Shorthand for a node failure.
    pub fn strategy(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Strategy {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Whether the run cannot end normally after this error; it is returned
    /// to the caller instead of resolving the run to `None`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }

    /// Whether retrying the run could succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Executor(e) => e.is_retryable(),
            Self::ConcurrentRun(_) | Self::Cancelled | Self::NoActiveSession => true,
            Self::ProtocolViolation(_)
            | Self::Strategy { .. }
            | Self::NoMatchingEdge { .. }
            | Self::TypeMismatch { .. }
            | Self::InvalidGraph(_)
            | Self::Config(_)
            | Self::Pipeline(_)
            | Self::Tool(_)
            | Self::Reported { .. }
            | Self::Internal(_) => false,
        }
    }

    /// Error category string for `AgentRunError` events.
    pub fn category(&self) -> &str {
        match self {
            Self::ConcurrentRun(_) => "concurrent_run",
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::Strategy { .. } => "strategy",
            Self::NoMatchingEdge { .. } => "no_matching_edge",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::InvalidGraph(_) => "invalid_graph",
            Self::Config(_) => "config",
            Self::NoActiveSession => "no_active_session",
            Self::Executor(_) => "executor",
            Self::Pipeline(_) => "pipeline",
            Self::Tool(_) => "tool",
            Self::Reported { category, .. } => category,
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }
}
