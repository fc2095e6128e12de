//! Tool error types.
//!
//! Each variant maps to one of the outcome kinds the dispatcher
//! distinguishes; see [`ToolError::kind`].

use thiserror::Error;

/// Errors that can occur while resolving, decoding, or running a tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The argument payload did not match the tool's argument type.
    #[error("invalid arguments for '{tool}': {message}")]
    ArgumentDecode {
        /// Tool whose arguments failed to decode.
        tool: String,
        /// Decoder message.
        message: String,
    },

    /// The tool rejected its arguments as semantically invalid.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// The tool body failed.
    #[error("execution error: {message}")]
    Execution {
        /// Failure text.
        message: String,
    },

    /// No tool with this name is registered.
    #[error("Tool not found: {name}")]
    NotFound {
        /// The requested tool name.
        name: String,
    },

    /// JSON serialization of a tool result failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error (catch-all).
    #[error("{message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

/// Outcome category of a [`ToolError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    /// Arguments could not be decoded.
    ArgumentDecode,
    /// Arguments were rejected by the tool.
    Validation,
    /// The tool failed unexpectedly.
    Execution,
    /// The tool does not exist.
    NotFound,
}

impl ToolError {
    /// Shorthand for [`ToolError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for [`ToolError::Execution`].
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Outcome category.
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            Self::ArgumentDecode { .. } => ToolErrorKind::ArgumentDecode,
            Self::Validation { .. } => ToolErrorKind::Validation,
            Self::NotFound { .. } => ToolErrorKind::NotFound,
            Self::Execution { .. } | Self::Json(_) | Self::Internal { .. } => {
                ToolErrorKind::Execution
            }
        }
    }
}
