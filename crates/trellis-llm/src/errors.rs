//! Executor error types.

use thiserror::Error;

/// Errors a [`PromptExecutor`](crate::PromptExecutor) can return.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP-style status code.
        status: u16,
        /// Error description.
        message: String,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// Rate limited by the provider.
    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds.
        retry_after_ms: u64,
    },

    /// Authentication failed.
    #[error("Auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// The call or stream was cancelled.
    #[error("Executor call cancelled")]
    Cancelled,

    /// A scripted executor ran out of queued responses.
    #[error("No scripted response left for prompt '{prompt_id}'")]
    Exhausted {
        /// Prompt that found the queue empty.
        prompt_id: String,
    },

    /// Any other provider failure.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl ExecutorError {
    /// Convenience constructor for [`ExecutorError::Other`].
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Api { retryable, .. } => *retryable,
            Self::Auth { .. } | Self::Cancelled | Self::Exhausted { .. } | Self::Other { .. } => {
                false
            }
        }
    }

    /// Short category label for logs and error events.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Api { .. } => "api",
            Self::RateLimited { .. } => "rate_limit",
            Self::Auth { .. } => "authentication",
            Self::Cancelled => "cancelled",
            Self::Exhausted { .. } => "exhausted",
            Self::Other { .. } => "unknown",
        }
    }
}
