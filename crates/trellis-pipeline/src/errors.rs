//! Pipeline error types.

use thiserror::Error;

use crate::types::EventKind;

/// Failure reported by a single handler or feature shutdown.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    /// Failure description.
    pub message: String,
}

impl HandlerError {
    /// Create a handler error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised by the [`PipelineHub`](crate::PipelineHub).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A feature with the same key is already installed.
    #[error("Feature already installed: {0}")]
    DuplicateFeature(String),

    /// A handler failed while an event was being dispatched.
    #[error("Handler of feature '{feature}' failed on {event}: {message}")]
    Handler {
        /// Key name of the owning feature.
        feature: String,
        /// Event being dispatched.
        event: EventKind,
        /// Failure description.
        message: String,
    },

    /// A feature failed to shut down.
    #[error("Feature '{feature}' failed to shut down: {message}")]
    Shutdown {
        /// Key name of the feature.
        feature: String,
        /// Failure description.
        message: String,
    },
}
