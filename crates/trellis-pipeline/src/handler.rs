//! Event handler trait.

use async_trait::async_trait;

use crate::errors::HandlerError;
use crate::types::EventContext;

/// A lifecycle event handler registered by a feature.
///
/// Returning an error aborts the current dispatch; the hub reports it as
/// [`PipelineError::Handler`](crate::PipelineError::Handler) and the run
/// that fired the event fails.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one event.
    async fn handle(&self, context: &EventContext) -> Result<(), HandlerError>;
}

/// Handler backed by a synchronous closure. See [`handler_fn`].
pub struct FnHandler<F>(F);

/// Wrap a synchronous closure as an [`EventHandler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&EventContext) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&EventContext) -> Result<(), HandlerError> + Send + Sync,
{
    async fn handle(&self, context: &EventContext) -> Result<(), HandlerError> {
        (self.0)(context)
    }
}
