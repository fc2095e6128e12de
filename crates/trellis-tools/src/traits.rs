//! Tool traits and execution context.

use std::any::Any;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use trellis_core::ids::{SessionId, ToolCallId};
use trellis_core::messages::ToolDescriptor;

use crate::errors::ToolError;

/// Execution context passed to every tool invocation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// Provider call ID, if the model supplied one.
    pub call_id: Option<ToolCallId>,
    /// Session of the run invoking this tool.
    pub session_id: SessionId,
    /// Cancelled when the run is aborted.
    pub cancellation: CancellationToken,
}

impl ToolContext {
    /// Context outside of any run, with a fresh session ID.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            call_id: None,
            session_id: SessionId::new(),
            cancellation: CancellationToken::new(),
        }
    }
}

/// Result of a successful tool call: the typed value and its message form.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolOutput {
    /// Text sent back to the model.
    pub message: String,
    /// Serialized typed result.
    pub value: Value,
}

impl ToolOutput {
    /// Build from a serialized value. Strings are used verbatim as the
    /// message, anything else as compact JSON.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let message = match &value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Self { message, value }
    }
}

/// A tool with typed arguments and output.
///
/// Return [`ToolError::Validation`] from [`execute`](Tool::execute) to reject
/// semantically invalid arguments; any other error counts as an execution
/// failure.
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    /// Decoded argument type.
    type Args: DeserializeOwned + Send + 'static;
    /// Result type.
    type Output: Serialize + Send;

    /// Tool name, the exact string the model uses to call it.
    fn name(&self) -> &str;

    /// Schema handed to the model.
    fn descriptor(&self) -> ToolDescriptor;

    /// Decode a raw argument payload.
    fn decode_args(&self, payload: &Value) -> Result<Self::Args, ToolError> {
        serde_json::from_value(payload.clone()).map_err(|e| ToolError::ArgumentDecode {
            tool: self.name().to_owned(),
            message: e.to_string(),
        })
    }

    /// Run the tool.
    async fn execute(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output, ToolError>;
}

/// Decoded arguments in erased form, produced by [`DynTool::decode`].
pub type DecodedArgs = Box<dyn Any + Send>;

/// Object-safe tool interface used by the registry and dispatcher.
///
/// Decoding and execution are separate steps so the dispatcher can report
/// decode failures without firing any tool events.
#[async_trait]
pub trait DynTool: Send + Sync {
    /// Tool name.
    fn name(&self) -> &str;

    /// Schema handed to the model.
    fn descriptor(&self) -> ToolDescriptor;

    /// Decode a raw payload into erased arguments.
    fn decode(&self, payload: &Value) -> Result<DecodedArgs, ToolError>;

    /// Execute with arguments produced by [`decode`](DynTool::decode) on the
    /// same tool.
    async fn execute_decoded(
        &self,
        args: DecodedArgs,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError>;
}

#[async_trait]
impl<T: Tool> DynTool for T {
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn descriptor(&self) -> ToolDescriptor {
        Tool::descriptor(self)
    }

    fn decode(&self, payload: &Value) -> Result<DecodedArgs, ToolError> {
        let args = self.decode_args(payload)?;
        Ok(Box::new(args))
    }

    async fn execute_decoded(
        &self,
        args: DecodedArgs,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let args = args.downcast::<T::Args>().map_err(|_| ToolError::Internal {
            message: format!("arguments passed to '{}' were decoded by another tool", Tool::name(self)),
        })?;
        let output = self.execute(*args, ctx).await?;
        Ok(ToolOutput::from_value(serde_json::to_value(&output)?))
    }
}
