//! Tool call request and result records.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use trellis_core::ids::ToolCallId;
use trellis_core::messages::Message;

use crate::traits::ToolOutput;

/// One tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallRequest {
    /// Provider call ID, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<ToolCallId>,
    /// Tool to invoke.
    pub tool_name: String,
    /// Raw argument payload.
    pub args: Value,
}

impl ToolCallRequest {
    /// Create a request without a call ID.
    pub fn new(tool_name: impl Into<String>, args: Value) -> Self {
        Self {
            call_id: None,
            tool_name: tool_name.into(),
            args,
        }
    }

    /// Builder-style call ID.
    #[must_use]
    pub fn with_call_id(mut self, call_id: impl Into<ToolCallId>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    /// Extract a request from a tool call message.
    #[must_use]
    pub fn from_message(message: &Message) -> Option<Self> {
        match message {
            Message::ToolCall { id, tool, args } => Some(Self {
                call_id: id.clone(),
                tool_name: tool.clone(),
                args: args.clone(),
            }),
            _ => None,
        }
    }

    /// The request as a tool call message.
    #[must_use]
    pub fn to_message(&self) -> Message {
        Message::tool_call(self.call_id.clone(), self.tool_name.clone(), self.args.clone())
    }
}

/// Uniform outcome of one tool invocation, whatever happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Call ID copied from the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<ToolCallId>,
    /// Tool name copied from the request.
    pub tool_name: String,
    /// Text sent back to the model (result or error description).
    pub message: String,
    /// Serialized typed result; `None` on error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typed_result: Option<Value>,
    /// Whether the call failed.
    pub is_error: bool,
}

impl ToolCallResult {
    /// Successful result for a request.
    #[must_use]
    pub fn success(request: &ToolCallRequest, output: ToolOutput) -> Self {
        Self {
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            message: output.message,
            typed_result: Some(output.value),
            is_error: false,
        }
    }

    /// Error result for a request.
    #[must_use]
    pub fn error(request: &ToolCallRequest, message: impl Into<String>) -> Self {
        Self {
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            message: message.into(),
            typed_result: None,
            is_error: true,
        }
    }

    /// The result as a tool result message for the next model turn.
    #[must_use]
    pub fn to_message(&self) -> Message {
        Message::ToolResult {
            id: self.call_id.clone(),
            tool: self.tool_name.clone(),
            content: self.message.clone(),
            is_error: self.is_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_from_tool_call_message() {
        let msg = Message::tool_call(Some("c1".into()), "add", json!({"a": 1}));
        let req = ToolCallRequest::from_message(&msg).unwrap();
        assert_eq!(req.call_id.as_ref().map(ToolCallId::as_str), Some("c1"));
        assert_eq!(req.tool_name, "add");
        assert_eq!(req.to_message(), msg);
        assert!(ToolCallRequest::from_message(&Message::user("hi")).is_none());
    }

    #[test]
    fn success_and_error_shapes() {
        let req = ToolCallRequest::new("add", json!({})).with_call_id("c9");
        let ok = ToolCallResult::success(&req, ToolOutput::from_value(json!(3)));
        assert!(!ok.is_error);
        assert_eq!(ok.typed_result, Some(json!(3)));
        assert_eq!(ok.message, "3");

        let err = ToolCallResult::error(&req, "boom");
        assert!(err.is_error);
        assert!(err.typed_result.is_none());
        assert_eq!(err.call_id, ok.call_id);
    }

    #[test]
    fn result_to_message() {
        let req = ToolCallRequest::new("add", json!({}));
        let msg = ToolCallResult::error(&req, "bad").to_message();
        assert_eq!(
            msg,
            Message::ToolResult {
                id: None,
                tool: "add".into(),
                content: "bad".into(),
                is_error: true,
            }
        );
    }
}
