//! Minimal prompt and message vocabulary.
//!
//! The engine does not own a rich conversation model. It needs just enough
//! structure to hand a prompt to a [`PromptExecutor`], recognize tool calls
//! in the model's response, and feed tool results back. Provider clients map
//! these types onto their own wire formats.
//!
//! [`PromptExecutor`]: https://docs.rs/trellis-llm

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ToolCallId;

/// A single conversation message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum Message {
    /// System instructions.
    System {
        /// Instruction text.
        content: String,
    },
    /// User turn.
    User {
        /// User text.
        content: String,
    },
    /// Plain assistant text.
    Assistant {
        /// Assistant text.
        content: String,
    },
    /// The model asks for a tool invocation.
    #[serde(rename_all = "camelCase")]
    ToolCall {
        /// Provider-assigned call ID, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<ToolCallId>,
        /// Tool name.
        tool: String,
        /// Structured arguments.
        args: Value,
    },
    /// Result of a tool invocation, sent back to the model.
    #[serde(rename_all = "camelCase")]
    ToolResult {
        /// Call ID this result answers.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<ToolCallId>,
        /// Tool name.
        tool: String,
        /// Serialized result (or error description).
        content: String,
        /// Whether the call failed.
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
        }
    }

    /// Create a tool call message.
    pub fn tool_call(id: Option<ToolCallId>, tool: impl Into<String>, args: Value) -> Self {
        Self::ToolCall {
            id,
            tool: tool.into(),
            args,
        }
    }

    /// Whether this message is a tool call.
    #[must_use]
    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }

    /// Text content for text-bearing variants.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content }
            | Self::ToolResult { content, .. } => Some(content),
            Self::ToolCall { .. } => None,
        }
    }

    /// Short role label, used in logs.
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
        }
    }
}

/// An ordered conversation handed to a prompt executor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// Prompt identifier (stable across a run).
    pub id: String,
    /// Conversation so far.
    pub messages: Vec<Message>,
}

impl Prompt {
    /// Create an empty prompt.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
        }
    }

    /// Builder-style system message.
    #[must_use]
    pub fn with_system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(Message::system(content));
        self
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append several messages, preserving order.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the prompt has no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent message, if any.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// Model selection: provider family plus model identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LlmModel {
    /// Provider family (e.g. `"anthropic"`).
    pub provider: String,
    /// Model identifier within the provider.
    pub id: String,
}

impl LlmModel {
    /// Create a model reference.
    pub fn new(provider: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for LlmModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.id)
    }
}

/// Tool schema handed to the model alongside a prompt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name, the exact string the model uses to call it.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

impl ToolDescriptor {
    /// Create a descriptor with an empty object schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Builder-style parameter schema.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}
