//! Per-run conversation state shared by LLM nodes.

use parking_lot::Mutex;
use trellis_core::messages::{LlmModel, Message, Prompt, ToolDescriptor};

use crate::agent::llm_proxy::{PipelineExecutor, ProxyChunkStream};
use crate::errors::RuntimeError;

/// The run's prompt plus the proxied executor that extends it.
///
/// Each request sends the current prompt and appends the model's responses,
/// so consecutive LLM nodes see one growing conversation.
#[derive(Debug)]
pub struct LlmSession {
    executor: PipelineExecutor,
    model: LlmModel,
    tools: Vec<ToolDescriptor>,
    prompt: Mutex<Prompt>,
}

impl LlmSession {
    /// Create a session around an initial prompt.
    pub fn new(
        executor: PipelineExecutor,
        model: LlmModel,
        tools: Vec<ToolDescriptor>,
        prompt: Prompt,
    ) -> Self {
        Self {
            executor,
            model,
            tools,
            prompt: Mutex::new(prompt),
        }
    }

    /// Append messages to the prompt.
    pub fn append(&self, messages: impl IntoIterator<Item = Message>) {
        self.prompt.lock().extend(messages);
    }

    /// Append a user message.
    pub fn append_user(&self, content: impl Into<String>) {
        self.prompt.lock().push(Message::user(content));
    }

    /// Snapshot of the current prompt.
    pub fn prompt(&self) -> Prompt {
        self.prompt.lock().clone()
    }

    /// Model used for every request.
    pub fn model(&self) -> &LlmModel {
        &self.model
    }

    /// Tools offered to the model.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Send the prompt with tools and append the responses.
    pub async fn request(&self) -> Result<Vec<Message>, RuntimeError> {
        self.send(&self.tools).await
    }

    /// Send the prompt without tools and append the responses.
    pub async fn request_without_tools(&self) -> Result<Vec<Message>, RuntimeError> {
        self.send(&[]).await
    }

    /// Stream a response to the current prompt. The streamed text is not
    /// appended; callers append it once they have collected it.
    pub async fn request_streaming(&self) -> Result<ProxyChunkStream, RuntimeError> {
        let prompt = self.prompt();
        self.executor.execute_streaming(&prompt, &self.model).await
    }

    async fn send(&self, tools: &[ToolDescriptor]) -> Result<Vec<Message>, RuntimeError> {
        let prompt = self.prompt();
        let responses = self.executor.execute(&prompt, &self.model, tools).await?;
        self.append(responses.iter().cloned());
        Ok(responses)
    }
}
