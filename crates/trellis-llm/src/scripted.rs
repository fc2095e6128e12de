//! Deterministic executor that replays queued responses.
//!
//! Each call to [`execute`](PromptExecutor::execute) or
//! [`execute_streaming`](PromptExecutor::execute_streaming) pops the next
//! queued response. Every call is recorded so tests can assert on what the
//! engine actually sent.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use trellis_core::messages::{LlmModel, Message, Prompt, ToolDescriptor};

use crate::errors::ExecutorError;
use crate::executor::{ExecutorResult, PromptExecutor, TextChunkStream};

enum Scripted {
    Messages(Vec<Message>),
    Failure(String),
}

/// A call observed by a [`ScriptedExecutor`].
#[derive(Clone, Debug)]
pub struct RecordedCall {
    /// Prompt as it was at call time.
    pub prompt: Prompt,
    /// Model requested.
    pub model: LlmModel,
    /// Names of the tools offered (empty for streaming calls).
    pub tool_names: Vec<String>,
    /// Whether this was a streaming call.
    pub streaming: bool,
}

/// Executor that answers from a fixed script.
#[derive(Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedExecutor {
    /// Create an executor with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain assistant text response.
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.push(Scripted::Messages(vec![Message::assistant(text)]));
        self
    }

    /// Queue an arbitrary response.
    #[must_use]
    pub fn with_messages(self, messages: Vec<Message>) -> Self {
        self.push(Scripted::Messages(messages));
        self
    }

    /// Queue a failing call.
    #[must_use]
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Failure(message.into()));
        self
    }

    /// Calls observed so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of responses still queued.
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    fn push(&self, entry: Scripted) {
        self.script.lock().push_back(entry);
    }

    fn next(&self, prompt: &Prompt) -> ExecutorResult<Vec<Message>> {
        match self.script.lock().pop_front() {
            Some(Scripted::Messages(messages)) => Ok(messages),
            Some(Scripted::Failure(message)) => Err(ExecutorError::Other { message }),
            None => Err(ExecutorError::Exhausted {
                prompt_id: prompt.id.clone(),
            }),
        }
    }

    fn record(&self, prompt: &Prompt, model: &LlmModel, tools: &[ToolDescriptor], streaming: bool) {
        self.calls.lock().push(RecordedCall {
            prompt: prompt.clone(),
            model: model.clone(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            streaming,
        });
    }
}

#[async_trait]
impl PromptExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        prompt: &Prompt,
        model: &LlmModel,
        tools: &[ToolDescriptor],
    ) -> ExecutorResult<Vec<Message>> {
        self.record(prompt, model, tools, false);
        let messages = self.next(prompt)?;
        debug!(prompt_id = %prompt.id, model = %model, count = messages.len(), "scripted response");
        Ok(messages)
    }

    async fn execute_streaming(
        &self,
        prompt: &Prompt,
        model: &LlmModel,
    ) -> ExecutorResult<TextChunkStream> {
        self.record(prompt, model, &[], true);
        let messages = self.next(prompt)?;
        let text: String = messages
            .iter()
            .filter(|m| matches!(m, Message::Assistant { .. }))
            .filter_map(Message::text)
            .collect();

        let stream = async_stream::stream! {
            for chunk in text.split_inclusive(' ') {
                yield Ok(chunk.to_owned());
            }
        };
        Ok(Box::pin(stream))
    }
}
