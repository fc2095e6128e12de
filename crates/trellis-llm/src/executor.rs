//! The prompt executor contract.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use trellis_core::messages::{LlmModel, Message, Prompt, ToolDescriptor};

use crate::errors::ExecutorError;

/// Result alias for executor calls.
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Finite, non-restartable stream of text chunks.
pub type TextChunkStream = Pin<Box<dyn Stream<Item = ExecutorResult<String>> + Send>>;

/// Language-model invocation contract.
///
/// Implementors must be `Send + Sync`; the runtime shares one executor
/// across every node of a run behind an `Arc`.
#[async_trait]
pub trait PromptExecutor: Send + Sync {
    /// Run the prompt to completion and return the response messages.
    ///
    /// A response may contain plain assistant text, tool calls, or both.
    async fn execute(
        &self,
        prompt: &Prompt,
        model: &LlmModel,
        tools: &[ToolDescriptor],
    ) -> ExecutorResult<Vec<Message>>;

    /// Stream the response text without tool support.
    async fn execute_streaming(
        &self,
        prompt: &Prompt,
        model: &LlmModel,
    ) -> ExecutorResult<TextChunkStream>;
}

/// Drain a chunk stream into one string, stopping at the first error.
pub async fn collect_text(mut stream: TextChunkStream) -> ExecutorResult<String> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        text.push_str(&chunk?);
    }
    Ok(text)
}
