//! Ready-made nodes for tool-calling chat loops.

use async_trait::async_trait;
use trellis_core::messages::Message;
use trellis_tools::{ToolCallRequest, ToolCallResult};

use crate::agent::AgentContext;
use crate::errors::RuntimeError;
use crate::graph::builder::StrategyBuilder;
use crate::graph::node::{NodeBody, NodeData, NodeRef};
use crate::graph::strategy::Strategy;

/// Appends its input as a user message and asks the model, offering tools.
#[derive(Clone, Copy, Debug, Default)]
pub struct LlmRequest;

#[async_trait]
impl NodeBody<String, Vec<Message>> for LlmRequest {
    async fn execute(&self, input: String, ctx: &AgentContext) -> Result<Vec<Message>, RuntimeError> {
        ctx.llm().append_user(input);
        ctx.llm().request().await
    }
}

/// Like [`LlmRequest`], without offering tools.
#[derive(Clone, Copy, Debug, Default)]
pub struct LlmRequestWithoutTools;

#[async_trait]
impl NodeBody<String, Vec<Message>> for LlmRequestWithoutTools {
    async fn execute(&self, input: String, ctx: &AgentContext) -> Result<Vec<Message>, RuntimeError> {
        ctx.llm().append_user(input);
        ctx.llm().request_without_tools().await
    }
}

/// Runs a batch of tool calls through the environment.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecuteToolCalls;

#[async_trait]
impl NodeBody<Vec<ToolCallRequest>, Vec<ToolCallResult>> for ExecuteToolCalls {
    async fn execute(
        &self,
        input: Vec<ToolCallRequest>,
        ctx: &AgentContext,
    ) -> Result<Vec<ToolCallResult>, RuntimeError> {
        ctx.environment().execute_tools(input).await
    }
}

/// Appends tool results to the prompt and asks the model again.
#[derive(Clone, Copy, Debug, Default)]
pub struct SendToolResults;

#[async_trait]
impl NodeBody<Vec<ToolCallResult>, Vec<Message>> for SendToolResults {
    async fn execute(
        &self,
        input: Vec<ToolCallResult>,
        ctx: &AgentContext,
    ) -> Result<Vec<Message>, RuntimeError> {
        ctx.llm().append(input.iter().map(ToolCallResult::to_message));
        ctx.llm().request().await
    }
}

/// Tool calls contained in a model response.
pub fn tool_calls_of(messages: &[Message]) -> Vec<ToolCallRequest> {
    messages.iter().filter_map(ToolCallRequest::from_message).collect()
}

/// Assistant text of a model response, if it has any.
pub fn assistant_text_of(messages: &[Message]) -> Option<String> {
    let text: Vec<&str> = messages
        .iter()
        .filter_map(|m| match m {
            Message::Assistant { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    (!text.is_empty()).then(|| text.join("\n"))
}

/// The standard single-run loop: ask the model; while it calls tools, run
/// them and send the results back; finish with its text answer.
pub fn single_run_strategy(name: impl Into<String>) -> Result<Strategy<String, String>, RuntimeError> {
    let mut b = StrategyBuilder::<String, String>::new(name);
    let start = b.start();
    let finish = b.finish();
    let request = b.node("llmRequest", LlmRequest);
    let execute = b.node("executeTools", ExecuteToolCalls);
    let send = b.node("sendToolResults", SendToolResults);

    b.forward(start, request);
    route_response(&mut b, request, execute, finish);
    b.forward(execute, send);
    route_response(&mut b, send, execute, finish);
    b.build()
}

fn route_response<A: NodeData>(
    b: &mut StrategyBuilder<String, String>,
    from: NodeRef<A, Vec<Message>>,
    execute: NodeRef<Vec<ToolCallRequest>, Vec<ToolCallResult>>,
    finish: NodeRef<String, String>,
) {
    b.edge(
        from,
        execute,
        |messages: &Vec<Message>| messages.iter().any(Message::is_tool_call),
        |messages: &Vec<Message>| tool_calls_of(messages),
    );
    b.edge(
        from,
        finish,
        |messages: &Vec<Message>| assistant_text_of(messages).is_some(),
        |messages: &Vec<Message>| assistant_text_of(messages).unwrap_or_default(),
    );
}
