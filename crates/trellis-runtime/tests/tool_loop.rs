//! The built-in single-run strategy driving tools end to end.

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use trellis_core::messages::{Message, ToolDescriptor};
use trellis_llm::ScriptedExecutor;
use trellis_pipeline::features::{EventLog, EventLogConfig};
use trellis_pipeline::{EventContext, EventKind, Feature};
use trellis_runtime::AgentOrchestrator;
use trellis_runtime::graph::nodes::single_run_strategy;
use trellis_tools::{Tool, ToolContext, ToolError};

#[derive(Deserialize)]
struct AddArgs {
    a: i64,
    b: i64,
}

struct Add;

#[async_trait]
impl Tool for Add {
    type Args = AddArgs;
    type Output = i64;

    fn name(&self) -> &str {
        "add"
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new("add", "Add two integers").with_parameters(json!({
            "type": "object",
            "properties": { "a": { "type": "integer" }, "b": { "type": "integer" } },
            "required": ["a", "b"]
        }))
    }

    async fn execute(&self, args: AddArgs, _ctx: &ToolContext) -> Result<i64, ToolError> {
        args.a
            .checked_add(args.b)
            .ok_or_else(|| ToolError::validation("sum overflows"))
    }
}

fn keep_history(config: &mut EventLogConfig) {
    config.keep_history = true;
}

#[tokio::test]
async fn model_calls_tools_then_answers() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .with_messages(vec![
                Message::tool_call(Some("c1".into()), "add", json!({"a": 2, "b": 3})),
                Message::tool_call(Some("c2".into()), "missing", json!({})),
            ])
            .with_text("The sum is 5"),
    );
    let agent = AgentOrchestrator::builder(single_run_strategy("chat").unwrap())
        .executor_arc(executor.clone())
        .tool(Add)
        .install::<EventLog>(keep_history)
        .unwrap()
        .build()
        .unwrap();

    let result = agent.run_and_get_result("What is 2 + 3?".into()).await.unwrap();
    assert_eq!(result.as_deref(), Some("The sum is 5"));

    let calls = executor.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].tool_names, ["add"]);
    let second = &calls[1].prompt.messages;
    assert_matches!(
        &second[second.len() - 2..],
        [
            Message::ToolResult { content: ok, is_error: false, .. },
            Message::ToolResult { content: missing, is_error: true, .. },
        ] if ok == "5" && missing == "Tool not found: missing"
    );

    let log = agent.feature(&EventLog::KEY).unwrap();
    assert_eq!(log.count(EventKind::ToolCall), 1);
    assert_eq!(log.count(EventKind::ToolCallResult), 1);
    assert_eq!(log.count(EventKind::BeforeLlmCall), 2);
    let tool_result = log
        .history()
        .into_iter()
        .find(|e| e.kind() == EventKind::ToolCallResult)
        .unwrap();
    assert_matches!(tool_result, EventContext::ToolCallResult { result, .. } if result == json!(5));
}

#[tokio::test]
async fn validation_failure_goes_back_to_the_model() {
    let executor = Arc::new(
        ScriptedExecutor::new()
            .with_messages(vec![Message::tool_call(
                None,
                "add",
                json!({"a": i64::MAX, "b": 1}),
            )])
            .with_text("I could not add those"),
    );
    let agent = AgentOrchestrator::builder(single_run_strategy("chat").unwrap())
        .executor_arc(executor.clone())
        .tool(Add)
        .install::<EventLog>(keep_history)
        .unwrap()
        .build()
        .unwrap();

    let result = agent.run_and_get_result("Add big numbers".into()).await.unwrap();
    assert_eq!(result.as_deref(), Some("I could not add those"));

    let log = agent.feature(&EventLog::KEY).unwrap();
    assert_eq!(log.count(EventKind::ToolValidationError), 1);
    assert_eq!(log.count(EventKind::ToolCallResult), 0);
    assert_matches!(
        executor.calls()[1].prompt.last(),
        Some(Message::ToolResult { is_error: true, content, .. }) if content.contains("sum overflows")
    );
}

#[tokio::test]
async fn response_with_neither_text_nor_tools_is_a_dead_end() {
    let agent = AgentOrchestrator::builder(single_run_strategy("chat").unwrap())
        .executor(ScriptedExecutor::new().with_messages(vec![]))
        .install::<EventLog>(keep_history)
        .unwrap()
        .build()
        .unwrap();

    let result = agent.run_and_get_result("hello?".into()).await.unwrap();
    assert!(result.is_none());
    let log = agent.feature(&EventLog::KEY).unwrap();
    assert_matches!(
        log.history().last(),
        Some(EventContext::AgentRunError { category, .. }) if category == "no_matching_edge"
    );
}
