//! The environment contract nodes use to act on the outside world.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use trellis_core::ids::SessionId;
use trellis_core::messages::Message;
use trellis_core::now_rfc3339;
use trellis_pipeline::{EventContext, PipelineHub};
use trellis_tools::{ToolCallRequest, ToolCallResult};

use crate::agent::result_slot::RunResultSlot;
use crate::agent::tool_dispatcher::ToolDispatcher;
use crate::errors::RuntimeError;

/// Name of the tool call that carries a run's final result.
pub const TERMINATION_TOOL: &str = "__terminate__";

/// Argument of [`TERMINATION_TOOL`] holding the result string.
pub const TERMINATION_RESULT_ARG: &str = "result";

/// What a run's final delivery contains.
#[derive(Clone, Debug, PartialEq)]
pub enum FinalMessage {
    /// A message expected to be a termination tool call.
    Content(Message),
    /// An error reported instead of a result.
    Error(String),
}

struct EnvironmentInner {
    session_id: SessionId,
    strategy: String,
    pipeline: Arc<PipelineHub>,
    dispatcher: ToolDispatcher,
    cancellation: CancellationToken,
    slot: RunResultSlot,
}

/// Per-run environment.
///
/// Cloning is cheap; every clone refers to the same run and the same
/// single-assignment result.
#[derive(Clone)]
pub struct AgentEnvironment {
    inner: Arc<EnvironmentInner>,
}

impl AgentEnvironment {
    pub(crate) fn new(
        session_id: SessionId,
        strategy: String,
        pipeline: Arc<PipelineHub>,
        dispatcher: ToolDispatcher,
        cancellation: CancellationToken,
        slot: RunResultSlot,
    ) -> Self {
        Self {
            inner: Arc::new(EnvironmentInner {
                session_id,
                strategy,
                pipeline,
                dispatcher,
                cancellation,
                slot,
            }),
        }
    }

    /// Session this environment belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Resolve the run to `None` unless it already has a result.
    pub(crate) fn close(&self) {
        self.inner.slot.close();
    }

    /// Whether the run's result has already been delivered.
    pub fn is_terminated(&self) -> bool {
        self.inner.slot.is_resolved()
    }

    /// Execute a batch of tool calls. See [`ToolDispatcher::dispatch`].
    pub async fn execute_tools(
        &self,
        requests: Vec<ToolCallRequest>,
    ) -> Result<Vec<ToolCallResult>, RuntimeError> {
        self.inner
            .dispatcher
            .dispatch(requests, &self.inner.session_id, &self.inner.cancellation)
            .await
    }

    /// Fire `AgentRunError` for a failure.
    #[instrument(skip_all, fields(session_id = %self.inner.session_id, category = error.category()))]
    pub async fn report_problem(&self, error: &RuntimeError) -> Result<(), RuntimeError> {
        warn!(error = %error, "run failed");
        self.inner
            .pipeline
            .dispatch(&EventContext::AgentRunError {
                session_id: self.inner.session_id.to_string(),
                timestamp: now_rfc3339(),
                category: error.category().to_owned(),
                error: error.to_string(),
            })
            .await?;
        Ok(())
    }

    /// Deliver the run's result as a termination tool call.
    pub async fn send_termination(&self, result: Option<String>) -> Result<(), RuntimeError> {
        let mut args = Map::new();
        let _ = args.insert(
            TERMINATION_RESULT_ARG.to_owned(),
            result.map_or(Value::Null, Value::String),
        );
        self.deliver_final(FinalMessage::Content(Message::tool_call(
            None,
            TERMINATION_TOOL,
            Value::Object(args),
        )))
        .await
    }

    /// Deliver a final message.
    ///
    /// Content must be a [`TERMINATION_TOOL`] call whose
    /// [`TERMINATION_RESULT_ARG`] is a string or null; anything else is a
    /// protocol violation. Only the first valid delivery of a run resolves
    /// it and fires `AgentFinished`; later ones are ignored. An error is
    /// reported through `AgentRunError` and never resolves the run.
    #[instrument(skip_all, fields(session_id = %self.inner.session_id))]
    pub async fn deliver_final(&self, message: FinalMessage) -> Result<(), RuntimeError> {
        let message = match message {
            FinalMessage::Error(text) => {
                return self
                    .report_problem(&RuntimeError::Reported {
                        category: "environment".into(),
                        message: text,
                    })
                    .await;
            }
            FinalMessage::Content(message) => message,
        };

        let result = termination_result(&message)?;

        let Some(sender) = self.inner.slot.claim() else {
            warn!("run already terminated, ignoring final message");
            return Ok(());
        };

        info!(has_result = result.is_some(), "run terminated");
        // A vetoed AgentFinished drops the sender so the run resolves to None.
        self.inner
            .pipeline
            .dispatch(&EventContext::AgentFinished {
                session_id: self.inner.session_id.to_string(),
                timestamp: now_rfc3339(),
                strategy: self.inner.strategy.clone(),
                result: result.clone(),
            })
            .await?;
        let _ = sender.send(result);
        Ok(())
    }
}

fn termination_result(message: &Message) -> Result<Option<String>, RuntimeError> {
    let Message::ToolCall { tool, args, .. } = message else {
        return Err(RuntimeError::ProtocolViolation(format!(
            "final message must be a '{TERMINATION_TOOL}' tool call, got {}",
            message.role()
        )));
    };
    if tool != TERMINATION_TOOL {
        return Err(RuntimeError::ProtocolViolation(format!(
            "final tool call must be '{TERMINATION_TOOL}', got '{tool}'"
        )));
    }
    match args.get(TERMINATION_RESULT_ARG) {
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Null) => Ok(None),
        Some(other) => Err(RuntimeError::ProtocolViolation(format!(
            "'{TERMINATION_RESULT_ARG}' must be a string or null, got {other}"
        ))),
        None => Err(RuntimeError::ProtocolViolation(format!(
            "termination call is missing '{TERMINATION_RESULT_ARG}'"
        ))),
    }
}

impl std::fmt::Debug for AgentEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentEnvironment")
            .field("session_id", &self.inner.session_id)
            .field("strategy", &self.inner.strategy)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::result_slot::RunResultReceiver;
    use assert_matches::assert_matches;
    use serde_json::json;
    use trellis_pipeline::EventKind;
    use trellis_pipeline::features::{EventLog, EventLogConfig};
    use trellis_tools::ToolRegistry;

    fn environment() -> (AgentEnvironment, RunResultReceiver, Arc<EventLog>) {
        let mut hub = PipelineHub::new();
        let log = hub
            .install::<EventLog>(|c: &mut EventLogConfig| c.keep_history = true)
            .unwrap();
        let hub = Arc::new(hub);
        let dispatcher = ToolDispatcher::new(Arc::new(ToolRegistry::new()), Arc::clone(&hub));
        let (slot, rx) = RunResultSlot::channel();
        let env = AgentEnvironment::new(
            SessionId::new(),
            "test".into(),
            hub,
            dispatcher,
            CancellationToken::new(),
            slot,
        );
        (env, rx, log)
    }

    #[tokio::test]
    async fn first_termination_wins() {
        let (env, rx, log) = environment();
        env.send_termination(Some("first".into())).await.unwrap();
        env.send_termination(Some("second".into())).await.unwrap();

        assert!(env.is_terminated());
        assert_eq!(rx.wait().await.as_deref(), Some("first"));
        assert_eq!(log.count(EventKind::AgentFinished), 1);
    }

    #[tokio::test]
    async fn null_result_terminates_with_none() {
        let (env, rx, _log) = environment();
        env.send_termination(None).await.unwrap();
        assert_eq!(rx.wait().await, None);
    }

    #[tokio::test]
    async fn wrong_tool_is_protocol_violation() {
        let (env, _rx, log) = environment();
        let message = Message::tool_call(None, "search", json!({ "result": "x" }));
        let err = env.deliver_final(FinalMessage::Content(message)).await.unwrap_err();
        assert_matches!(err, RuntimeError::ProtocolViolation(m) if m.contains("search"));
        assert!(!env.is_terminated());
        assert_eq!(log.total(), 0);
    }

    #[tokio::test]
    async fn missing_or_non_string_result_is_protocol_violation() {
        let (env, _rx, _log) = environment();
        for args in [json!({}), json!({ "result": 42 })] {
            let message = Message::tool_call(None, TERMINATION_TOOL, args);
            let err = env.deliver_final(FinalMessage::Content(message)).await.unwrap_err();
            assert_matches!(err, RuntimeError::ProtocolViolation(_));
        }
        let err = env
            .deliver_final(FinalMessage::Content(Message::assistant("done")))
            .await
            .unwrap_err();
        assert_matches!(err, RuntimeError::ProtocolViolation(_));
    }

    #[tokio::test]
    async fn error_final_reports_and_leaves_slot_open() {
        let (env, _rx, log) = environment();
        env.deliver_final(FinalMessage::Error("backend went away".into()))
            .await
            .unwrap();
        assert!(!env.is_terminated());
        assert_matches!(
            &log.history()[..],
            [EventContext::AgentRunError { category, error, .. }]
                if category == "environment" && error.contains("backend went away")
        );
    }
}
