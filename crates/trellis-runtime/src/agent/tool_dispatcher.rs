//! Parallel tool call dispatch.
//!
//! Every request in a batch runs concurrently on the caller's task, so
//! dropping the batch drops every call still in flight. A failing, panicking,
//! or unknown tool only affects its own result; the batch always yields one
//! [`ToolCallResult`] per request, in request order.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};
use trellis_core::ids::SessionId;
use trellis_core::now_rfc3339;
use trellis_pipeline::{EventContext, PipelineError, PipelineHub};
use trellis_tools::{
    ToolCallRequest, ToolCallResult, ToolContext, ToolError, ToolErrorKind, ToolRegistry,
};

use crate::errors::RuntimeError;

/// Executes batches of tool calls against a registry.
#[derive(Clone, Debug)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    pipeline: Arc<PipelineHub>,
    limiter: Option<Arc<Semaphore>>,
}

type CallOutcome = (ToolCallResult, Option<PipelineError>);

impl ToolDispatcher {
    /// Create an unbounded dispatcher.
    pub fn new(registry: Arc<ToolRegistry>, pipeline: Arc<PipelineHub>) -> Self {
        Self {
            registry,
            pipeline,
            limiter: None,
        }
    }

    /// Cap the number of calls executing at once. `None` is unbounded.
    #[must_use]
    pub fn with_max_parallel(mut self, max: Option<usize>) -> Self {
        self.limiter = max.map(|n| Arc::new(Semaphore::new(n.max(1))));
        self
    }

    /// Execute a batch of tool calls.
    ///
    /// Per call: resolve the tool (unknown names become an error result and
    /// fire nothing), decode the arguments (failures likewise fire nothing),
    /// fire `ToolCall`, execute, then fire exactly one of
    /// `ToolValidationError`, `ToolCallFailure`, or `ToolCallResult`.
    ///
    /// Returns `Err` only when a feature handler failed during the batch;
    /// the whole batch still runs to completion first. Dropping the returned
    /// future cancels the calls that have not finished.
    #[instrument(skip_all, fields(session_id = %session_id, calls = requests.len()))]
    pub async fn dispatch(
        &self,
        requests: Vec<ToolCallRequest>,
        session_id: &SessionId,
        cancellation: &CancellationToken,
    ) -> Result<Vec<ToolCallResult>, RuntimeError> {
        let calls = requests.iter().cloned().map(|request| {
            self.run_one(request, session_id.clone(), cancellation.clone())
        });
        let outcomes = join_all(calls).await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut first_failure = None;
        for (result, failure) in outcomes {
            if first_failure.is_none() {
                first_failure = failure;
            }
            results.push(result);
        }

        match first_failure {
            Some(e) => Err(e.into()),
            None => Ok(results),
        }
    }

    #[instrument(skip_all, fields(tool_name = %request.tool_name))]
    async fn run_one(
        &self,
        request: ToolCallRequest,
        session_id: SessionId,
        cancellation: CancellationToken,
    ) -> CallOutcome {
        let tool = match self.registry.get_tool(&request.tool_name) {
            Ok(tool) => tool,
            Err(e) => {
                warn!(tool_name = %request.tool_name, "tool not found");
                return (ToolCallResult::error(&request, e.to_string()), None);
            }
        };

        let args = match tool.decode(&request.args) {
            Ok(args) => args,
            Err(e) => {
                debug!(error = %e, "argument decode failed");
                return (ToolCallResult::error(&request, e.to_string()), None);
            }
        };

        let _permit = match &self.limiter {
            Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
            None => None,
        };

        if cancellation.is_cancelled() {
            return (ToolCallResult::error(&request, "Tool call cancelled"), None);
        }

        if let Err(e) = self
            .fire(EventContext::ToolCall {
                session_id: session_id.to_string(),
                timestamp: now_rfc3339(),
                call_id: request.call_id.clone(),
                tool_name: request.tool_name.clone(),
                args: request.args.clone(),
            })
            .await
        {
            return (ToolCallResult::error(&request, e.to_string()), Some(e));
        }

        let ctx = ToolContext {
            call_id: request.call_id.clone(),
            session_id: session_id.clone(),
            cancellation,
        };
        let outcome = AssertUnwindSafe(tool.execute_decoded(args, &ctx))
            .catch_unwind()
            .await;

        let (result, event) = match outcome {
            Ok(Ok(output)) => {
                let event = EventContext::ToolCallResult {
                    session_id: session_id.to_string(),
                    timestamp: now_rfc3339(),
                    call_id: request.call_id.clone(),
                    tool_name: request.tool_name.clone(),
                    args: request.args.clone(),
                    result: output.value.clone(),
                };
                (ToolCallResult::success(&request, output), event)
            }
            Ok(Err(e)) => failure_event(&request, &session_id, &e),
            Err(panic) => {
                let message = format!("Tool '{}' panicked: {}", request.tool_name, panic_message(&*panic));
                error!(tool_name = %request.tool_name, %message, "tool panicked");
                let e = ToolError::Internal { message };
                failure_event(&request, &session_id, &e)
            }
        };

        let failure = self.fire(event).await.err();
        (result, failure)
    }

    async fn fire(&self, event: EventContext) -> Result<(), PipelineError> {
        self.pipeline.dispatch(&event).await
    }
}

fn failure_event(
    request: &ToolCallRequest,
    session_id: &SessionId,
    e: &ToolError,
) -> (ToolCallResult, EventContext) {
    let result = ToolCallResult::error(request, e.to_string());
    let event = if e.kind() == ToolErrorKind::Validation {
        EventContext::ToolValidationError {
            session_id: session_id.to_string(),
            timestamp: now_rfc3339(),
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            args: request.args.clone(),
            error: e.to_string(),
        }
    } else {
        EventContext::ToolCallFailure {
            session_id: session_id.to_string(),
            timestamp: now_rfc3339(),
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            args: request.args.clone(),
            error: e.to_string(),
        }
    };
    (result, event)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde::Deserialize;
    use serde_json::json;
    use trellis_core::messages::ToolDescriptor;
    use trellis_pipeline::features::{EventLog, EventLogConfig};
    use trellis_pipeline::{EventKind, Feature, FeatureKey, HandlerError, HandlerRegistrar};
    use trellis_tools::Tool;

    #[derive(Deserialize)]
    struct EchoArgs {
        text: String,
        #[serde(default)]
        delay_ms: u64,
    }

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        type Args = EchoArgs;
        type Output = String;

        fn name(&self) -> &str {
            "echo"
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("echo", "Echo text back")
        }

        async fn execute(&self, args: EchoArgs, _ctx: &ToolContext) -> Result<String, ToolError> {
            tokio::time::sleep(Duration::from_millis(args.delay_ms)).await;
            if args.text.is_empty() {
                return Err(ToolError::validation("text must not be empty"));
            }
            Ok(args.text)
        }
    }

    struct Explode;

    #[async_trait]
    impl Tool for Explode {
        type Args = serde_json::Value;
        type Output = ();

        fn name(&self) -> &str {
            "explode"
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("explode", "Always panics")
        }

        async fn execute(&self, _args: serde_json::Value, _ctx: &ToolContext) -> Result<(), ToolError> {
            panic!("kaboom");
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        type Args = serde_json::Value;
        type Output = ();

        fn name(&self) -> &str {
            "broken"
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new("broken", "Always fails")
        }

        async fn execute(&self, _args: serde_json::Value, _ctx: &ToolContext) -> Result<(), ToolError> {
            Err(ToolError::execution("disk full"))
        }
    }

    struct VetoTools;

    impl Feature for VetoTools {
        type Config = ();
        const KEY: FeatureKey<Self> = FeatureKey::new("test.veto-tools");

        fn create((): ()) -> Self {
            Self
        }

        fn register(_feature: &Arc<Self>, registrar: &mut HandlerRegistrar<'_>) {
            registrar.on_fn(EventKind::ToolCall, |ctx| match ctx.tool_name() {
                Some("broken") => Err(HandlerError::new("broken is not allowed")),
                _ => Ok(()),
            });
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::new().with(Echo).with(Explode).with(Broken))
    }

    fn dispatcher_with_log() -> (ToolDispatcher, Arc<EventLog>) {
        let mut hub = PipelineHub::new();
        let log = hub
            .install::<EventLog>(|c: &mut EventLogConfig| c.keep_history = true)
            .unwrap();
        (ToolDispatcher::new(registry(), Arc::new(hub)), log)
    }

    async fn dispatch(
        dispatcher: &ToolDispatcher,
        requests: Vec<ToolCallRequest>,
    ) -> Result<Vec<ToolCallResult>, RuntimeError> {
        dispatcher
            .dispatch(requests, &SessionId::new(), &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn unknown_tool_yields_error_without_events() {
        let (dispatcher, log) = dispatcher_with_log();
        let results = dispatch(&dispatcher, vec![ToolCallRequest::new("missing", json!({}))])
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_error);
        assert_eq!(results[0].message, "Tool not found: missing");
        assert_eq!(log.total(), 0);
    }

    #[tokio::test]
    async fn decode_failure_fires_nothing() {
        let (dispatcher, log) = dispatcher_with_log();
        let results = dispatch(&dispatcher, vec![ToolCallRequest::new("echo", json!({"text": 5}))])
            .await
            .unwrap();
        assert!(results[0].is_error);
        assert!(results[0].message.contains("invalid arguments for 'echo'"));
        assert_eq!(log.total(), 0);
    }

    #[tokio::test]
    async fn validation_and_success_events() {
        let (dispatcher, log) = dispatcher_with_log();
        let results = dispatch(
            &dispatcher,
            vec![
                ToolCallRequest::new("echo", json!({"text": ""})).with_call_id("c1"),
                ToolCallRequest::new("echo", json!({"text": "hi"})).with_call_id("c2"),
            ],
        )
        .await
        .unwrap();

        assert!(results[0].is_error);
        assert_eq!(results[1].message, "hi");
        assert_eq!(results[1].typed_result, Some(json!("hi")));
        assert_eq!(log.count(EventKind::ToolCall), 2);
        assert_eq!(log.count(EventKind::ToolValidationError), 1);
        assert_eq!(log.count(EventKind::ToolCallResult), 1);
        assert_eq!(log.count(EventKind::ToolCallFailure), 0);
    }

    #[tokio::test]
    async fn panic_is_isolated_to_its_call() {
        let (dispatcher, log) = dispatcher_with_log();
        let results = dispatch(
            &dispatcher,
            vec![
                ToolCallRequest::new("explode", json!({})),
                ToolCallRequest::new("broken", json!({})),
                ToolCallRequest::new("echo", json!({"text": "survivor"})),
            ],
        )
        .await
        .unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_error);
        assert!(results[0].message.contains("kaboom"));
        assert!(results[1].is_error);
        assert!(results[1].message.contains("disk full"));
        assert!(!results[2].is_error);
        assert_eq!(log.count(EventKind::ToolCallFailure), 2);
        assert_eq!(log.count(EventKind::ToolCallResult), 1);
    }

    #[tokio::test]
    async fn vetoed_call_still_completes_batch() {
        let mut hub = PipelineHub::new();
        let _ = hub.install::<VetoTools>(|_| {}).unwrap();
        let dispatcher = ToolDispatcher::new(registry(), Arc::new(hub));

        let err = dispatch(
            &dispatcher,
            vec![
                ToolCallRequest::new("echo", json!({"text": "fine"})),
                ToolCallRequest::new("broken", json!({})),
            ],
        )
        .await
        .unwrap_err();
        assert_matches!(err, RuntimeError::Pipeline(PipelineError::Handler { .. }));
    }

    #[tokio::test]
    async fn cancelled_batch_skips_execution() {
        let (dispatcher, log) = dispatcher_with_log();
        let token = CancellationToken::new();
        token.cancel();
        let results = dispatcher
            .dispatch(
                vec![ToolCallRequest::new("echo", json!({"text": "hi"}))],
                &SessionId::new(),
                &token,
            )
            .await
            .unwrap();
        assert!(results[0].is_error);
        assert_eq!(log.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_batch_stops_its_calls() {
        let (dispatcher, log) = dispatcher_with_log();
        let batch = dispatch(
            &dispatcher,
            vec![ToolCallRequest::new("echo", json!({"text": "late", "delay_ms": 100}))],
        );
        assert!(tokio::time::timeout(Duration::from_millis(20), batch).await.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(log.count(EventKind::ToolCall), 1);
        assert_eq!(log.count(EventKind::ToolCallResult), 0);
        assert_eq!(log.total(), 1);
    }

    #[tokio::test]
    async fn limiter_still_runs_every_call() {
        let dispatcher =
            ToolDispatcher::new(registry(), Arc::new(PipelineHub::new())).with_max_parallel(Some(1));
        let requests = (0..4)
            .map(|i| ToolCallRequest::new("echo", json!({"text": format!("t{i}"), "delay_ms": 5})))
            .collect();
        let results = dispatch(&dispatcher, requests).await.unwrap();
        let messages: Vec<_> = results.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["t0", "t1", "t2", "t3"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn results_follow_request_order(delays in proptest::collection::vec(0_u64..15, 1..8)) {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .enable_time()
                .build()
                .unwrap();
            let dispatcher = ToolDispatcher::new(registry(), Arc::new(PipelineHub::new()));
            let requests: Vec<_> = delays
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    ToolCallRequest::new("echo", json!({"text": format!("call-{i}"), "delay_ms": d}))
                        .with_call_id(format!("id-{i}"))
                })
                .collect();

            let results = runtime.block_on(dispatch(&dispatcher, requests)).unwrap();
            prop_assert_eq!(results.len(), delays.len());
            for (i, result) in results.iter().enumerate() {
                prop_assert_eq!(&result.message, &format!("call-{i}"));
                prop_assert_eq!(result.call_id.as_ref().map(|c| c.as_str().to_owned()), Some(format!("id-{i}")));
            }
        }
    }
}
