//! Agent orchestration: run lifecycle and the environment surface.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use trellis_core::messages::{Message, Prompt};
use trellis_core::now_rfc3339;
use trellis_llm::PromptExecutor;
use trellis_pipeline::{EventContext, Feature, FeatureKey, PipelineHub};
use trellis_tools::{ToolCallRequest, ToolCallResult, ToolRegistry};

use crate::agent::builder::AgentBuilder;
use crate::agent::context::AgentContext;
use crate::agent::environment::{AgentEnvironment, FinalMessage};
use crate::agent::llm_proxy::PipelineExecutor;
use crate::agent::llm_session::LlmSession;
use crate::agent::result_slot::RunResultSlot;
use crate::agent::session::SessionGuard;
use crate::agent::tool_dispatcher::ToolDispatcher;
use crate::errors::RuntimeError;
use crate::graph::{NodeData, Strategy};
use crate::types::AgentConfig;

struct RunHandle {
    environment: AgentEnvironment,
    cancellation: CancellationToken,
}

/// Clears the current run handle when the run ends, however it ends.
struct CurrentRun<'a>(&'a Mutex<Option<RunHandle>>);

impl<'a> CurrentRun<'a> {
    fn set(slot: &'a Mutex<Option<RunHandle>>, handle: RunHandle) -> Self {
        *slot.lock() = Some(handle);
        Self(slot)
    }
}

impl Drop for CurrentRun<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// Runs a strategy graph as an agent.
///
/// One run at a time: a second [`run`](Self::run) while one is in flight
/// fails immediately with [`RuntimeError::ConcurrentRun`].
pub struct AgentOrchestrator<I, O> {
    strategy: Arc<Strategy<I, O>>,
    executor: Arc<dyn PromptExecutor>,
    registry: Arc<ToolRegistry>,
    pipeline: Arc<PipelineHub>,
    config: AgentConfig,
    sessions: SessionGuard,
    current: Mutex<Option<RunHandle>>,
}

impl<I: NodeData, O: NodeData> AgentOrchestrator<I, O> {
    /// Start building an orchestrator around a strategy.
    pub fn builder(strategy: Strategy<I, O>) -> AgentBuilder<I, O> {
        AgentBuilder::new(strategy)
    }

    pub(crate) fn new(
        strategy: Strategy<I, O>,
        executor: Arc<dyn PromptExecutor>,
        registry: ToolRegistry,
        pipeline: PipelineHub,
        config: AgentConfig,
    ) -> Self {
        Self {
            strategy: Arc::new(strategy),
            executor,
            registry: Arc::new(registry),
            pipeline: Arc::new(pipeline),
            config,
            sessions: SessionGuard::new(),
            current: Mutex::new(None),
        }
    }

    /// Run to completion, discarding the result.
    pub async fn run(&self, input: I) -> Result<(), RuntimeError> {
        let _ = self.run_and_get_result(input).await?;
        Ok(())
    }

    /// Run to completion and return the terminated result.
    ///
    /// Strategy failures are reported through `AgentRunError` and resolve
    /// the run to `None`. A protocol violation is reported and also returned
    /// as `Err`.
    #[instrument(skip_all, fields(strategy = %self.strategy.name()))]
    pub async fn run_and_get_result(&self, input: I) -> Result<Option<String>, RuntimeError> {
        let ticket = self
            .sessions
            .try_acquire()
            .map_err(|running| RuntimeError::ConcurrentRun(running.to_string()))?;
        let session_id = ticket.session_id().clone();
        info!(session_id = %session_id, "run started");

        let cancellation = CancellationToken::new();
        let (slot, receiver) = RunResultSlot::channel();
        let dispatcher = ToolDispatcher::new(Arc::clone(&self.registry), Arc::clone(&self.pipeline))
            .with_max_parallel(self.config.max_parallel_tool_calls);
        let environment = AgentEnvironment::new(
            session_id.clone(),
            self.strategy.name().to_owned(),
            Arc::clone(&self.pipeline),
            dispatcher,
            cancellation.clone(),
            slot,
        );
        let current = CurrentRun::set(
            &self.current,
            RunHandle {
                environment: environment.clone(),
                cancellation: cancellation.clone(),
            },
        );

        let mut prompt = Prompt::new(session_id.to_string());
        if let Some(system) = &self.config.system_prompt {
            prompt.push(Message::system(system.clone()));
        }
        let llm = LlmSession::new(
            PipelineExecutor::new(
                Arc::clone(&self.executor),
                Arc::clone(&self.pipeline),
                session_id.clone(),
            ),
            self.config.model.clone(),
            self.registry.descriptors(),
            prompt,
        );
        let ctx = AgentContext::new(
            self.strategy.name().to_owned(),
            Arc::clone(&self.pipeline),
            llm,
            environment.clone(),
            cancellation,
        );

        let outcome = self.drive(input, &ctx).await;

        environment.close();
        drop(current);
        drop(ticket);

        outcome?;
        let result = receiver.wait().await;
        info!(session_id = %session_id, has_result = result.is_some(), "run finished");
        Ok(result)
    }

    async fn drive(&self, input: I, ctx: &AgentContext) -> Result<(), RuntimeError> {
        let walked = async {
            ctx.fire(EventContext::AgentStarted {
                session_id: ctx.session_id().to_string(),
                timestamp: now_rfc3339(),
                strategy: self.strategy.name().to_owned(),
                input: input.to_json(),
            })
            .await?;
            let output = self.strategy.execute(input, ctx).await?;
            ctx.environment()
                .send_termination(final_text(output.to_json()))
                .await
        }
        .await;

        let Err(e) = walked else {
            return Ok(());
        };
        error!(error = %e, category = e.category(), "run failed");
        if let Err(report) = ctx.environment().report_problem(&e).await {
            warn!(error = %report, "failed to report run error");
        }
        if e.is_fatal() { Err(e) } else { Ok(()) }
    }

    /// Execute tool calls in the current run.
    pub async fn execute_tools(
        &self,
        requests: Vec<ToolCallRequest>,
    ) -> Result<Vec<ToolCallResult>, RuntimeError> {
        self.current_environment()?.execute_tools(requests).await
    }

    /// Report a failure in the current run.
    pub async fn report_problem(&self, error: &RuntimeError) -> Result<(), RuntimeError> {
        self.current_environment()?.report_problem(error).await
    }

    /// Terminate the current run with a result.
    pub async fn send_termination(&self, result: Option<String>) -> Result<(), RuntimeError> {
        self.current_environment()?.send_termination(result).await
    }

    /// Deliver a final message to the current run.
    pub async fn deliver_final(&self, message: FinalMessage) -> Result<(), RuntimeError> {
        self.current_environment()?.deliver_final(message).await
    }

    /// Cancel the current run. Returns `false` if nothing is running.
    pub fn abort(&self) -> bool {
        match self.current.lock().as_ref() {
            Some(handle) => {
                warn!(session_id = %handle.environment.session_id(), "aborting run");
                handle.cancellation.cancel();
                true
            }
            None => false,
        }
    }

    /// Shut down installed features.
    pub fn close(&self) -> Result<(), RuntimeError> {
        self.pipeline.shutdown()?;
        Ok(())
    }

    /// Whether a run is in flight.
    pub fn is_running(&self) -> bool {
        self.sessions.is_running()
    }

    /// Session ID of the run in flight.
    pub fn current_session(&self) -> Option<trellis_core::ids::SessionId> {
        self.sessions.current_session()
    }

    /// The strategy this agent runs.
    pub fn strategy(&self) -> &Strategy<I, O> {
        &self.strategy
    }

    /// Effective configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The feature pipeline.
    pub fn pipeline(&self) -> &Arc<PipelineHub> {
        &self.pipeline
    }

    /// Look up an installed feature.
    pub fn feature<F: Feature>(&self, key: &FeatureKey<F>) -> Option<Arc<F>> {
        self.pipeline.lookup(key)
    }

    fn current_environment(&self) -> Result<AgentEnvironment, RuntimeError> {
        self.current
            .lock()
            .as_ref()
            .map(|handle| handle.environment.clone())
            .ok_or(RuntimeError::NoActiveSession)
    }
}

impl<I, O> std::fmt::Debug for AgentOrchestrator<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOrchestrator")
            .field("strategy", &self.strategy)
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

/// Text delivered for a strategy output: strings as-is, null as no result,
/// anything else as JSON.
fn final_text(output: Value) -> Option<String> {
    match output {
        Value::String(s) => Some(s),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
