//! Agent construction.

use std::sync::Arc;

use tracing::debug;
use trellis_core::messages::LlmModel;
use trellis_llm::PromptExecutor;
use trellis_pipeline::{Feature, PipelineHub};
use trellis_tools::{Tool, ToolRegistry};

use crate::agent::orchestrator::AgentOrchestrator;
use crate::errors::RuntimeError;
use crate::graph::{NodeData, Strategy};
use crate::types::AgentConfig;

/// Builder for [`AgentOrchestrator`].
///
/// Features can only be installed here; the pipeline is frozen once
/// [`build`](Self::build) returns.
pub struct AgentBuilder<I, O> {
    strategy: Strategy<I, O>,
    executor: Option<Arc<dyn PromptExecutor>>,
    registry: ToolRegistry,
    pipeline: PipelineHub,
    config: AgentConfig,
}

impl<I: NodeData, O: NodeData> AgentBuilder<I, O> {
    pub(crate) fn new(strategy: Strategy<I, O>) -> Self {
        Self {
            strategy,
            executor: None,
            registry: ToolRegistry::new(),
            pipeline: PipelineHub::new(),
            config: AgentConfig::default(),
        }
    }

    /// Prompt executor every LLM node calls through.
    #[must_use]
    pub fn executor(self, executor: impl PromptExecutor + 'static) -> Self {
        self.executor_arc(Arc::new(executor))
    }

    /// Shared prompt executor.
    #[must_use]
    pub fn executor_arc(mut self, executor: Arc<dyn PromptExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Model override.
    #[must_use]
    pub fn model(mut self, model: LlmModel) -> Self {
        self.config.model = model;
        self
    }

    /// System prompt seeded into each run.
    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Cap on concurrently executing tool calls.
    #[must_use]
    pub fn max_parallel_tool_calls(mut self, max: usize) -> Self {
        self.config.max_parallel_tool_calls = Some(max);
        self
    }

    /// Replace the tool registry.
    #[must_use]
    pub fn tools(mut self, registry: ToolRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Register one tool.
    #[must_use]
    pub fn tool<T: Tool>(mut self, tool: T) -> Self {
        self.registry.register(tool);
        self
    }

    /// Install a feature. Fails if a feature with the same key is already
    /// installed.
    pub fn install<F: Feature>(
        mut self,
        configure: impl FnOnce(&mut F::Config),
    ) -> Result<Self, RuntimeError> {
        let _ = self.pipeline.install::<F>(configure)?;
        Ok(self)
    }

    /// Finish building.
    pub fn build(self) -> Result<AgentOrchestrator<I, O>, RuntimeError> {
        let executor = self
            .executor
            .ok_or_else(|| RuntimeError::Config("a prompt executor is required".into()))?;
        if self.config.max_parallel_tool_calls == Some(0) {
            return Err(RuntimeError::Config(
                "maxParallelToolCalls must be at least 1".into(),
            ));
        }
        debug!(
            strategy = %self.strategy.name(),
            tools = self.registry.len(),
            features = ?self.pipeline.feature_names(),
            "agent built"
        );
        Ok(AgentOrchestrator::new(
            self.strategy,
            executor,
            self.registry,
            self.pipeline,
            self.config,
        ))
    }
}

impl<I, O> std::fmt::Debug for AgentBuilder<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("strategy", &self.strategy)
            .field("config", &self.config)
            .field("tools", &self.registry)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}
