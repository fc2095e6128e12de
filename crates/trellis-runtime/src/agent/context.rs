//! Per-run context handed to every node.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use trellis_core::ids::SessionId;
use trellis_pipeline::{EventContext, Feature, FeatureKey, PipelineHub};

use crate::agent::environment::AgentEnvironment;
use crate::agent::llm_session::LlmSession;
use crate::agent::storage::AgentStorage;
use crate::errors::RuntimeError;

struct ContextInner {
    session_id: SessionId,
    strategy: String,
    pipeline: Arc<PipelineHub>,
    llm: LlmSession,
    environment: AgentEnvironment,
    storage: AgentStorage,
    cancellation: CancellationToken,
}

/// Everything a node can reach during a run.
///
/// Cheap to clone; all clones share the run's state.
#[derive(Clone)]
pub struct AgentContext {
    inner: Arc<ContextInner>,
}

impl AgentContext {
    pub(crate) fn new(
        strategy: String,
        pipeline: Arc<PipelineHub>,
        llm: LlmSession,
        environment: AgentEnvironment,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                session_id: environment.session_id().clone(),
                strategy,
                pipeline,
                llm,
                environment,
                storage: AgentStorage::new(),
                cancellation,
            }),
        }
    }

    /// Session of the current run.
    pub fn session_id(&self) -> &SessionId {
        &self.inner.session_id
    }

    /// Name of the strategy being run.
    pub fn strategy_name(&self) -> &str {
        &self.inner.strategy
    }

    /// The run's conversation and model access.
    pub fn llm(&self) -> &LlmSession {
        &self.inner.llm
    }

    /// Tool execution, problem reporting, and termination.
    pub fn environment(&self) -> &AgentEnvironment {
        &self.inner.environment
    }

    /// Scratch storage shared by the run's nodes.
    pub fn storage(&self) -> &AgentStorage {
        &self.inner.storage
    }

    /// The agent's feature pipeline.
    pub fn pipeline(&self) -> &Arc<PipelineHub> {
        &self.inner.pipeline
    }

    /// Look up an installed feature.
    pub fn feature<F: Feature>(&self, key: &FeatureKey<F>) -> Option<Arc<F>> {
        self.inner.pipeline.lookup(key)
    }

    /// Cancelled when the run is aborted.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    pub(crate) async fn fire(&self, event: EventContext) -> Result<(), RuntimeError> {
        self.inner.pipeline.dispatch(&event).await?;
        Ok(())
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("session_id", &self.inner.session_id)
            .field("strategy", &self.inner.strategy)
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::test_support::context;
    use trellis_llm::ScriptedExecutor;
    use trellis_pipeline::features::EventLog;
    use trellis_pipeline::{Feature, PipelineHub};
    use trellis_tools::ToolRegistry;

    use crate::agent::storage::StorageKey;

    const NOTES: StorageKey<Vec<String>> = StorageKey::new("notes");

    #[tokio::test]
    async fn context_exposes_run_state() {
        let mut hub = PipelineHub::new();
        let _ = hub.install::<EventLog>(|_| {}).unwrap();
        let (ctx, _rx) = context(Arc::new(ScriptedExecutor::new()), ToolRegistry::new(), hub);

        assert_eq!(ctx.session_id(), ctx.environment().session_id());
        assert_eq!(ctx.strategy_name(), "test");
        assert!(ctx.feature(&EventLog::KEY).is_some());
        assert!(!ctx.cancellation().is_cancelled());

        let clone = ctx.clone();
        clone.storage().set(&NOTES, vec!["a".into()]).await;
        assert_eq!(ctx.storage().get(&NOTES).await, Some(vec!["a".to_string()]));
    }
}
