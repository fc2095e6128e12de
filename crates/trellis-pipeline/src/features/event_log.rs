//! Event log feature.
//!
//! Logs selected lifecycle events through `tracing` and keeps per-kind
//! counters. With `keep_history` it also retains every payload in order,
//! which makes it the standard way to assert on event sequences in tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::errors::HandlerError;
use crate::feature::{Feature, FeatureKey, HandlerRegistrar};
use crate::handler::EventHandler;
use crate::types::{EventContext, EventKind};

/// Configuration for [`EventLog`].
#[derive(Clone, Debug, Default)]
pub struct EventLogConfig {
    /// Kinds to observe. `None` observes every kind.
    pub kinds: Option<Vec<EventKind>>,
    /// Retain every observed payload.
    pub keep_history: bool,
}

/// Logs and counts lifecycle events.
pub struct EventLog {
    config: EventLogConfig,
    counts: Mutex<HashMap<EventKind, u64>>,
    history: Mutex<Vec<EventContext>>,
}

impl EventLog {
    /// Number of events of a kind observed so far.
    pub fn count(&self, kind: EventKind) -> u64 {
        self.counts.lock().get(&kind).copied().unwrap_or(0)
    }

    /// Total number of events observed.
    pub fn total(&self) -> u64 {
        self.counts.lock().values().sum()
    }

    /// Retained payloads, in dispatch order. Empty unless `keep_history`.
    pub fn history(&self) -> Vec<EventContext> {
        self.history.lock().clone()
    }

    /// Kinds of the retained payloads, in dispatch order.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.history.lock().iter().map(EventContext::kind).collect()
    }

    /// Drop retained payloads and counters.
    pub fn clear(&self) {
        self.counts.lock().clear();
        self.history.lock().clear();
    }

    fn observe(&self, context: &EventContext) {
        let kind = context.kind();
        *self.counts.lock().entry(kind).or_insert(0) += 1;
        if self.config.keep_history {
            self.history.lock().push(context.clone());
        }

        let session_id = context.session_id();
        match context {
            EventContext::AgentStarted { strategy, .. } => {
                info!(session_id, strategy = %strategy, "agent started");
            }
            EventContext::AgentFinished { result, .. } => {
                info!(session_id, has_result = result.is_some(), "agent finished");
            }
            EventContext::AgentRunError { category, error, .. } => {
                warn!(session_id, category = %category, error = %error, "agent run error");
            }
            EventContext::ToolValidationError { tool_name, error, .. }
            | EventContext::ToolCallFailure { tool_name, error, .. } => {
                warn!(session_id, event = %kind, tool = %tool_name, error = %error, "tool call failed");
            }
            _ => {
                debug!(
                    session_id,
                    event = %kind,
                    node = context.node(),
                    tool = context.tool_name(),
                    "pipeline event"
                );
            }
        }
    }
}

struct EventLogHandler(Arc<EventLog>);

#[async_trait]
impl EventHandler for EventLogHandler {
    async fn handle(&self, context: &EventContext) -> Result<(), HandlerError> {
        self.0.observe(context);
        Ok(())
    }
}

impl Feature for EventLog {
    type Config = EventLogConfig;
    const KEY: FeatureKey<Self> = FeatureKey::new("trellis.event-log");

    fn create(config: EventLogConfig) -> Self {
        Self {
            config,
            counts: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    fn register(feature: &Arc<Self>, registrar: &mut HandlerRegistrar<'_>) {
        let kinds = feature
            .config
            .kinds
            .clone()
            .unwrap_or_else(|| EventKind::all().to_vec());
        for kind in kinds {
            registrar.on(kind, EventLogHandler(Arc::clone(feature)));
        }
    }

    fn shutdown(&self) -> Result<(), HandlerError> {
        info!(total = self.total(), "event log closed");
        Ok(())
    }
}
