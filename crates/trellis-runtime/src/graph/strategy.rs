//! Built strategy graphs and the walk that executes them.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, instrument};
use trellis_core::now_rfc3339;
use trellis_pipeline::EventContext;

use crate::agent::AgentContext;
use crate::errors::RuntimeError;
use crate::graph::node::{ErasedNode, NodeData};

pub(crate) type AcceptFn = Box<dyn Fn(&dyn Any) -> bool + Send + Sync>;
pub(crate) type TransformFn = Box<dyn Fn(&dyn Any) -> Option<Box<dyn NodeData>> + Send + Sync>;

pub(crate) struct NodeSlot {
    pub(crate) name: String,
    pub(crate) body: Arc<dyn ErasedNode>,
}

pub(crate) struct Edge {
    pub(crate) to: usize,
    pub(crate) accept: AcceptFn,
    pub(crate) transform: TransformFn,
}

const START: usize = 0;
const FINISH: usize = 1;

enum WalkState {
    At(usize, Box<dyn NodeData>),
    Finished(Box<dyn NodeData>),
}

/// An immutable strategy graph taking `I` and producing `O`.
///
/// Built once with [`StrategyBuilder`](crate::StrategyBuilder) and shared
/// across runs.
pub struct Strategy<I, O> {
    name: String,
    nodes: Vec<NodeSlot>,
    edges: Vec<Vec<Edge>>,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I: NodeData, O: NodeData> Strategy<I, O> {
    pub(crate) fn new(name: String, nodes: Vec<NodeSlot>, edges: Vec<Vec<Edge>>) -> Self {
        Self {
            name,
            nodes,
            edges,
            _marker: PhantomData,
        }
    }

    /// Strategy name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node names in declaration order (start and finish first).
    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    /// Walk the graph from start to finish.
    ///
    /// At each node: check cancellation, fire `BeforeNode`, run the body,
    /// fire `AfterNode`, then follow the first outgoing edge whose predicate
    /// accepts the output. Arriving at the finish node ends the walk.
    #[instrument(skip_all, fields(strategy = %self.name, session_id = %ctx.session_id()))]
    pub async fn execute(&self, input: I, ctx: &AgentContext) -> Result<O, RuntimeError> {
        ctx.fire(EventContext::StrategyStarted {
            session_id: ctx.session_id().to_string(),
            timestamp: now_rfc3339(),
            strategy: self.name.clone(),
        })
        .await?;

        let mut state = WalkState::At(START, Box::new(input));
        let output = loop {
            state = match state {
                WalkState::At(FINISH, value) => WalkState::Finished(value),
                WalkState::At(index, value) => self.step(index, value, ctx).await?,
                WalkState::Finished(value) => break value,
            };
        };

        ctx.fire(EventContext::StrategyFinished {
            session_id: ctx.session_id().to_string(),
            timestamp: now_rfc3339(),
            strategy: self.name.clone(),
            result: output.to_json(),
        })
        .await?;

        output
            .into_any()
            .downcast::<O>()
            .map(|o| *o)
            .map_err(|_| RuntimeError::TypeMismatch {
                node: self.nodes[FINISH].name.clone(),
                expected: std::any::type_name::<O>(),
            })
    }

    #[instrument(skip_all, fields(node = %self.nodes[index].name))]
    async fn step(
        &self,
        index: usize,
        input: Box<dyn NodeData>,
        ctx: &AgentContext,
    ) -> Result<WalkState, RuntimeError> {
        if ctx.cancellation().is_cancelled() {
            return Err(RuntimeError::Cancelled);
        }

        let slot = &self.nodes[index];
        let input_json = input.to_json();
        ctx.fire(EventContext::BeforeNode {
            session_id: ctx.session_id().to_string(),
            timestamp: now_rfc3339(),
            node: slot.name.clone(),
            input: input_json.clone(),
        })
        .await?;

        let output = slot.body.run(&slot.name, input, ctx).await?;

        ctx.fire(EventContext::AfterNode {
            session_id: ctx.session_id().to_string(),
            timestamp: now_rfc3339(),
            node: slot.name.clone(),
            input: input_json,
            output: output.to_json(),
        })
        .await?;

        self.select_edge(index, output)
    }

    fn select_edge(
        &self,
        index: usize,
        output: Box<dyn NodeData>,
    ) -> Result<WalkState, RuntimeError> {
        let from = &self.nodes[index].name;
        for edge in &self.edges[index] {
            if !(edge.accept)(output.as_any()) {
                continue;
            }
            let next = (edge.transform)(output.as_any()).ok_or_else(|| {
                RuntimeError::TypeMismatch {
                    node: from.clone(),
                    expected: output.type_name(),
                }
            })?;
            debug!(from = %from, to = %self.nodes[edge.to].name, "edge selected");
            return Ok(WalkState::At(edge.to, next));
        }
        Err(RuntimeError::NoMatchingEdge { node: from.clone() })
    }
}

impl<I, O> std::fmt::Debug for Strategy<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Strategy")
            .field("name", &self.name)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}
