//! Typed strategy graph builder.

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::agent::AgentContext;
use crate::errors::RuntimeError;
use crate::graph::node::{ErasedNode, FnNode, Identity, NodeBody, NodeData, NodeRef, TypedNode};
use crate::graph::strategy::{Edge, NodeSlot, Strategy};

/// Name of the implicit entry node.
pub const START_NODE: &str = "start";
/// Name of the implicit exit node.
pub const FINISH_NODE: &str = "finish";

/// Builds a [`Strategy`] taking `I` and producing `O`.
///
/// ```ignore
/// let mut b = StrategyBuilder::<String, String>::new("echo");
/// let shout = b.node_fn("shout", |s: String, _ctx| async move { Ok(s.to_uppercase()) });
/// b.forward(b.start(), shout);
/// b.forward(shout, b.finish());
/// let strategy = b.build()?;
/// ```
pub struct StrategyBuilder<I, O> {
    name: String,
    nodes: Vec<NodeSlot>,
    edges: Vec<Vec<Edge>>,
    foreign_edges: usize,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I: NodeData, O: NodeData> StrategyBuilder<I, O> {
    /// Start a graph with its start and finish nodes in place.
    pub fn new(name: impl Into<String>) -> Self {
        let mut builder = Self {
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            foreign_edges: 0,
            _marker: PhantomData,
        };
        let _ = builder.push(START_NODE, Arc::new(TypedNode::<I, I, _>::new(Identity)));
        let _ = builder.push(FINISH_NODE, Arc::new(TypedNode::<O, O, _>::new(Identity)));
        builder
    }

    /// Handle to the entry node. Passes the run input through unchanged.
    pub fn start(&self) -> NodeRef<I, I> {
        NodeRef::new(0)
    }

    /// Handle to the exit node. Reaching it ends the walk with the value
    /// carried in.
    pub fn finish(&self) -> NodeRef<O, O> {
        NodeRef::new(1)
    }

    /// Add a node with an explicit body.
    pub fn node<A, B, N>(&mut self, name: impl Into<String>, body: N) -> NodeRef<A, B>
    where
        A: NodeData,
        B: NodeData,
        N: NodeBody<A, B>,
    {
        let index = self.push(name, Arc::new(TypedNode::<A, B, N>::new(body)));
        NodeRef::new(index)
    }

    /// Add a node backed by an async closure.
    pub fn node_fn<A, B, F, Fut>(&mut self, name: impl Into<String>, f: F) -> NodeRef<A, B>
    where
        A: NodeData,
        B: NodeData,
        F: Fn(A, AgentContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<B, RuntimeError>> + Send + 'static,
    {
        self.node(name, FnNode(f))
    }

    /// Connect two nodes with an edge that accepts when `accept` holds and
    /// hands `transform(output)` to the target.
    ///
    /// Edges from one node are tried in the order they are declared.
    pub fn edge<A, B, C, D>(
        &mut self,
        from: NodeRef<A, B>,
        to: NodeRef<C, D>,
        accept: impl Fn(&B) -> bool + Send + Sync + 'static,
        transform: impl Fn(&B) -> C + Send + Sync + 'static,
    ) where
        B: NodeData,
        C: NodeData,
    {
        if from.index >= self.nodes.len() || to.index >= self.nodes.len() {
            self.foreign_edges += 1;
            return;
        }
        let edge = Edge {
            to: to.index,
            accept: Box::new(move |value: &dyn Any| {
                value.downcast_ref::<B>().is_some_and(&accept)
            }),
            transform: Box::new(move |value: &dyn Any| {
                value
                    .downcast_ref::<B>()
                    .map(|b| Box::new(transform(b)) as Box<dyn NodeData>)
            }),
        };
        self.edges[from.index].push(edge);
    }

    /// Unconditional edge passing the output through.
    pub fn forward<A, B, C>(&mut self, from: NodeRef<A, B>, to: NodeRef<B, C>)
    where
        B: NodeData + Clone,
    {
        self.edge(from, to, |_| true, B::clone);
    }

    /// Conditional edge passing the output through.
    pub fn edge_when<A, B, C>(
        &mut self,
        from: NodeRef<A, B>,
        to: NodeRef<B, C>,
        accept: impl Fn(&B) -> bool + Send + Sync + 'static,
    ) where
        B: NodeData + Clone,
    {
        self.edge(from, to, accept, B::clone);
    }

    /// Unconditional edge transforming the output.
    pub fn edge_map<A, B, C, D>(
        &mut self,
        from: NodeRef<A, B>,
        to: NodeRef<C, D>,
        transform: impl Fn(&B) -> C + Send + Sync + 'static,
    ) where
        B: NodeData,
        C: NodeData,
    {
        self.edge(from, to, |_| true, transform);
    }

    /// Validate and freeze the graph.
    ///
    /// Rejects edges touching nodes of another builder, duplicate node names,
    /// edges leaving the finish node, a finish node that cannot be reached,
    /// and reachable nodes with no way out.
    pub fn build(self) -> Result<Strategy<I, O>, RuntimeError> {
        if self.foreign_edges > 0 {
            return Err(RuntimeError::InvalidGraph(format!(
                "{} edge(s) reference nodes outside this graph",
                self.foreign_edges
            )));
        }

        let mut seen = HashSet::new();
        for slot in &self.nodes {
            if !seen.insert(slot.name.as_str()) {
                return Err(RuntimeError::InvalidGraph(format!(
                    "duplicate node name '{}'",
                    slot.name
                )));
            }
        }

        let finish = 1;
        if !self.edges[finish].is_empty() {
            return Err(RuntimeError::InvalidGraph(
                "the finish node cannot have outgoing edges".into(),
            ));
        }

        let mut reachable = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([0_usize]);
        reachable[0] = true;
        while let Some(index) = queue.pop_front() {
            for edge in &self.edges[index] {
                if !reachable[edge.to] {
                    reachable[edge.to] = true;
                    queue.push_back(edge.to);
                }
            }
        }

        for (index, slot) in self.nodes.iter().enumerate() {
            if reachable[index] && index != finish && self.edges[index].is_empty() {
                return Err(RuntimeError::InvalidGraph(format!(
                    "node '{}' has no outgoing edge",
                    slot.name
                )));
            }
        }
        if !reachable[finish] {
            return Err(RuntimeError::InvalidGraph(
                "the finish node is not reachable from start".into(),
            ));
        }

        debug!(strategy = %self.name, nodes = self.nodes.len(), "strategy built");
        Ok(Strategy::new(self.name, self.nodes, self.edges))
    }

    fn push(&mut self, name: impl Into<String>, body: Arc<dyn ErasedNode>) -> usize {
        self.nodes.push(NodeSlot {
            name: name.into(),
            body,
        });
        self.edges.push(Vec::new());
        self.nodes.len() - 1
    }
}
