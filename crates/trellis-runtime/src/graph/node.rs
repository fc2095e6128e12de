//! Node bodies and type-erased node values.

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::agent::AgentContext;
use crate::errors::RuntimeError;

/// A value that can flow along graph edges.
///
/// Implemented for every `Serialize + Send + 'static` type. The JSON form is
/// what lifecycle events carry.
pub trait NodeData: Any + Send {
    /// JSON form for events.
    fn to_json(&self) -> Value;
    /// Borrow as `Any` for edge predicates.
    fn as_any(&self) -> &dyn Any;
    /// Convert into `Any` for downcasting by value.
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
    /// Rust type name, used in mismatch errors.
    fn type_name(&self) -> &'static str;
}

impl<T> NodeData for T
where
    T: Serialize + Send + 'static,
{
    fn to_json(&self) -> Value {
        serde_json::to_value(self)
            .unwrap_or_else(|e| Value::String(format!("<unserializable: {e}>")))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Body of a node taking `A` and producing `B`.
#[async_trait]
pub trait NodeBody<A, B>: Send + Sync + 'static {
    /// Run the node.
    async fn execute(&self, input: A, ctx: &AgentContext) -> Result<B, RuntimeError>;
}

/// Node body backed by an async closure. Built by
/// [`StrategyBuilder::node_fn`](crate::graph::StrategyBuilder::node_fn).
pub struct FnNode<F>(pub(crate) F);

#[async_trait]
impl<A, B, F, Fut> NodeBody<A, B> for FnNode<F>
where
    A: Send + 'static,
    B: Send + 'static,
    F: Fn(A, AgentContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<B, RuntimeError>> + Send + 'static,
{
    async fn execute(&self, input: A, ctx: &AgentContext) -> Result<B, RuntimeError> {
        (self.0)(input, ctx.clone()).await
    }
}

/// Pass-through body used for the start and finish nodes.
pub(crate) struct Identity;

#[async_trait]
impl<A: Send + 'static> NodeBody<A, A> for Identity {
    async fn execute(&self, input: A, _ctx: &AgentContext) -> Result<A, RuntimeError> {
        Ok(input)
    }
}

/// Typed handle to a node inside a [`StrategyBuilder`].
///
/// `A` is the node's input type and `B` its output type; edges only
/// connect handles whose types line up.
pub struct NodeRef<A, B> {
    pub(crate) index: usize,
    _marker: PhantomData<fn(A) -> B>,
}

impl<A, B> NodeRef<A, B> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }
}

impl<A, B> Clone for NodeRef<A, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, B> Copy for NodeRef<A, B> {}

impl<A, B> std::fmt::Debug for NodeRef<A, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NodeRef").field(&self.index).finish()
    }
}

/// Object-safe node, erased over its input and output types.
#[async_trait]
pub(crate) trait ErasedNode: Send + Sync {
    async fn run(
        &self,
        name: &str,
        input: Box<dyn NodeData>,
        ctx: &AgentContext,
    ) -> Result<Box<dyn NodeData>, RuntimeError>;
}

pub(crate) struct TypedNode<A, B, N> {
    body: N,
    _marker: PhantomData<fn(A) -> B>,
}

impl<A, B, N> TypedNode<A, B, N> {
    pub(crate) fn new(body: N) -> Self {
        Self {
            body,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<A, B, N> ErasedNode for TypedNode<A, B, N>
where
    A: NodeData,
    B: NodeData,
    N: NodeBody<A, B>,
{
    async fn run(
        &self,
        name: &str,
        input: Box<dyn NodeData>,
        ctx: &AgentContext,
    ) -> Result<Box<dyn NodeData>, RuntimeError> {
        let input = input
            .into_any()
            .downcast::<A>()
            .map_err(|_| RuntimeError::TypeMismatch {
                node: name.to_owned(),
                expected: std::any::type_name::<A>(),
            })?;
        let output = self.body.execute(*input, ctx).await?;
        Ok(Box::new(output))
    }
}
