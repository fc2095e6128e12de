//! # trellis-runtime
//!
//! The agent execution engine.
//!
//! - **Strategy graph**: typed nodes joined by accept/transform edges, built
//!   with [`StrategyBuilder`] and walked one node at a time; the first
//!   accepting edge in declaration order wins
//! - **Tool dispatcher**: runs a batch of tool calls as independent tasks and
//!   returns one uniform result per call, in request order
//! - **Orchestrator**: single-flight run lifecycle, the event-firing executor
//!   proxy, and the environment contract (`execute_tools`, `report_problem`,
//!   `send_termination`) that nodes use
//!
//! Lifecycle events flow through a frozen
//! [`PipelineHub`](trellis_pipeline::PipelineHub); features observe them and
//! may veto a run by failing a handler.

#![deny(unsafe_code)]

pub mod agent;
pub mod errors;
pub mod graph;
pub mod types;

pub use agent::{
    AgentBuilder, AgentContext, AgentEnvironment, AgentOrchestrator, AgentStorage, FinalMessage,
    LlmSession, PipelineExecutor, SessionGuard, StorageKey, TERMINATION_RESULT_ARG,
    TERMINATION_TOOL, ToolDispatcher,
};
pub use errors::RuntimeError;
pub use graph::{NodeBody, NodeData, NodeRef, Strategy, StrategyBuilder};
pub use types::AgentConfig;
