//! Agent runtime: the orchestrator and everything a run carries.

pub mod builder;
pub mod context;
pub mod environment;
pub mod llm_proxy;
pub mod llm_session;
pub mod orchestrator;
pub mod result_slot;
pub mod session;
pub mod storage;
pub mod tool_dispatcher;

pub use builder::AgentBuilder;
pub use context::AgentContext;
pub use environment::{AgentEnvironment, FinalMessage, TERMINATION_RESULT_ARG, TERMINATION_TOOL};
pub use llm_proxy::{PipelineExecutor, ProxyChunkStream};
pub use llm_session::LlmSession;
pub use orchestrator::AgentOrchestrator;
pub use result_slot::{RunResultReceiver, RunResultSlot};
pub use session::{SessionGuard, SessionTicket};
pub use storage::{AgentStorage, StorageKey};
pub use tool_dispatcher::ToolDispatcher;
