//! # trellis-llm
//!
//! The language-model side of the engine, reduced to a contract.
//!
//! - [`PromptExecutor`]: what the runtime needs from any provider client
//!   (one-shot and streaming calls)
//! - [`ExecutorError`]: provider-agnostic failure taxonomy
//! - [`ScriptedExecutor`]: deterministic executor that replays queued
//!   responses, for tests and demos
//!
//! Concrete provider clients live outside this workspace and implement
//! [`PromptExecutor`].

#![deny(unsafe_code)]

pub mod errors;
pub mod executor;
pub mod scripted;

pub use errors::ExecutorError;
pub use executor::{ExecutorResult, PromptExecutor, TextChunkStream, collect_text};
pub use scripted::ScriptedExecutor;
