//! # trellis-pipeline
//!
//! Cross-cutting interception for agent runs.
//!
//! A [`Feature`] is installed once into a [`PipelineHub`] while the agent is
//! being built. During installation it registers [`EventHandler`]s for any
//! subset of the fixed [`EventKind`]s. At run time the hub dispatches every
//! lifecycle event to the registered handlers strictly in registration
//! order; the first handler failure aborts the dispatch and is returned to
//! the caller, so a feature can veto a run.
//!
//! Features are retrieved later through their typed [`FeatureKey`], which
//! hands back the concrete feature type without any downcasting at the call
//! site.

#![deny(unsafe_code)]

pub mod errors;
pub mod feature;
pub mod features;
pub mod handler;
pub mod hub;
pub mod types;

pub use errors::{HandlerError, PipelineError};
pub use feature::{Feature, FeatureKey, HandlerRegistrar};
pub use handler::{EventHandler, FnHandler, handler_fn};
pub use hub::PipelineHub;
pub use types::{EventContext, EventKind};
