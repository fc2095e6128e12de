//! # trellis-tools
//!
//! Tools are named capabilities the model can invoke with structured
//! arguments.
//!
//! - [`Tool`]: typed trait implemented by tool authors (argument and output
//!   types are checked by the compiler)
//! - [`DynTool`]: object-safe form stored in the registry; every [`Tool`]
//!   gets it through a blanket impl
//! - [`ToolRegistry`]: name-to-tool index handed to the dispatcher
//! - [`ToolError`]: explicit failure kinds, so callers handle decode,
//!   validation, and execution failures separately

#![deny(unsafe_code)]

pub mod errors;
pub mod registry;
pub mod traits;
pub mod types;

pub use errors::{ToolError, ToolErrorKind};
pub use registry::ToolRegistry;
pub use traits::{DecodedArgs, DynTool, Tool, ToolContext, ToolOutput};
pub use types::{ToolCallRequest, ToolCallResult};
