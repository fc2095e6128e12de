//! # trellis-core
//!
//! Foundation types shared by every Trellis crate.
//!
//! - **Branded IDs**: [`SessionId`](ids::SessionId) and
//!   [`ToolCallId`](ids::ToolCallId) as newtypes for type safety
//! - **Messages**: the small [`Message`](messages::Message) /
//!   [`Prompt`](messages::Prompt) vocabulary the engine needs to talk to a
//!   prompt executor
//! - **Tool descriptors**: [`ToolDescriptor`](messages::ToolDescriptor), the
//!   schema handed to the model
//! - **Logging**: `tracing` subscriber setup and in-memory capture for tests

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod messages;

/// Current UTC time as an RFC 3339 string (used for event timestamps).
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
