//! These models represent the objects exchanged with the remote agents
//! service:
//! - resource handles (agent definition, thread, files, vector stores)
//!   returned by create calls and passed back for deletes
//! - thread messages and their content parts, as they appear in message
//!   payloads and streaming deltas
//! - tool definitions declared at agent creation, and the tool call /
//!   tool output pairs exchanged while a run is suspended on local work
//! - the streaming event union decoded from server-sent events
//!
//! Everything here converts to and from the service wire format with serde;
//! the rest of the crate works with these structs only.

pub mod agent;
pub mod event;
pub mod message;
pub mod tool;
