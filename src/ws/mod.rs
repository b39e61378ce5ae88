//! Observer transport layer: connections, framing, and session loops.
//!
//! Observers connect either through the WebSocket endpoint (`/` or `/ws`)
//! or, when enabled, through the line-delimited TCP listener. Both feed
//! the same session loop and the same live-connection set.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod session;
pub mod tcp;
