//! # devhub
//!
//! Presence registry and real-time relay for networked devices.
//!
//! Devices register themselves, report liveness through heartbeats, and
//! publish control changes. Observers (dashboards, controllers) hold a
//! persistent connection and receive broadcasts of the device list,
//! online/offline transitions, and control updates. Commands sent by
//! observers are forwarded to online devices through a pluggable
//! transport.
//!
//! ## Architecture
//!
//! ```text
//! Observers (WebSocket, line-delimited TCP)
//!     │
//!     ├── Session loops + ConnectionManager (ws/)
//!     │
//!     ├── MessageRouter ──► DeviceTransport (service/)
//!     ├── Broadcaster  ◄── PresenceMonitor (service/)
//!     │
//!     └── DeviceRegistry + Clock (domain/)
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod server;
pub mod service;
pub mod ws;
