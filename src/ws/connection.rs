//! Live observer connections.
//!
//! [`ConnectionManager`] owns the set of open connections. Each entry is a
//! [`ConnectionHandle`]: a bounded outbound queue drained by that
//! connection's writer task plus an explicit [`ConnectionState`]. Nothing
//! outside this module mutates the set directly.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};

use super::messages::Frame;
use crate::error::HubError;

/// Unique identifier of one observer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    /// Creates a new random `ConnectionId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Accepting outbound frames.
    Open = 0,
    /// Removed from the live set; the writer is draining.
    Closing = 1,
    /// Writer finished; the transport is released.
    Closed = 2,
}

impl ConnectionState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Cheap, cloneable handle to one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Frame>,
    state: Arc<AtomicU8>,
}

impl ConnectionHandle {
    /// Returns the connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` while the connection accepts frames.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Queues a frame for this connection's writer.
    ///
    /// Waits at most `timeout` for queue space.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Transport`] if the connection is not open, its
    /// writer has gone away, or the queue stayed full for `timeout`.
    pub async fn send(&self, frame: Frame, timeout: Duration) -> Result<(), HubError> {
        if !self.is_open() {
            return Err(HubError::Transport(format!("connection {} is closing", self.id)));
        }
        self.outbound
            .send_timeout(frame, timeout)
            .await
            .map_err(|err| match err {
                mpsc::error::SendTimeoutError::Timeout(_) => {
                    HubError::Transport(format!("connection {} write timed out", self.id))
                }
                mpsc::error::SendTimeoutError::Closed(_) => {
                    HubError::Transport(format!("connection {} writer closed", self.id))
                }
            })
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Marks the connection fully closed once its transport is released.
    pub fn mark_closed(&self) {
        self.set_state(ConnectionState::Closed);
    }
}

/// Owner of the live-connection set.
#[derive(Debug)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    queue_capacity: usize,
}

impl ConnectionManager {
    /// Creates an empty manager whose connections buffer up to
    /// `queue_capacity` outbound frames each.
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Registers a new open connection.
    ///
    /// Returns its handle and the receiving end of its outbound queue,
    /// which the caller's writer task must drain.
    pub async fn open(&self) -> (ConnectionHandle, mpsc::Receiver<Frame>) {
        let (outbound, rx) = mpsc::channel(self.queue_capacity);
        let handle = ConnectionHandle {
            id: ConnectionId::new(),
            outbound,
            state: Arc::new(AtomicU8::new(ConnectionState::Open as u8)),
        };
        let mut map = self.connections.write().await;
        map.insert(handle.id, handle.clone());
        tracing::debug!(connection_id = %handle.id, live = map.len(), "connection opened");
        (handle, rx)
    }

    /// Removes a connection from the live set and marks it closing.
    ///
    /// Returns `false` if it was already removed.
    pub async fn close(&self, id: ConnectionId) -> bool {
        let mut map = self.connections.write().await;
        let Some(handle) = map.remove(&id) else {
            return false;
        };
        if handle.state() == ConnectionState::Open {
            handle.set_state(ConnectionState::Closing);
        }
        tracing::debug!(connection_id = %id, live = map.len(), "connection removed");
        true
    }

    /// Removes every connection. Used on shutdown.
    pub async fn close_all(&self) -> usize {
        let mut map = self.connections.write().await;
        let count = map.len();
        for (_, handle) in map.drain() {
            if handle.state() == ConnectionState::Open {
                handle.set_state(ConnectionState::Closing);
            }
        }
        count
    }

    /// Returns a point-in-time copy of the live set.
    pub async fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Returns `true` if the connection is in the live set.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Returns the number of live connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if there are no live connections.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
