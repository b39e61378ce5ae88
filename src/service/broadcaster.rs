//! Fan-out of outbound messages to every live connection.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};

use crate::domain::{Device, DeviceId};
use crate::ws::connection::ConnectionManager;
use crate::ws::messages::OutboundMessage;

/// Delivery counts for one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the frame was queued on.
    pub delivered: usize,
    /// Connections that failed and were removed.
    pub failed: usize,
}

/// Writes one message to every connection in a fresh snapshot of the
/// live set.
///
/// A failing connection is logged and removed; it never stops delivery to
/// the others and never surfaces as an error to the caller.
///
/// Clones share one ordering lock. Every path that mutates the registry
/// holds it from the mutation until the resulting frames are queued, so
/// observers see events in the order the registry applied them.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    connections: Arc<ConnectionManager>,
    write_timeout: Duration,
    order: Arc<Mutex<()>>,
}

impl Broadcaster {
    /// Creates a broadcaster over `connections`, bounding each write by
    /// `write_timeout`.
    #[must_use]
    pub fn new(connections: Arc<ConnectionManager>, write_timeout: Duration) -> Self {
        Self {
            connections,
            write_timeout,
            order: Arc::new(Mutex::new(())),
        }
    }

    /// Waits for the ordering lock shared by all clones.
    ///
    /// Not reentrant: the broadcast methods do not take it themselves.
    pub async fn ordered(&self) -> MutexGuard<'_, ()> {
        self.order.lock().await
    }

    /// Returns the connection manager this broadcaster reads from.
    #[must_use]
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Returns the per-write timeout.
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Sends `message` to every live connection.
    pub async fn broadcast(&self, message: &OutboundMessage) -> BroadcastReport {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "dropping broadcast");
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        for conn in self.connections.snapshot().await {
            match conn.send(Arc::clone(&frame), self.write_timeout).await {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    tracing::warn!(connection_id = %conn.id(), error = %err, "broadcast write failed; dropping connection");
                    self.connections.close(conn.id()).await;
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            delivered = report.delivered,
            failed = report.failed,
            "broadcast complete"
        );
        report
    }

    /// Broadcasts the full device list.
    pub async fn device_list(&self, devices: &[Device]) -> BroadcastReport {
        let message = OutboundMessage::DeviceList {
            devices: devices.iter().map(Device::view).collect(),
        };
        self.broadcast(&message).await
    }

    /// Broadcasts a single device's online status.
    pub async fn device_status(&self, device_id: &DeviceId, online: bool) -> BroadcastReport {
        let message = OutboundMessage::DeviceStatus {
            device_id: device_id.clone(),
            online,
        };
        self.broadcast(&message).await
    }

    /// Broadcasts a single control value change.
    pub async fn control_update(
        &self,
        device_id: &DeviceId,
        control_id: &str,
        value: Value,
    ) -> BroadcastReport {
        let message = OutboundMessage::ControlUpdate {
            device_id: device_id.clone(),
            control_id: control_id.to_string(),
            value,
        };
        self.broadcast(&message).await
    }
}
