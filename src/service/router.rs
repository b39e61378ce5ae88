//! Inbound message dispatch.
//!
//! [`MessageRouter`] is stateless: it validates a frame, applies it to the
//! [`DeviceRegistry`], and hands any resulting event to the
//! [`Broadcaster`]. Validation happens before any mutation, so a rejected
//! message never leaves partial state behind.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::MutexGuard;

use super::broadcaster::Broadcaster;
use super::transport::DeviceTransport;
use crate::domain::device::DEFAULT_DEVICE_PORT;
use crate::domain::{Device, DeviceAddress, DeviceId, DeviceRegistry, Transition};
use crate::error::HubError;
use crate::ws::connection::ConnectionHandle;
use crate::ws::messages::{OutboundMessage, Request, decode_frame};

/// Maps each inbound message type to one registry action.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    registry: Arc<DeviceRegistry>,
    broadcaster: Broadcaster,
    transport: Arc<dyn DeviceTransport>,
    rejection_replies: bool,
}

impl MessageRouter {
    /// Creates a router with silent rejections.
    #[must_use]
    pub fn new(
        registry: Arc<DeviceRegistry>,
        broadcaster: Broadcaster,
        transport: Arc<dyn DeviceTransport>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            transport,
            rejection_replies: false,
        }
    }

    /// Enables or disables `error` replies to the sender of a rejected
    /// message.
    #[must_use]
    pub const fn with_rejection_replies(mut self, enabled: bool) -> Self {
        self.rejection_replies = enabled;
        self
    }

    /// Returns the registry this router mutates.
    #[must_use]
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Returns the broadcaster events are handed to.
    #[must_use]
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Handles one raw frame received on `origin`.
    ///
    /// Decode and validation failures are logged and dropped. Direct
    /// replies (and rejection notices, when enabled) are queued on
    /// `origin` only.
    pub async fn handle_frame(&self, origin: &ConnectionHandle, text: &str) {
        let request = match decode_frame(text).and_then(Request::try_from) {
            Ok(request) => request,
            Err(err) => {
                self.reject(origin, &err).await;
                return;
            }
        };
        tracing::debug!(connection_id = %origin.id(), message_type = request.kind(), "dispatching message");

        // A direct reply is queued before the guard drops, so it cannot
        // overtake a newer broadcast on the same connection.
        let _order = self.ordering_for(&request).await;
        match self.apply(request).await {
            Ok(Some(reply)) => self.reply(origin, &reply).await,
            Ok(None) => {}
            Err(err) => self.reject(origin, &err).await,
        }
    }

    /// Applies a validated request.
    ///
    /// Returns the direct reply for the sender, if the request has one.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDevice`], [`HubError::UnknownControl`],
    /// [`HubError::DeviceOffline`] or [`HubError::Delivery`] when the
    /// request cannot be applied. No broadcast happens in that case.
    pub async fn dispatch(&self, request: Request) -> Result<Option<OutboundMessage>, HubError> {
        let _order = self.ordering_for(&request).await;
        self.apply(request).await
    }

    /// Takes the broadcaster's ordering lock for requests that touch
    /// observer-visible state. Commands skip it since delivery may block
    /// on the device.
    async fn ordering_for(&self, request: &Request) -> Option<MutexGuard<'_, ()>> {
        match request {
            Request::SendCommand { .. } => None,
            _ => Some(self.broadcaster.ordered().await),
        }
    }

    async fn apply(&self, request: Request) -> Result<Option<OutboundMessage>, HubError> {
        match request {
            Request::RegisterDevice {
                device_id,
                name,
                ip_address,
                port,
                controls,
            } => {
                let name = name.unwrap_or_else(|| format!("Device-{device_id}"));
                let address = DeviceAddress::new(ip_address, port.unwrap_or(DEFAULT_DEVICE_PORT));
                self.registry
                    .register(device_id, name, address, controls)
                    .await;
                let devices = self.registry.snapshot().await;
                self.broadcaster.device_list(&devices).await;
                Ok(None)
            }
            Request::Heartbeat { device_id } => {
                if let Transition::BecameOnline(id) = self.registry.heartbeat(&device_id).await? {
                    self.broadcaster.device_status(&id, true).await;
                }
                Ok(None)
            }
            Request::ControlUpdate {
                device_id,
                control_id,
                value,
            } => {
                self.registry
                    .update_control(&device_id, &control_id, value.clone())
                    .await?;
                self.broadcaster
                    .control_update(&device_id, &control_id, value)
                    .await;
                Ok(None)
            }
            Request::GetDevices => {
                let devices = self.registry.snapshot().await;
                Ok(Some(OutboundMessage::DeviceList {
                    devices: devices.iter().map(Device::view).collect(),
                }))
            }
            Request::SendCommand { device_id, command } => {
                self.forward_command(&device_id, &command).await?;
                Ok(None)
            }
        }
    }

    async fn reject(&self, origin: &ConnectionHandle, err: &HubError) {
        match err {
            HubError::Parse(reason) => {
                tracing::warn!(connection_id = %origin.id(), %reason, "dropping malformed frame");
            }
            other => {
                tracing::warn!(connection_id = %origin.id(), error = %other, "rejected message");
            }
        }
        if self.rejection_replies {
            self.reply(origin, &OutboundMessage::rejection(err)).await;
        }
    }

    async fn reply(&self, origin: &ConnectionHandle, message: &OutboundMessage) {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "failed to encode reply");
                return;
            }
        };
        if let Err(err) = origin.send(frame, self.broadcaster.write_timeout()).await {
            tracing::warn!(connection_id = %origin.id(), error = %err, "failed to queue reply");
        }
    }

    /// Forwards `command` to an online device through the transport.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDevice`] if the device is not registered,
    /// [`HubError::DeviceOffline`] if it is offline, or the transport's
    /// [`HubError::Delivery`] error.
    pub async fn forward_command(
        &self,
        device_id: &DeviceId,
        command: &Value,
    ) -> Result<(), HubError> {
        let device = self
            .registry
            .get(device_id)
            .await
            .ok_or_else(|| HubError::UnknownDevice(device_id.clone()))?;
        if !device.state.is_online() {
            return Err(HubError::DeviceOffline(device_id.clone()));
        }
        tracing::info!(%device_id, address = %device.address, "forwarding command");
        self.transport.push(&device.address, command).await
    }
}
