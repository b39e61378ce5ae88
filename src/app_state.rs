//! Shared application state injected into all Axum handlers and
//! connection loops.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::HubConfig;
use crate::domain::{Clock, DeviceRegistry};
use crate::service::{
    Broadcaster, DeviceTransport, LoggingTransport, MessageRouter, PresenceMonitor,
    TcpDeviceTransport, TransportKind,
};
use crate::ws::connection::ConnectionManager;
use crate::ws::session::SessionLimits;

/// Shared state available to every handler via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Authoritative device store.
    pub registry: Arc<DeviceRegistry>,
    /// Live observer connections.
    pub connections: Arc<ConnectionManager>,
    /// Inbound message dispatcher.
    pub router: Arc<MessageRouter>,
    /// Presence sweep task, started by the server.
    pub presence: PresenceMonitor,
    /// Per-connection I/O bounds.
    pub limits: SessionLimits,
    /// Process-wide shutdown signal.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wires all components together from `config`.
    #[must_use]
    pub fn new(
        config: &HubConfig,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn DeviceTransport>,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::new(
            config.thresholds(),
            Arc::clone(&clock),
        ));
        let connections = Arc::new(ConnectionManager::new(config.outbound_queue_capacity));
        let broadcaster = Broadcaster::new(Arc::clone(&connections), config.write_timeout);
        let router = Arc::new(
            MessageRouter::new(Arc::clone(&registry), broadcaster.clone(), transport)
                .with_rejection_replies(config.rejection_replies),
        );
        let presence = PresenceMonitor::new(
            Arc::clone(&registry),
            broadcaster,
            clock,
            config.sweep_interval,
        );

        Self {
            registry,
            connections,
            router,
            presence,
            limits: config.session_limits(),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Builds the command transport selected by `config`.
#[must_use]
pub fn command_transport(config: &HubConfig) -> Arc<dyn DeviceTransport> {
    match config.command_transport {
        TransportKind::Log => Arc::new(LoggingTransport),
        TransportKind::Tcp => Arc::new(TcpDeviceTransport::new(config.command_timeout)),
    }
}
