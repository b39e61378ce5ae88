//! Service layer: message dispatch, broadcast fan-out, presence sweeps,
//! and command delivery.
//!
//! [`MessageRouter`] turns inbound messages into registry operations,
//! [`Broadcaster`] pushes the resulting events to observers, and
//! [`PresenceMonitor`] drives timeout transitions on its own schedule.

pub mod broadcaster;
pub mod presence;
pub mod router;
pub mod transport;

pub use broadcaster::{BroadcastReport, Broadcaster};
pub use presence::PresenceMonitor;
pub use router::MessageRouter;
pub use transport::{DeviceTransport, LoggingTransport, TcpDeviceTransport, TransportKind};
