//! Domain layer: device model, presence transitions, and the registry.
//!
//! Everything in here is free of network I/O. The registry is the single
//! owner of device state; the clock is injected so presence timing can be
//! driven deterministically in tests.

pub mod clock;
pub mod device;
pub mod device_id;
pub mod registry;
pub mod transition;

pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{Control, Device, DeviceAddress, DeviceState, DeviceView};
pub use device_id::DeviceId;
pub use registry::{DeviceRegistry, PresenceThresholds};
pub use transition::Transition;
