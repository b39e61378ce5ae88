//! Presence transitions produced by registry operations.

use super::DeviceId;

/// Outcome of a registry operation that may change a device's presence.
///
/// [`super::DeviceRegistry::sweep`] never yields [`Transition::NoChange`];
/// it only reports devices whose state actually moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The device was already in the reported state.
    NoChange,
    /// An offline device was heard from again.
    BecameOnline(DeviceId),
    /// An online device exceeded the offline threshold.
    BecameOffline(DeviceId),
    /// The device exceeded the eviction threshold and was removed.
    Evicted(DeviceId),
}

impl Transition {
    /// Returns the device this transition concerns, if any.
    #[must_use]
    pub const fn device_id(&self) -> Option<&DeviceId> {
        match self {
            Self::NoChange => None,
            Self::BecameOnline(id) | Self::BecameOffline(id) | Self::Evicted(id) => Some(id),
        }
    }
}
