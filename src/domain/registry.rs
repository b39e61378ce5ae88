//! Authoritative in-memory device store.
//!
//! [`DeviceRegistry`] keeps every registered device in a single `HashMap`
//! behind one [`tokio::sync::RwLock`]. Every operation takes the lock for
//! its whole duration, so a heartbeat and a sweep touching the same device
//! can never interleave. No I/O happens while the lock is held.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use super::clock::{Clock, SystemClock};
use super::device::{Control, Device, DeviceAddress, DeviceState};
use super::{DeviceId, Transition};
use crate::error::HubError;

/// Silence durations after which a device is flagged offline and evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceThresholds {
    /// Silence after which an online device becomes offline.
    pub offline: Duration,
    /// Silence after which a device is removed entirely.
    pub evict: Duration,
}

impl Default for PresenceThresholds {
    fn default() -> Self {
        Self {
            offline: Duration::from_secs(30),
            evict: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct Slot {
    /// Registration order, kept across re-registrations.
    seq: u64,
    device: Device,
}

#[derive(Debug, Default)]
struct Inner {
    devices: HashMap<DeviceId, Slot>,
    next_seq: u64,
}

/// Central store for all registered devices.
///
/// # Concurrency
///
/// - All mutations are serialized behind one write lock.
/// - [`DeviceRegistry::snapshot`] returns owned copies, so callers never
///   observe a mutation part-way through iterating.
#[derive(Debug)]
pub struct DeviceRegistry {
    inner: RwLock<Inner>,
    thresholds: PresenceThresholds,
    clock: Arc<dyn Clock>,
}

impl DeviceRegistry {
    /// Creates an empty registry reading time from `clock`.
    #[must_use]
    pub fn new(thresholds: PresenceThresholds, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            thresholds,
            clock,
        }
    }

    /// Returns the thresholds used by [`DeviceRegistry::sweep`].
    #[must_use]
    pub const fn thresholds(&self) -> PresenceThresholds {
        self.thresholds
    }

    /// Registers a device, replacing any existing entry with the same id.
    ///
    /// The device is forced online with `last_seen` set to now. On
    /// re-registration the name, address and controls are replaced and the
    /// device keeps its position in [`DeviceRegistry::snapshot`].
    ///
    /// Returns `true` if the id was not registered before.
    pub async fn register(
        &self,
        id: DeviceId,
        name: String,
        address: DeviceAddress,
        controls: Vec<Control>,
    ) -> bool {
        let now = self.clock.now();
        let controls = dedupe_controls(&id, controls);
        let mut inner = self.inner.write().await;

        if let Some(slot) = inner.devices.get_mut(&id) {
            let device = &mut slot.device;
            device.name = name;
            device.address = address;
            device.controls = controls;
            device.last_seen = device.last_seen.max(now);
            device.state = DeviceState::Online;
            tracing::info!(device_id = %id, name = %device.name, address = %device.address, "device re-registered");
            return false;
        }

        let seq = inner.next_seq;
        inner.next_seq = inner.next_seq.saturating_add(1);
        tracing::info!(device_id = %id, %name, %address, "device registered");
        let device = Device {
            id: id.clone(),
            name,
            address,
            controls,
            last_seen: now,
            state: DeviceState::Online,
        };
        inner.devices.insert(id, Slot { seq, device });
        true
    }

    /// Refreshes `last_seen` for a device.
    ///
    /// Returns [`Transition::BecameOnline`] if the device was offline and
    /// [`Transition::NoChange`] otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDevice`] if no device has this id.
    pub async fn heartbeat(&self, id: &DeviceId) -> Result<Transition, HubError> {
        let now = self.clock.now();
        let mut inner = self.inner.write().await;
        let slot = inner
            .devices
            .get_mut(id)
            .ok_or_else(|| HubError::UnknownDevice(id.clone()))?;

        let device = &mut slot.device;
        device.last_seen = device.last_seen.max(now);
        if device.state.is_online() {
            return Ok(Transition::NoChange);
        }

        device.state = DeviceState::Online;
        tracing::info!(device_id = %id, name = %device.name, "device back online");
        Ok(Transition::BecameOnline(id.clone()))
    }

    /// Writes a single control value in place.
    ///
    /// Leaves `last_seen` and the presence state untouched.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::UnknownDevice`] if the device is not registered,
    /// or [`HubError::UnknownControl`] if it has no control `control_id`.
    pub async fn update_control(
        &self,
        id: &DeviceId,
        control_id: &str,
        value: Value,
    ) -> Result<(), HubError> {
        let mut inner = self.inner.write().await;
        let slot = inner
            .devices
            .get_mut(id)
            .ok_or_else(|| HubError::UnknownDevice(id.clone()))?;

        let control = slot
            .device
            .controls
            .iter_mut()
            .find(|c| c.id == control_id)
            .ok_or_else(|| HubError::UnknownControl {
                device_id: id.clone(),
                control_id: control_id.to_string(),
            })?;
        control.value = value;
        Ok(())
    }

    /// Evaluates every device against the presence thresholds at `now`.
    ///
    /// Devices silent for longer than the eviction threshold are removed and
    /// reported as [`Transition::Evicted`]; online devices silent for longer
    /// than the offline threshold are flagged offline and reported as
    /// [`Transition::BecameOffline`]. At most one event is produced per
    /// device, eviction taking precedence. Events come out in registration
    /// order.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Vec<Transition> {
        let mut inner = self.inner.write().await;
        let mut events: Vec<(u64, Transition)> = Vec::new();

        for (id, slot) in &mut inner.devices {
            let device = &mut slot.device;
            let silence = elapsed(now, device.last_seen);
            if silence > self.thresholds.evict {
                tracing::info!(device_id = %id, name = %device.name, silence_secs = silence.as_secs(), "evicting inactive device");
                events.push((slot.seq, Transition::Evicted(id.clone())));
            } else if device.state.is_online() && silence > self.thresholds.offline {
                device.state = DeviceState::Offline;
                tracing::info!(device_id = %id, name = %device.name, silence_secs = silence.as_secs(), "device marked offline");
                events.push((slot.seq, Transition::BecameOffline(id.clone())));
            }
        }

        for (_, event) in &events {
            if let Transition::Evicted(id) = event {
                inner.devices.remove(id);
            }
        }

        events.sort_by_key(|(seq, _)| *seq);
        events.into_iter().map(|(_, event)| event).collect()
    }

    /// Returns owned copies of all devices in registration order.
    pub async fn snapshot(&self) -> Vec<Device> {
        let inner = self.inner.read().await;
        let mut slots: Vec<&Slot> = inner.devices.values().collect();
        slots.sort_by_key(|slot| slot.seq);
        slots.into_iter().map(|slot| slot.device.clone()).collect()
    }

    /// Returns a copy of one device.
    pub async fn get(&self, id: &DeviceId) -> Option<Device> {
        self.inner
            .read()
            .await
            .devices
            .get(id)
            .map(|slot| slot.device.clone())
    }

    /// Returns the number of registered devices.
    pub async fn len(&self) -> usize {
        self.inner.read().await.devices.len()
    }

    /// Returns `true` if no device is registered.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.devices.is_empty()
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(PresenceThresholds::default(), Arc::new(SystemClock))
    }
}

/// Silence between `last_seen` and `now`; zero if `now` is earlier.
fn elapsed(now: DateTime<Utc>, last_seen: DateTime<Utc>) -> Duration {
    now.signed_duration_since(last_seen)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Keeps the first control for each id and drops later duplicates.
fn dedupe_controls(device_id: &DeviceId, controls: Vec<Control>) -> Vec<Control> {
    let mut seen = HashSet::with_capacity(controls.len());
    controls
        .into_iter()
        .filter(|control| {
            let fresh = seen.insert(control.id.clone());
            if !fresh {
                tracing::warn!(%device_id, control_id = %control.id, "dropping duplicate control id");
            }
            fresh
        })
        .collect()
}
