//! Periodic presence sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::broadcaster::Broadcaster;
use crate::domain::{Clock, DeviceRegistry, Transition};

/// Background task that applies timeout transitions to the registry and
/// broadcasts the results.
///
/// The sweep runs on its own timer, so a slow or silent connection never
/// delays it.
#[derive(Debug, Clone)]
pub struct PresenceMonitor {
    registry: Arc<DeviceRegistry>,
    broadcaster: Broadcaster,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl PresenceMonitor {
    /// Creates a monitor sweeping every `interval`.
    #[must_use]
    pub fn new(
        registry: Arc<DeviceRegistry>,
        broadcaster: Broadcaster,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            clock,
            interval,
        }
    }

    /// Runs one sweep at the clock's current time and broadcasts every
    /// resulting transition.
    ///
    /// Returns the transitions that were applied.
    pub async fn tick(&self) -> Vec<Transition> {
        let _order = self.broadcaster.ordered().await;
        let now = self.clock.now();
        let events = self.registry.sweep(now).await;

        for event in &events {
            match event {
                Transition::BecameOffline(id) => {
                    self.broadcaster.device_status(id, false).await;
                }
                Transition::Evicted(_) => {
                    let devices = self.registry.snapshot().await;
                    self.broadcaster.device_list(&devices).await;
                }
                Transition::BecameOnline(_) | Transition::NoChange => {}
            }
        }

        if !events.is_empty() {
            tracing::debug!(transitions = events.len(), "presence sweep applied");
        }
        events
    }

    /// Sweeps every interval until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "presence monitor started");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        tracing::info!("presence monitor stopped");
    }
}
