//! Periodic release of expired reservations.

use std::time::Duration;

use event_bus::EventBus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::{InventoryService, ReservationEngine};

/// Default time between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that releases expired reservations on a fixed interval.
pub struct ExpirySweeper<E: ReservationEngine, B: EventBus> {
    service: InventoryService<E, B>,
    period: Duration,
}

impl<E, B> ExpirySweeper<E, B>
where
    E: ReservationEngine + 'static,
    B: EventBus + 'static,
{
    pub fn new(service: InventoryService<E, B>) -> Self {
        Self::with_interval(service, DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_interval(service: InventoryService<E, B>, period: Duration) -> Self {
        Self { service, period }
    }

    /// Runs sweeps until `shutdown` flips to true or its sender is dropped.
    ///
    /// A failed sweep is logged and retried on the next tick.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_ms = self.period.as_millis() as u64, "expiry sweeper started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // First tick is immediate

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("expiry sweeper shutdown requested");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.service.release_expired().await {
                        tracing::error!(error = %e, "expiry sweep failed (will retry)");
                    }
                }
            }
        }

        tracing::info!("expiry sweeper stopped");
    }

    /// Spawns [`run`](Self::run) on the runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
