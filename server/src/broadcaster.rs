//! Periodic telemetry broadcaster
//!
//! Every interval the vehicle physics advance one tick and a single `TLM`
//! line built from one snapshot is queued for every registered session.
//! The wait between ticks is split into short sleeps so a stop request is
//! noticed within one poll period.

use crate::session_registry::SessionRegistry;
use crate::shutdown::Shutdown;
use crate::vehicle::Vehicle;
use log::{debug, info};
use shared::Telemetry;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch for `ts=`; 0 if the clock is set before it
pub fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

pub struct Broadcaster {
    vehicle: Arc<Vehicle>,
    registry: Arc<SessionRegistry>,
    shutdown: Shutdown,
    interval: Duration,
    poll: Duration,
}

impl Broadcaster {
    pub fn new(
        vehicle: Arc<Vehicle>,
        registry: Arc<SessionRegistry>,
        shutdown: Shutdown,
        interval: Duration,
        poll: Duration,
    ) -> Self {
        Self {
            vehicle,
            registry,
            shutdown,
            interval,
            poll,
        }
    }

    /// Advances the vehicle and fans one telemetry line out to every session
    pub fn tick_once(&self) -> (Telemetry, usize) {
        let snapshot = self.vehicle.tick_and_snapshot();
        let telemetry = Telemetry::new(snapshot, epoch_seconds());
        let delivered = self.registry.broadcast(&telemetry.to_wire());
        (telemetry, delivered)
    }

    /// Ticks until shutdown is requested. The first tick happens immediately.
    pub async fn run(self) {
        info!(
            "- telemetry every {:?} (stop checked every {:?})",
            self.interval, self.poll
        );

        while !self.shutdown.is_requested() {
            let (telemetry, delivered) = self.tick_once();
            debug!("- {} -> {} sessions", telemetry, delivered);

            if !self.wait_for_next_tick().await {
                break;
            }
        }

        info!("- telemetry broadcaster stopped");
    }

    /// Sleeps one interval in poll-sized steps; false if shutdown was requested
    async fn wait_for_next_tick(&self) -> bool {
        let poll = self.poll.max(Duration::from_millis(1));
        let mut remaining = self.interval;

        while !remaining.is_zero() {
            if self.shutdown.is_requested() {
                return false;
            }
            let step = remaining.min(poll);
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }

        !self.shutdown.is_requested()
    }
}
