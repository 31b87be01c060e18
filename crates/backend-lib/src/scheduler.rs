// ============================
// promstream-backend/src/scheduler.rs
// ============================
//! Periodic snapshot cycle: gather, flatten, encode, broadcast.
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::hub::HubHandle;
use crate::metrics::{Metrics, STAGE_GATHER, STAGE_SERIALIZE};
use crate::snapshot::{self, Snapshotter};

/// Drives snapshot cycles at a fixed interval
pub struct Scheduler {
    snapshotter: Snapshotter,
    hub: HubHandle,
    interval: Duration,
    metrics: Metrics,
}

impl Scheduler {
    /// Create a scheduler; the interval must be non-zero
    pub fn new(
        snapshotter: Snapshotter,
        hub: HubHandle,
        interval: Duration,
        metrics: Metrics,
    ) -> Result<Self, AppError> {
        if interval.is_zero() {
            return Err(AppError::InvalidConfig(
                "snapshot interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            snapshotter,
            hub,
            interval,
            metrics,
        })
    }

    /// Run one snapshot cycle.
    ///
    /// Nothing is broadcast unless gathering and encoding both succeed.
    /// Returns the number of samples sent.
    pub async fn run_cycle(&self) -> Result<usize, AppError> {
        let timer = self.metrics.snapshot_duration.start_timer();

        let samples = match self.snapshotter.gather() {
            Ok(samples) => samples,
            Err(e) => {
                self.metrics
                    .snapshot_failures
                    .with_label_values(&[STAGE_GATHER])
                    .inc();
                timer.stop_and_discard();
                return Err(e);
            },
        };

        let payload = match snapshot::encode(&samples) {
            Ok(payload) => payload,
            Err(e) => {
                self.metrics
                    .snapshot_failures
                    .with_label_values(&[STAGE_SERIALIZE])
                    .inc();
                timer.stop_and_discard();
                return Err(e);
            },
        };

        self.hub.broadcast(payload).await?;
        timer.observe_duration();
        Ok(samples.len())
    }

    /// Tick until `shutdown` is cancelled.
    ///
    /// The first cycle runs one interval after start. A cycle already in
    /// progress when shutdown is requested runs to completion.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = self.interval.as_millis() as u64, "snapshot scheduler started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        Ok(count) => debug!(samples = count, "snapshot broadcast"),
                        Err(AppError::HubUnavailable) => {
                            warn!("hub is gone, stopping snapshot scheduler");
                            break;
                        },
                        Err(e) => warn!(error = %e, "skipping snapshot cycle"),
                    }
                }
            }
        }

        info!("snapshot scheduler stopped");
    }
}
