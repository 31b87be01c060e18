// ============================
// promstream-backend/src/lib.rs
// ============================
//! Core of the `promstream` live metrics server.
//!
//! A [`scheduler::Scheduler`] periodically snapshots a metrics source through
//! the [`snapshot::Snapshotter`], and the [`hub`] fans each snapshot out to
//! every subscribed WebSocket connection.

pub mod config;
pub mod connection;
pub mod dashboard;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod middleware;
pub mod scheduler;
pub mod snapshot;
pub mod ws_router;

use std::sync::Arc;

use crate::config::Settings;
use crate::error::AppError;
use crate::hub::HubHandle;
use crate::metrics::Metrics;
use crate::scheduler::Scheduler;
use crate::snapshot::{MetricsSource, Snapshotter};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Handle to the connection hub
    pub hub: HubHandle,
    /// Snapshot source
    pub snapshotter: Snapshotter,
    /// Settings the state was built from
    pub settings: Arc<Settings>,
    /// Self-instrumentation
    pub metrics: Metrics,
}

impl AppState {
    /// Create the application state, starting the hub's control loop
    pub fn new(settings: Settings, source: Arc<dyn MetricsSource>, metrics: Metrics) -> Self {
        let hub = HubHandle::spawn(
            settings.max_connections,
            settings.queue_capacity,
            metrics.clone(),
        );

        Self {
            hub,
            snapshotter: Snapshotter::new(source),
            settings: Arc::new(settings),
            metrics,
        }
    }

    /// Build the snapshot scheduler feeding this state's hub
    pub fn scheduler(&self) -> Result<Scheduler, AppError> {
        Scheduler::new(
            self.snapshotter.clone(),
            self.hub.clone(),
            self.settings.tick_interval(),
            self.metrics.clone(),
        )
    }
}
