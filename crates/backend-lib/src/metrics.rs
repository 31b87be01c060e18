// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for the server's own Prometheus metrics
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

pub const CONNECTIONS: &str = "promstream_connections";
pub const ADMISSIONS_REJECTED: &str = "promstream_admissions_rejected_total";
pub const EVICTIONS: &str = "promstream_evictions_total";
pub const BROADCASTS: &str = "promstream_broadcasts_total";
pub const SNAPSHOT_DURATION: &str = "promstream_snapshot_duration_seconds";
pub const SNAPSHOT_FAILURES: &str = "promstream_snapshot_failures_total";

/// Failure stage label values for [`SNAPSHOT_FAILURES`]
pub const STAGE_GATHER: &str = "gather";
pub const STAGE_SERIALIZE: &str = "serialize";

/// Hub and scheduler instrumentation.
///
/// Handles are cheap to clone; every clone records into the same series.
#[derive(Clone)]
pub struct Metrics {
    pub connections: IntGauge,
    pub admissions_rejected: IntCounter,
    pub evictions: IntCounter,
    pub broadcasts: IntCounter,
    pub snapshot_duration: Histogram,
    pub snapshot_failures: IntCounterVec,
}

impl Metrics {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let connections = IntGauge::new(CONNECTIONS, "Registered subscriber connections.")?;
        let admissions_rejected = IntCounter::new(
            ADMISSIONS_REJECTED,
            "Connections refused because the hub was at capacity.",
        )?;
        let evictions = IntCounter::new(
            EVICTIONS,
            "Connections dropped because their outbound queue was full or closed.",
        )?;
        let broadcasts = IntCounter::new(BROADCASTS, "Snapshot payloads fanned out by the hub.")?;
        let snapshot_duration = Histogram::with_opts(
            HistogramOpts::new(
                SNAPSHOT_DURATION,
                "Time to gather, flatten and hand a snapshot to the hub.",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        let snapshot_failures = IntCounterVec::new(
            Opts::new(SNAPSHOT_FAILURES, "Snapshot cycles skipped, by failing stage."),
            &["stage"],
        )?;

        registry.register(Box::new(connections.clone()))?;
        registry.register(Box::new(admissions_rejected.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(broadcasts.clone()))?;
        registry.register(Box::new(snapshot_duration.clone()))?;
        registry.register(Box::new(snapshot_failures.clone()))?;

        Ok(Self {
            connections,
            admissions_rejected,
            evictions,
            broadcasts,
            snapshot_duration,
            snapshot_failures,
        })
    }
}
