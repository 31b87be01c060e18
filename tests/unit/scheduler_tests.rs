// =============
// tests/unit/scheduler_tests.rs
// =============
//! Snapshot cycles: what gets broadcast, what doesn't, and when.
use std::sync::Arc;
use std::time::Duration;

use promstream_backend::connection::Connection;
use promstream_backend::error::AppError;
use promstream_backend::hub::HubHandle;
use promstream_backend::metrics::{STAGE_GATHER, STAGE_SERIALIZE};
use promstream_backend::scheduler::Scheduler;
use promstream_backend::snapshot::Snapshotter;
use prometheus::{Gauge, Registry};
use promstream_common::{MetricKind, MetricSample};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::test_utils::{sample_registry, test_metrics, FailingSource};

#[tokio::test]
async fn test_cycle_broadcasts_flattened_registry() {
    let metrics = test_metrics();
    let hub = HubHandle::spawn(4, 4, metrics.clone());
    let (connection, mut outbound) = Connection::new(4);
    hub.register(connection).await.unwrap();

    let snapshotter = Snapshotter::new(Arc::new(sample_registry()));
    let scheduler = Scheduler::new(snapshotter, hub, Duration::from_secs(1), metrics).unwrap();

    let count = scheduler.run_cycle().await.unwrap();
    let payload = outbound.recv().await.unwrap();
    let samples: Vec<MetricSample> = serde_json::from_slice(&payload).unwrap();
    assert_eq!(samples.len(), count);

    // latency_seconds: sum, count, then its two configured buckets
    let names: Vec<&str> = samples.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "latency_seconds",
            "latency_seconds_count",
            "latency_seconds_bucket",
            "latency_seconds_bucket",
            "requests_total",
        ]
    );

    let requests = samples.last().unwrap();
    assert_eq!(requests.kind, MetricKind::Counter);
    assert_eq!(requests.labels.get("code").map(String::as_str), Some("200"));
    assert_eq!(requests.value, 3.0);

    let bounds: Vec<&str> = samples
        .iter()
        .filter_map(|s| s.labels.get("le").map(String::as_str))
        .collect();
    assert_eq!(bounds, vec!["0.1", "0.5"]);
}

#[tokio::test]
async fn test_failed_gather_broadcasts_nothing() {
    let metrics = test_metrics();
    let hub = HubHandle::spawn(4, 4, metrics.clone());
    let (connection, mut outbound) = Connection::new(4);
    hub.register(connection).await.unwrap();

    let snapshotter = Snapshotter::new(Arc::new(FailingSource));
    let scheduler =
        Scheduler::new(snapshotter, hub.clone(), Duration::from_secs(1), metrics.clone()).unwrap();

    let result = scheduler.run_cycle().await;
    assert!(matches!(result, Err(AppError::Gather(_))));

    // Round-trip through the hub so any broadcast would already be queued
    assert_eq!(hub.connection_count().await.unwrap(), 1);
    assert!(outbound.try_recv().is_err());

    assert_eq!(
        metrics
            .snapshot_failures
            .with_label_values(&[STAGE_GATHER])
            .get(),
        1
    );
    assert_eq!(metrics.broadcasts.get(), 0);
    assert_eq!(metrics.snapshot_duration.get_sample_count(), 0);
}

#[tokio::test]
async fn test_unencodable_snapshot_broadcasts_nothing() {
    let metrics = test_metrics();
    let hub = HubHandle::spawn(4, 4, metrics.clone());
    let (connection, mut outbound) = Connection::new(4);
    hub.register(connection).await.unwrap();

    let registry = Registry::new();
    let ratio = Gauge::new("cache_hit_ratio", "Hits over lookups.").unwrap();
    registry.register(Box::new(ratio.clone())).unwrap();
    ratio.set(f64::NAN);

    let snapshotter = Snapshotter::new(Arc::new(registry));
    let scheduler =
        Scheduler::new(snapshotter, hub.clone(), Duration::from_secs(1), metrics.clone()).unwrap();

    let result = scheduler.run_cycle().await;
    assert!(matches!(result, Err(AppError::Serialization(_))));

    assert_eq!(hub.connection_count().await.unwrap(), 1);
    assert!(outbound.try_recv().is_err());

    let failures = |stage| metrics.snapshot_failures.with_label_values(&[stage]).get();
    assert_eq!(failures(STAGE_SERIALIZE), 1);
    assert_eq!(failures(STAGE_GATHER), 0);
    assert_eq!(metrics.broadcasts.get(), 0);
    assert_eq!(metrics.snapshot_duration.get_sample_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_first_snapshot_waits_one_interval() {
    let metrics = test_metrics();
    let hub = HubHandle::spawn(4, 4, metrics.clone());
    let (connection, mut outbound) = Connection::new(4);
    hub.register(connection).await.unwrap();

    let interval = Duration::from_secs(2);
    let snapshotter = Snapshotter::new(Arc::new(sample_registry()));
    let scheduler = Scheduler::new(snapshotter, hub, interval, metrics).unwrap();

    let shutdown = CancellationToken::new();
    let start = Instant::now();
    let task = tokio::spawn(scheduler.run(shutdown.clone()));

    tokio::time::sleep(interval / 2).await;
    assert!(outbound.try_recv().is_err());

    let first = outbound.recv().await.unwrap();
    assert!(start.elapsed() >= interval);
    let second = outbound.recv().await.unwrap();
    assert!(start.elapsed() >= interval * 2);
    assert_eq!(first, second);

    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_cycles_do_not_stop_the_loop() {
    let metrics = test_metrics();
    let hub = HubHandle::spawn(4, 4, metrics.clone());

    let snapshotter = Snapshotter::new(Arc::new(FailingSource));
    let scheduler =
        Scheduler::new(snapshotter, hub, Duration::from_millis(100), metrics.clone()).unwrap();

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(scheduler.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(350)).await;
    shutdown.cancel();
    task.await.unwrap();

    assert_eq!(
        metrics
            .snapshot_failures
            .with_label_values(&[STAGE_GATHER])
            .get(),
        3
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_first_tick() {
    let metrics = test_metrics();
    let hub = HubHandle::spawn(4, 4, metrics.clone());
    let (connection, mut outbound) = Connection::new(4);
    hub.register(connection).await.unwrap();

    let snapshotter = Snapshotter::new(Arc::new(sample_registry()));
    let scheduler =
        Scheduler::new(snapshotter, hub.clone(), Duration::from_secs(60), metrics.clone()).unwrap();

    let shutdown = CancellationToken::new();
    shutdown.cancel();
    scheduler.run(shutdown).await;

    assert_eq!(hub.connection_count().await.unwrap(), 1);
    assert!(outbound.try_recv().is_err());
    assert_eq!(metrics.broadcasts.get(), 0);
}
