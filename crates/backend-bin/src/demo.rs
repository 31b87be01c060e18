//! Synthetic metrics for trying the dashboard without a real workload.
use std::time::Duration;

use prometheus::{
    exponential_buckets, linear_buckets, Gauge, Histogram, HistogramOpts, HistogramVec,
    IntCounterVec, Opts, Registry,
};
use tokio_util::sync::CancellationToken;

const ROUTES: [(&str, &str); 3] = [("/api/users", "GET"), ("/api/orders", "POST"), ("/", "GET")];

struct DemoMetrics {
    requests: IntCounterVec,
    latency: HistogramVec,
    response_size: Histogram,
    memory: Gauge,
}

impl DemoMetrics {
    fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let requests = IntCounterVec::new(
            Opts::new(
                "http_requests_total",
                "Total number of HTTP requests by status code and method.",
            ),
            &["code", "method"],
        )?;
        let latency = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request latencies in seconds.")
                .buckets(linear_buckets(0.1, 0.2, 10)?),
            &["handler", "method"],
        )?;
        let response_size = Histogram::with_opts(
            HistogramOpts::new("http_response_size_bytes", "HTTP response sizes in bytes.")
                .buckets(exponential_buckets(100.0, 2.0, 8)?),
        )?;
        let memory = Gauge::new("memory_usage_bytes", "Current memory usage in bytes.")?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(latency.clone()))?;
        registry.register(Box::new(response_size.clone()))?;
        registry.register(Box::new(memory.clone()))?;

        Ok(Self {
            requests,
            latency,
            response_size,
            memory,
        })
    }

    /// Advance the simulation by one step
    fn step(&self, step: u64) {
        let t = step as f64;
        for (i, &(handler, method)) in ROUTES.iter().enumerate() {
            let phase = t * 0.3 + i as f64;
            let code = if step % 17 == i as u64 { "500" } else { "200" };
            self.requests.with_label_values(&[code, method]).inc();
            self.latency
                .with_label_values(&[handler, method])
                .observe(0.05 + 0.9 * phase.sin().abs());
            self.response_size.observe(150.0 + 4000.0 * (phase * 0.7).cos().abs());
        }
        self.memory.set(64.0 * 1024.0 * 1024.0 * (1.5 + (t * 0.05).sin()));
    }
}

/// Register the demo metrics and update them until `shutdown`
pub fn spawn(registry: &Registry, shutdown: CancellationToken) -> Result<(), prometheus::Error> {
    let metrics = DemoMetrics::new(registry)?;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(250));
        let mut step = 0u64;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    metrics.step(step);
                    step += 1;
                }
            }
        }
    });

    Ok(())
}
