// ==================
// crates/backend-lib/src/snapshot.rs
// ==================
//! Snapshotter
//!
//! Turns one scrape of a [`MetricsSource`] into an ordered list of flat
//! [`MetricSample`]s and encodes them as the JSON payload pushed to
//! subscribers.
//!
//! Families are visited in source order and points in family order:
//! - counters and gauges yield one sample each
//! - summaries yield the sum under the family name, a `_count` sample, then
//!   one sample per quantile tagged with a `quantile` label
//! - histograms yield the sum under the family name, a `_count` sample, then
//!   one `_bucket` sample per bucket tagged with an `le` label
//!
//! Untyped families produce nothing.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use prometheus::proto::{Metric, MetricFamily, MetricType};
use promstream_common::{MetricKind, MetricSample};
use tracing::trace;

use crate::error::AppError;

/// Anything that can be scraped for metric families
pub trait MetricsSource: Send + Sync {
    /// Scrape the source
    fn gather(&self) -> Result<Vec<MetricFamily>, AppError>;
}

impl MetricsSource for prometheus::Registry {
    fn gather(&self) -> Result<Vec<MetricFamily>, AppError> {
        Ok(prometheus::Registry::gather(self))
    }
}

/// Gathers and flattens snapshots from a shared source
#[derive(Clone)]
pub struct Snapshotter {
    source: Arc<dyn MetricsSource>,
}

impl Snapshotter {
    pub fn new(source: Arc<dyn MetricsSource>) -> Self {
        Self { source }
    }

    /// The underlying source, for consumers that need raw families
    pub fn source(&self) -> &dyn MetricsSource {
        self.source.as_ref()
    }

    /// Scrape the source and flatten the result.
    ///
    /// A failed scrape yields no samples at all.
    pub fn gather(&self) -> Result<Vec<MetricSample>, AppError> {
        let families = self.source.gather()?;
        Ok(flatten(&families))
    }
}

/// Flatten metric families into samples, preserving source order
pub fn flatten(families: &[MetricFamily]) -> Vec<MetricSample> {
    let mut samples = Vec::new();

    for family in families {
        let Some(kind) = metric_kind(family.get_field_type()) else {
            trace!(family = family.get_name(), "skipping unsupported metric type");
            continue;
        };

        for metric in family.get_metric() {
            flatten_metric(family, kind, metric, &mut samples);
        }
    }

    samples
}

/// Encode samples as the JSON array sent in one text frame.
///
/// JSON has no representation for NaN or infinities, so a snapshot holding
/// any non-finite value is rejected as a whole.
pub fn encode(samples: &[MetricSample]) -> Result<Bytes, AppError> {
    if let Some(sample) = samples.iter().find(|sample| !sample.value.is_finite()) {
        return Err(AppError::Serialization(serde::ser::Error::custom(format!(
            "unsupported value {} in sample {}",
            sample.value, sample.name
        ))));
    }
    Ok(Bytes::from(serde_json::to_vec(samples)?))
}

fn metric_kind(metric_type: MetricType) -> Option<MetricKind> {
    match metric_type {
        MetricType::COUNTER => Some(MetricKind::Counter),
        MetricType::GAUGE => Some(MetricKind::Gauge),
        MetricType::SUMMARY => Some(MetricKind::Summary),
        MetricType::HISTOGRAM => Some(MetricKind::Histogram),
        MetricType::UNTYPED => None,
    }
}

fn flatten_metric(
    family: &MetricFamily,
    kind: MetricKind,
    metric: &Metric,
    out: &mut Vec<MetricSample>,
) {
    let name = family.get_name();
    let labels: BTreeMap<String, String> = metric
        .get_label()
        .iter()
        .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
        .collect();

    let sample = |name: String, labels: BTreeMap<String, String>, value: f64| MetricSample {
        name,
        kind,
        help: family.get_help().to_string(),
        labels,
        value,
    };

    match kind {
        MetricKind::Counter => {
            out.push(sample(name.to_string(), labels, metric.get_counter().get_value()));
        },
        MetricKind::Gauge => {
            out.push(sample(name.to_string(), labels, metric.get_gauge().get_value()));
        },
        MetricKind::Summary => {
            let summary = metric.get_summary();
            out.push(sample(name.to_string(), labels.clone(), summary.get_sample_sum()));
            out.push(sample(
                format!("{name}_count"),
                labels.clone(),
                summary.get_sample_count() as f64,
            ));
            for quantile in summary.get_quantile() {
                out.push(sample(
                    name.to_string(),
                    with_label(&labels, "quantile", format_bound(quantile.get_quantile())),
                    quantile.get_value(),
                ));
            }
        },
        MetricKind::Histogram => {
            let histogram = metric.get_histogram();
            out.push(sample(name.to_string(), labels.clone(), histogram.get_sample_sum()));
            out.push(sample(
                format!("{name}_count"),
                labels.clone(),
                histogram.get_sample_count() as f64,
            ));
            for bucket in histogram.get_bucket() {
                out.push(sample(
                    format!("{name}_bucket"),
                    with_label(&labels, "le", format_bound(bucket.get_upper_bound())),
                    bucket.get_cumulative_count() as f64,
                ));
            }
        },
    }
}

fn with_label(
    labels: &BTreeMap<String, String>,
    key: &str,
    value: String,
) -> BTreeMap<String, String> {
    let mut labels = labels.clone();
    labels.insert(key.to_string(), value);
    labels
}

/// Format a bucket bound or quantile in shortest general notation.
///
/// Fixed notation for decimal exponents in `[-4, 6)`, otherwise scientific
/// with a signed, two-digit minimum exponent: `0.1`, `1`, `1e+06`, `2.5e-05`.
pub fn format_bound(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    let scientific = format!("{value:e}");
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if (-4..6).contains(&exponent) {
        format!("{value}")
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
    }
}
