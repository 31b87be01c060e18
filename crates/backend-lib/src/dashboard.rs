//! Default dashboard layout.
use std::collections::HashSet;

use promstream_common::{DashboardCell, DashboardLayout, MetricSample};

/// One row per distinct sample name, in first-seen order
pub fn default_layout(samples: &[MetricSample]) -> DashboardLayout {
    let mut seen = HashSet::new();
    samples
        .iter()
        .filter(|sample| seen.insert(sample.name.as_str()))
        .map(|sample| {
            vec![DashboardCell::Named {
                name: sample.name.clone(),
                short: Some(short_name(&sample.name)),
            }]
        })
        .collect()
}

/// Caption for a metric name: a unit-ish suffix, or the last `_` segment
pub fn short_name(name: &str) -> String {
    const SUFFIXES: [(&str, &str); 4] = [
        ("_bytes", "BYTES"),
        ("_total", "TOTAL"),
        ("_count", "COUNT"),
        ("_sum", "SUM"),
    ];

    SUFFIXES
        .iter()
        .find(|(suffix, _)| name.ends_with(suffix))
        .map_or_else(
            || name.rsplit('_').next().unwrap_or(name).to_string(),
            |(_, short)| (*short).to_string(),
        )
}
