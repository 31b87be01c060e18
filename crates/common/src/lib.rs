// ================
// common/src/lib.rs
// ================
//! Common types shared between the `promstream` server and dashboard clients.
//! This module defines the snapshot wire format and the dashboard layout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of the metric family a sample was flattened from
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Summary,
    Histogram,
}

/// One flattened scalar record, ready for wire transmission.
///
/// A snapshot frame is a JSON array of these:
/// `[{"name":..,"type":..,"help":..,"labels":{..},"value":..}, ...]`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Sample name, including any `_count` / `_bucket` suffix
    pub name: String,
    /// Kind of the originating family
    #[serde(rename = "type")]
    pub kind: MetricKind,
    /// Help text of the originating family
    pub help: String,
    /// Label set; keys are unique and serialize in sorted order
    pub labels: BTreeMap<String, String>,
    /// Scalar value
    pub value: f64,
}

/// A single dashboard cell.
///
/// Layouts written by hand mix bare metric names with `{name, short}` objects,
/// so the variants are (de)serialized untagged.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum DashboardCell {
    /// Just the metric name
    PlainName(String),
    /// Metric name with an optional short caption
    Named {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        short: Option<String>,
    },
}

impl DashboardCell {
    /// Metric name this cell displays
    pub fn name(&self) -> &str {
        match self {
            DashboardCell::PlainName(name) | DashboardCell::Named { name, .. } => name,
        }
    }
}

/// Rows of cells, top to bottom
pub type DashboardLayout = Vec<Vec<DashboardCell>>;
