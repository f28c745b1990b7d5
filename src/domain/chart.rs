// Chart domain models
use super::metric::{MetricDescriptor, MetricSample};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Opaque id of one chart instance. A rebind after dispose gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ChartHandle(u64);

impl ChartHandle {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ChartHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chart#{}", self.0)
    }
}

/// Lifecycle of a bound chart. Unbound charts have no registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartState {
    Live,
    History { seq: u64 },
    Disposed,
}

impl ChartState {
    pub fn name(&self) -> &'static str {
        match self {
            ChartState::Live => "live",
            ChartState::History { .. } => "history",
            ChartState::Disposed => "disposed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartKind {
    Line,
    MultiLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub key: String,
    pub label: String,
    pub color: Option<String>,
    pub data: Vec<Option<f64>>,
}

/// Everything a view needs to draw one chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartFrame {
    pub metric_id: String,
    pub handle: ChartHandle,
    pub title: String,
    pub unit: String,
    pub kind: ChartKind,
    pub mode: &'static str,
    pub labels: Vec<DateTime<Utc>>,
    pub datasets: Vec<Dataset>,
}

impl ChartFrame {
    pub fn empty(handle: ChartHandle, descriptor: &MetricDescriptor) -> Self {
        Self::from_samples(handle, descriptor, ChartState::Live, &[])
    }

    /// Lay samples out as one dataset per channel, all sharing the same labels
    pub fn from_samples(
        handle: ChartHandle,
        descriptor: &MetricDescriptor,
        state: ChartState,
        samples: &[MetricSample],
    ) -> Self {
        let labels = samples.iter().map(|s| s.timestamp).collect();
        let datasets = descriptor
            .channels
            .iter()
            .enumerate()
            .map(|(i, channel)| Dataset {
                key: channel.key.clone(),
                label: channel.label.clone(),
                color: channel.color.clone(),
                data: samples.iter().map(|s| s.value.channel(&channel.key, i)).collect(),
            })
            .collect();

        Self {
            metric_id: descriptor.id.clone(),
            handle,
            title: descriptor.title.clone(),
            unit: descriptor.unit.clone(),
            kind: if descriptor.is_composite() {
                ChartKind::MultiLine
            } else {
                ChartKind::Line
            },
            mode: state.name(),
            labels,
            datasets,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
