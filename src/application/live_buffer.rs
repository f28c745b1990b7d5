// Live series buffer - One rolling window per tracked metric
use crate::domain::error::DashboardError;
use crate::domain::metric::MetricSample;
use crate::domain::series::SeriesWindow;
use std::collections::HashMap;

/// Written only by the live-update path; everyone else reads snapshots.
#[derive(Debug, Clone)]
pub struct LiveSeriesBuffer {
    windows: HashMap<String, SeriesWindow>,
    capacity: usize,
}

impl LiveSeriesBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            windows: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Start tracking a metric. Re-registering keeps the existing window.
    pub fn register(&mut self, metric_id: &str) {
        self.windows
            .entry(metric_id.to_string())
            .or_insert_with(|| SeriesWindow::new(self.capacity));
    }

    pub fn contains(&self, metric_id: &str) -> bool {
        self.windows.contains_key(metric_id)
    }

    /// Append and evict past capacity. Returns the resulting window length.
    pub fn append(&mut self, metric_id: &str, sample: MetricSample) -> Result<usize, DashboardError> {
        let window = self
            .windows
            .get_mut(metric_id)
            .ok_or_else(|| DashboardError::UnknownMetric(metric_id.to_string()))?;
        window.push(sample);
        Ok(window.len())
    }

    /// Owned copy of the window, oldest first. Later appends do not show up in it.
    pub fn snapshot(&self, metric_id: &str) -> Result<Vec<MetricSample>, DashboardError> {
        self.windows
            .get(metric_id)
            .map(SeriesWindow::to_vec)
            .ok_or_else(|| DashboardError::UnknownMetric(metric_id.to_string()))
    }

    pub fn clear(&mut self, metric_id: &str) -> Result<(), DashboardError> {
        self.windows
            .get_mut(metric_id)
            .map(SeriesWindow::clear)
            .ok_or_else(|| DashboardError::UnknownMetric(metric_id.to_string()))
    }

    pub fn clear_all(&mut self) {
        self.windows.values_mut().for_each(SeriesWindow::clear);
    }

    pub fn latest(&self, metric_id: &str) -> Option<&MetricSample> {
        self.windows.get(metric_id).and_then(SeriesWindow::latest)
    }

    pub fn len(&self, metric_id: &str) -> usize {
        self.windows.get(metric_id).map(SeriesWindow::len).unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
