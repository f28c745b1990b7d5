// Chart renderer - Registry of chart instances and their live/history lifecycle
use crate::application::surface::{RenderSurface, SurfaceProvider};
use crate::domain::chart::{ChartFrame, ChartHandle, ChartState};
use crate::domain::error::DashboardError;
use crate::domain::history::HistoryResult;
use crate::domain::metric::{MetricDescriptor, MetricSample};
use std::collections::HashMap;
use std::sync::Arc;

struct ChartEntry {
    handle: ChartHandle,
    descriptor: MetricDescriptor,
    state: ChartState,
    frame: ChartFrame,
    surface: Option<Arc<dyn RenderSurface>>,
}

impl ChartEntry {
    fn redraw(&mut self, samples: &[MetricSample]) {
        self.frame = ChartFrame::from_samples(self.handle, &self.descriptor, self.state, samples);
        if let Some(surface) = &self.surface {
            surface.draw(&self.frame);
        }
    }

    fn invalid(&self, metric_id: &str, operation: &'static str) -> DashboardError {
        DashboardError::InvalidTransition {
            metric: metric_id.to_string(),
            operation,
            state: self.state.name(),
        }
    }
}

/// Owns every chart instance, keyed by metric id.
///
/// Lifecycle per metric: `Unbound -> Live <-> History -> Disposed`, with
/// `Disposed` left only through a fresh [`ChartRenderer::bind`]. The renderer
/// never touches the live buffer; callers hand it snapshots.
pub struct ChartRenderer {
    surfaces: Arc<dyn SurfaceProvider>,
    charts: HashMap<String, ChartEntry>,
    next_handle: u64,
}

impl ChartRenderer {
    pub fn new(surfaces: Arc<dyn SurfaceProvider>) -> Self {
        Self {
            surfaces,
            charts: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Create the chart for a metric. Binding an active chart again returns its handle.
    pub fn bind(
        &mut self,
        metric_id: &str,
        descriptor: &MetricDescriptor,
    ) -> Result<ChartHandle, DashboardError> {
        if let Some(entry) = self.charts.get(metric_id) {
            if entry.state != ChartState::Disposed {
                tracing::debug!(metric = metric_id, handle = %entry.handle, "chart already bound");
                return Ok(entry.handle);
            }
        }

        let surface = self
            .surfaces
            .surface(metric_id)
            .ok_or_else(|| DashboardError::MissingSurface(metric_id.to_string()))?;

        self.next_handle += 1;
        let handle = ChartHandle::new(self.next_handle);
        let frame = ChartFrame::empty(handle, descriptor);
        surface.draw(&frame);

        self.charts.insert(
            metric_id.to_string(),
            ChartEntry {
                handle,
                descriptor: descriptor.clone(),
                state: ChartState::Live,
                frame,
                surface: Some(surface),
            },
        );

        tracing::debug!(metric = metric_id, handle = %handle, "chart bound");
        Ok(handle)
    }

    /// Redraw from the buffer's current window. Returns false while the chart
    /// shows history; those samples stay in the buffer for `resume_live`.
    pub fn push_live(&mut self, metric_id: &str, window: &[MetricSample]) -> Result<bool, DashboardError> {
        let entry = self.entry_mut(metric_id)?;
        match entry.state {
            ChartState::Live => {
                entry.redraw(window);
                Ok(true)
            }
            ChartState::History { .. } => Ok(false),
            ChartState::Disposed => Err(entry.invalid(metric_id, "push live data to")),
        }
    }

    /// Replace the dataset with fetched history and stop following live data.
    pub fn load_history(&mut self, metric_id: &str, result: &HistoryResult) -> Result<(), DashboardError> {
        let entry = self.entry_mut(metric_id)?;
        if entry.state == ChartState::Disposed {
            return Err(entry.invalid(metric_id, "load history into"));
        }
        if result.is_empty() {
            return Err(DashboardError::EmptyHistoryResult(metric_id.to_string()));
        }

        entry.state = ChartState::History { seq: result.seq };
        entry.redraw(&result.to_samples());
        Ok(())
    }

    /// Drop any historical dataset and show the given live window again.
    pub fn resume_live(&mut self, metric_id: &str, window: &[MetricSample]) -> Result<(), DashboardError> {
        let entry = self.entry_mut(metric_id)?;
        if entry.state == ChartState::Disposed {
            return Err(entry.invalid(metric_id, "resume"));
        }

        entry.state = ChartState::Live;
        entry.redraw(window);
        Ok(())
    }

    /// Release the chart instance. Disposing twice is a no-op.
    pub fn dispose(&mut self, metric_id: &str) -> Result<(), DashboardError> {
        let entry = self.entry_mut(metric_id)?;
        if entry.state == ChartState::Disposed {
            return Ok(());
        }

        if let Some(surface) = entry.surface.take() {
            surface.release(metric_id, entry.handle);
        }
        entry.state = ChartState::Disposed;
        entry.frame = ChartFrame::empty(entry.handle, &entry.descriptor);
        entry.frame.mode = ChartState::Disposed.name();

        tracing::debug!(metric = metric_id, handle = %entry.handle, "chart disposed");
        Ok(())
    }

    pub fn dispose_all(&mut self) {
        let metrics: Vec<String> = self.charts.keys().cloned().collect();
        for metric in metrics {
            let _ = self.dispose(&metric);
        }
    }

    /// Current frame of an active chart
    pub fn frame(&self, metric_id: &str) -> Option<&ChartFrame> {
        self.charts
            .get(metric_id)
            .filter(|e| e.state != ChartState::Disposed)
            .map(|e| &e.frame)
    }

    pub fn state(&self, metric_id: &str) -> Option<ChartState> {
        self.charts.get(metric_id).map(|e| e.state)
    }

    pub fn handle(&self, metric_id: &str) -> Option<ChartHandle> {
        self.charts
            .get(metric_id)
            .filter(|e| e.state != ChartState::Disposed)
            .map(|e| e.handle)
    }

    /// Active charts only
    pub fn bound_metrics(&self) -> Vec<String> {
        self.charts
            .iter()
            .filter(|(_, e)| e.state != ChartState::Disposed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn entry_mut(&mut self, metric_id: &str) -> Result<&mut ChartEntry, DashboardError> {
        self.charts
            .get_mut(metric_id)
            .ok_or_else(|| DashboardError::UnknownMetric(metric_id.to_string()))
    }
}
