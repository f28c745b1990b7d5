// View-side ports: where charts are drawn and where the user is told about things
use crate::domain::chart::{ChartFrame, ChartHandle};
use crate::domain::error::DashboardError;
use std::sync::Arc;

/// The target one chart instance draws into
pub trait RenderSurface: Send + Sync {
    fn draw(&self, frame: &ChartFrame);

    /// The chart instance is gone; drop anything held for it
    fn release(&self, metric_id: &str, handle: ChartHandle);
}

/// Looks up the surface laid out for a metric, if the view has one
pub trait SurfaceProvider: Send + Sync {
    fn surface(&self, metric_id: &str) -> Option<Arc<dyn RenderSurface>>;
}

/// User-facing feedback outside of charts
pub trait Notifier: Send + Sync {
    /// Latest value for a metric's card
    fn readout(&self, metric_id: &str, text: &str);

    /// A failure the user should see. `None` when it concerns no single metric.
    fn notice(&self, metric_id: Option<&str>, error: &DashboardError);
}
