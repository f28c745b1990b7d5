// Application state for HTTP handlers
use crate::application::view_controller::ControllerHandle;
use crate::infrastructure::chart_feed::ChartFeed;

#[derive(Clone)]
pub struct AppState {
    pub controller: ControllerHandle,
    pub feed: ChartFeed,
}
