// Broadcast feed - Chart surfaces and notices published to connected viewers
use crate::application::surface::{Notifier, RenderSurface, SurfaceProvider};
use crate::domain::chart::{ChartFrame, ChartHandle};
use crate::domain::error::DashboardError;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;

/// One message on the viewer feed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    Chart {
        frame: ChartFrame,
    },
    Released {
        metric_id: String,
        handle: ChartHandle,
    },
    Readout {
        metric_id: String,
        text: String,
    },
    Notice {
        metric_id: Option<String>,
        kind: &'static str,
        message: String,
    },
}

impl FeedEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            FeedEvent::Chart { .. } => "chart",
            FeedEvent::Released { .. } => "released",
            FeedEvent::Readout { .. } => "readout",
            FeedEvent::Notice { .. } => "notice",
        }
    }
}

/// Publishes to every subscriber; with none connected, events are dropped.
/// Only metrics listed as panels get a surface.
#[derive(Clone)]
pub struct ChartFeed {
    panels: Arc<HashSet<String>>,
    tx: broadcast::Sender<FeedEvent>,
}

impl ChartFeed {
    pub fn new(panels: impl IntoIterator<Item = String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            panels: Arc::new(panels.into_iter().collect()),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: FeedEvent) {
        // Err only means nobody is listening right now
        let _ = self.tx.send(event);
    }
}

struct PanelSurface {
    feed: ChartFeed,
}

impl RenderSurface for PanelSurface {
    fn draw(&self, frame: &ChartFrame) {
        self.feed.publish(FeedEvent::Chart {
            frame: frame.clone(),
        });
    }

    fn release(&self, metric_id: &str, handle: ChartHandle) {
        self.feed.publish(FeedEvent::Released {
            metric_id: metric_id.to_string(),
            handle,
        });
    }
}

impl SurfaceProvider for ChartFeed {
    fn surface(&self, metric_id: &str) -> Option<Arc<dyn RenderSurface>> {
        if !self.panels.contains(metric_id) {
            return None;
        }
        Some(Arc::new(PanelSurface { feed: self.clone() }))
    }
}

impl Notifier for ChartFeed {
    fn readout(&self, metric_id: &str, text: &str) {
        self.publish(FeedEvent::Readout {
            metric_id: metric_id.to_string(),
            text: text.to_string(),
        });
    }

    fn notice(&self, metric_id: Option<&str>, error: &DashboardError) {
        self.publish(FeedEvent::Notice {
            metric_id: metric_id.map(str::to_string),
            kind: error.kind(),
            message: error.to_string(),
        });
    }
}
