// In-memory doubles for the application ports
use crate::application::sensor_gateway::{SensorGateway, TeardownBeacon};
use crate::application::surface::{Notifier, RenderSurface, SurfaceProvider};
use crate::domain::chart::{ChartFrame, ChartHandle};
use crate::domain::error::DashboardError;
use crate::domain::history::{HistoryPoint, HistoryQuery};
use crate::domain::metric::{ChannelDescriptor, MetricDescriptor, MetricSample, MetricValue};
use crate::domain::node::{Node, SensorSnapshot};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn scalar_sample(metric: &str, t: i64) -> MetricSample {
    MetricSample::new(metric, Utc.timestamp_opt(t, 0).unwrap(), MetricValue::Scalar(t as f64))
}

pub fn imu_descriptor() -> MetricDescriptor {
    let channel = |key: &str, readout: &str| ChannelDescriptor {
        key: key.to_string(),
        label: format!("Accelerometer {} (m/s²)", readout),
        color: None,
        readout: readout.to_string(),
    };
    MetricDescriptor {
        id: "imu".to_string(),
        title: "IMU".to_string(),
        unit: "m/s²".to_string(),
        channels: vec![channel("ax", "X"), channel("ay", "Y"), channel("az", "Z")],
    }
}

fn history_key(query: &HistoryQuery) -> String {
    format!("{} {}..{}", query.metric_id, query.start_param(), query.end_param())
}

#[derive(Default)]
struct PanelLog {
    acquired: usize,
    frames: Vec<ChartFrame>,
    released: usize,
}

/// Surfaces for a fixed set of panels, recording every draw
pub struct RecordingSurfaces {
    panels: HashSet<String>,
    log: Arc<Mutex<HashMap<String, PanelLog>>>,
}

struct RecordingPanel {
    metric_id: String,
    log: Arc<Mutex<HashMap<String, PanelLog>>>,
}

impl RenderSurface for RecordingPanel {
    fn draw(&self, frame: &ChartFrame) {
        let mut log = self.log.lock().unwrap();
        log.entry(self.metric_id.clone()).or_default().frames.push(frame.clone());
    }

    fn release(&self, metric_id: &str, _handle: ChartHandle) {
        let mut log = self.log.lock().unwrap();
        log.entry(metric_id.to_string()).or_default().released += 1;
    }
}

impl RecordingSurfaces {
    pub fn new(panels: &[&str]) -> Self {
        Self {
            panels: panels.iter().map(|p| p.to_string()).collect(),
            log: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn acquired(&self, metric_id: &str) -> usize {
        self.log.lock().unwrap().get(metric_id).map(|l| l.acquired).unwrap_or(0)
    }

    pub fn draws(&self, metric_id: &str) -> usize {
        self.log.lock().unwrap().get(metric_id).map(|l| l.frames.len()).unwrap_or(0)
    }

    pub fn released(&self, metric_id: &str) -> usize {
        self.log.lock().unwrap().get(metric_id).map(|l| l.released).unwrap_or(0)
    }

    pub fn last_frame(&self, metric_id: &str) -> Option<ChartFrame> {
        self.log
            .lock()
            .unwrap()
            .get(metric_id)
            .and_then(|l| l.frames.last().cloned())
    }
}

impl SurfaceProvider for RecordingSurfaces {
    fn surface(&self, metric_id: &str) -> Option<Arc<dyn RenderSurface>> {
        if !self.panels.contains(metric_id) {
            return None;
        }
        self.log.lock().unwrap().entry(metric_id.to_string()).or_default().acquired += 1;
        Some(Arc::new(RecordingPanel {
            metric_id: metric_id.to_string(),
            log: self.log.clone(),
        }))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub readouts: Mutex<Vec<(String, String)>>,
    pub notices: Mutex<Vec<(Option<String>, DashboardError)>>,
}

impl RecordingNotifier {
    pub fn notice_kinds(&self) -> Vec<&'static str> {
        self.notices.lock().unwrap().iter().map(|(_, e)| e.kind()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn readout(&self, metric_id: &str, text: &str) {
        self.readouts
            .lock()
            .unwrap()
            .push((metric_id.to_string(), text.to_string()));
    }

    fn notice(&self, metric_id: Option<&str>, error: &DashboardError) {
        self.notices
            .lock()
            .unwrap()
            .push((metric_id.map(str::to_string), error.clone()));
    }
}

#[derive(Default)]
pub struct RecordingBeacon {
    pub unsubscribed: Mutex<Vec<String>>,
    pub selected: Mutex<Vec<String>>,
}

impl TeardownBeacon for RecordingBeacon {
    fn unsubscribe(&self, sensor: &str) {
        self.unsubscribed.lock().unwrap().push(sensor.to_string());
    }

    fn select_node(&self, node_id: &str) {
        self.selected.lock().unwrap().push(node_id.to_string());
    }
}

/// Scripted backend. History replies are keyed by query and may be delayed
/// to force out-of-order completion.
#[derive(Default)]
pub struct FakeGateway {
    pub snapshot: Mutex<SensorSnapshot>,
    pub nodes: Mutex<Vec<Node>>,
    pub fail_subscriptions: bool,
    pub history: Mutex<HashMap<String, (Duration, Vec<HistoryPoint>)>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn script_history(&self, query: &HistoryQuery, delay: Duration, points: Vec<HistoryPoint>) {
        self.history.lock().unwrap().insert(history_key(query), (delay, points));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SensorGateway for FakeGateway {
    async fn fetch_snapshot(&self) -> anyhow::Result<SensorSnapshot> {
        self.calls.lock().unwrap().push("snapshot".to_string());
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn fetch_nodes(&self) -> anyhow::Result<Vec<Node>> {
        self.calls.lock().unwrap().push("nodes".to_string());
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn subscribe(&self, sensor: &str) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(format!("subscribe {}", sensor));
        if self.fail_subscriptions {
            anyhow::bail!("connection refused");
        }
        Ok(format!("Subscribed to {}", sensor))
    }

    async fn unsubscribe(&self, sensor: &str) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(format!("unsubscribe {}", sensor));
        if self.fail_subscriptions {
            anyhow::bail!("connection refused");
        }
        Ok(format!("Unsubscribed from {}", sensor))
    }

    async fn fetch_history(&self, query: &HistoryQuery) -> anyhow::Result<Vec<HistoryPoint>> {
        let key = history_key(query);
        self.calls.lock().unwrap().push(format!("history {}", key));
        let scripted = self.history.lock().unwrap().remove(&key);
        match scripted {
            Some((delay, points)) => {
                tokio::time::sleep(delay).await;
                Ok(points)
            }
            None => Ok(Vec::new()),
        }
    }
}
