// View controller - Single event loop applying push updates and user intents
use crate::application::chart_renderer::ChartRenderer;
use crate::application::live_buffer::LiveSeriesBuffer;
use crate::application::sensor_gateway::{SensorGateway, TeardownBeacon};
use crate::application::surface::{Notifier, SurfaceProvider};
use crate::domain::chart::{ChartFrame, ChartHandle, ChartState};
use crate::domain::error::DashboardError;
use crate::domain::history::{HistoryPoint, HistoryQuery, HistoryResult};
use crate::domain::metric::{MetricDescriptor, MetricSample};
use crate::domain::node::{Node, SensorSnapshot};
use crate::domain::push::PushEvent;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub type Reply<T> = oneshot::Sender<Result<T, DashboardError>>;

/// Everything the controller reacts to. Network completions come back
/// through the same queue as user intents.
pub enum DashboardEvent {
    Push(PushEvent),
    Toggle {
        metric: String,
        enabled: bool,
        reply: Reply<()>,
    },
    SubscriptionSettled {
        metric: String,
        enabled: bool,
        seq: u64,
        result: Result<String, DashboardError>,
    },
    OpenDetail {
        metric: String,
        reply: Reply<()>,
    },
    CloseDetail {
        metric: String,
        reply: Reply<()>,
    },
    SubmitHistory {
        query: HistoryQuery,
        reply: Reply<u64>,
    },
    HistoryFetched {
        metric: String,
        seq: u64,
        result: Result<Vec<HistoryPoint>, DashboardError>,
    },
    InitialLoaded {
        seq: u64,
        result: Result<SensorSnapshot, DashboardError>,
    },
    NodesLoaded(Result<Vec<Node>, DashboardError>),
    SelectNode {
        node_id: String,
        reply: Reply<()>,
    },
    Inspect {
        reply: Reply<DashboardView>,
    },
    Chart {
        metric: String,
        reply: Reply<ChartFrame>,
    },
    Teardown {
        reply: Reply<usize>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricView {
    pub id: String,
    pub title: String,
    pub unit: String,
    pub readout: Option<String>,
    pub subscribed: bool,
    /// A toggle is waiting for the backend
    pub pending: bool,
    pub chart: Option<&'static str>,
    pub handle: Option<ChartHandle>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub metrics: Vec<MetricView>,
    pub detail: Option<String>,
    pub selected_node: Option<String>,
    pub nodes: Vec<Node>,
}

/// Switch state of one metric. `intent` follows the user immediately,
/// `acked` only once the backend confirms the latest request.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Subscription {
    acked: bool,
    intent: bool,
    seq: u64,
}

impl Subscription {
    /// The backend is, or may soon be, pushing this metric
    fn active(&self) -> bool {
        self.acked || self.intent
    }
}

/// Outbound collaborators of the controller
#[derive(Clone)]
pub struct Ports {
    pub gateway: Arc<dyn SensorGateway>,
    pub beacon: Arc<dyn TeardownBeacon>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct DashboardController {
    descriptors: Vec<MetricDescriptor>,
    buffer: LiveSeriesBuffer,
    renderer: ChartRenderer,
    subscriptions: HashMap<String, Subscription>,
    readings: HashMap<String, String>,
    latest_history: HashMap<String, u64>,
    latest_snapshot: u64,
    next_seq: u64,
    detail: Option<String>,
    selected_node: Option<String>,
    nodes: Vec<Node>,
    ports: Ports,
    events: mpsc::Sender<DashboardEvent>,
}

fn network(err: anyhow::Error) -> DashboardError {
    DashboardError::NetworkFailure(format!("{:#}", err))
}

impl DashboardController {
    pub fn new(
        descriptors: Vec<MetricDescriptor>,
        window_size: usize,
        surfaces: Arc<dyn SurfaceProvider>,
        ports: Ports,
        events: mpsc::Sender<DashboardEvent>,
    ) -> Self {
        Self {
            descriptors,
            buffer: LiveSeriesBuffer::new(window_size),
            renderer: ChartRenderer::new(surfaces),
            subscriptions: HashMap::new(),
            readings: HashMap::new(),
            latest_history: HashMap::new(),
            latest_snapshot: 0,
            next_seq: 0,
            detail: None,
            selected_node: None,
            nodes: Vec::new(),
            ports,
            events,
        }
    }

    /// Register buffers and bind a chart for every metric that has a surface
    pub fn start(&mut self) {
        for descriptor in &self.descriptors {
            self.buffer.register(&descriptor.id);
            self.subscriptions.insert(descriptor.id.clone(), Subscription::default());

            match self.renderer.bind(&descriptor.id, descriptor) {
                Ok(handle) => tracing::debug!(metric = %descriptor.id, handle = %handle, "chart ready"),
                Err(e) => tracing::warn!(metric = %descriptor.id, "skipping chart: {}", e),
            }
        }
        tracing::info!(
            metrics = self.descriptors.len(),
            charts = self.renderer.bound_metrics().len(),
            window = self.buffer.capacity(),
            "dashboard started"
        );
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<DashboardEvent>) {
        self.start();
        self.load_initial();
        self.load_nodes();

        while let Some(event) = events.recv().await {
            if !self.handle(event) {
                break;
            }
        }
        tracing::info!("dashboard controller stopped");
    }

    /// Apply one event. Returns false once the dashboard has been torn down.
    pub fn handle(&mut self, event: DashboardEvent) -> bool {
        match event {
            DashboardEvent::Push(push) => self.apply_push(push),
            DashboardEvent::Toggle { metric, enabled, reply } => {
                let _ = reply.send(self.toggle(&metric, enabled));
            }
            DashboardEvent::SubscriptionSettled { metric, enabled, seq, result } => {
                self.settle_subscription(&metric, enabled, seq, result)
            }
            DashboardEvent::OpenDetail { metric, reply } => {
                let _ = reply.send(self.open_detail(&metric));
            }
            DashboardEvent::CloseDetail { metric, reply } => {
                let _ = reply.send(self.close_detail(&metric));
            }
            DashboardEvent::SubmitHistory { query, reply } => {
                let _ = reply.send(self.submit_history(query));
            }
            DashboardEvent::HistoryFetched { metric, seq, result } => {
                let _ = self.apply_history(&metric, seq, result);
            }
            DashboardEvent::InitialLoaded { seq, result } => self.apply_initial(seq, result),
            DashboardEvent::NodesLoaded(result) => self.apply_nodes(result),
            DashboardEvent::SelectNode { node_id, reply } => {
                let _ = reply.send(self.select_node(&node_id));
            }
            DashboardEvent::Inspect { reply } => {
                let _ = reply.send(Ok(self.inspect()));
            }
            DashboardEvent::Chart { metric, reply } => {
                let _ = reply.send(self.chart_frame(&metric));
            }
            DashboardEvent::Teardown { reply } => {
                let _ = reply.send(Ok(self.teardown()));
                return false;
            }
        }
        true
    }

    fn descriptor(&self, metric: &str) -> Result<&MetricDescriptor, DashboardError> {
        self.descriptors
            .iter()
            .find(|d| d.id == metric)
            .ok_or_else(|| DashboardError::UnknownMetric(metric.to_string()))
    }

    /// Run a network call off the loop and queue its completion event
    fn spawn_request<F>(&self, request: F)
    where
        F: Future<Output = DashboardEvent> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            let event = request.await;
            if events.send(event).await.is_err() {
                tracing::debug!("controller stopped before request completed");
            }
        });
    }

    fn apply_push(&mut self, push: PushEvent) {
        if let (Some(selected), Some(node)) = (self.selected_node.as_deref(), push.node_id()) {
            if selected != node {
                tracing::debug!(node, selected, "ignoring update from another node");
                return;
            }
        }

        let timestamp = push.timestamp();
        for (metric, value) in push.into_readings() {
            let text = match self.descriptor(&metric) {
                Ok(descriptor) => descriptor.readout(&value),
                Err(e) => {
                    tracing::warn!(metric = %metric, "dropping update: {}", e);
                    continue;
                }
            };

            let sample = MetricSample::new(metric.clone(), timestamp, value);
            if let Err(e) = self.buffer.append(&metric, sample) {
                tracing::warn!(metric = %metric, "dropping update: {}", e);
                continue;
            }
            self.ports.notifier.readout(&metric, &text);
            self.readings.insert(metric.clone(), text);

            let window = match self.buffer.snapshot(&metric) {
                Ok(window) => window,
                Err(e) => {
                    tracing::warn!(metric = %metric, "no live window: {}", e);
                    continue;
                }
            };
            if let Err(e) = self.renderer.push_live(&metric, &window) {
                tracing::debug!(metric = %metric, "chart not updated: {}", e);
            }
        }
    }

    fn toggle(&mut self, metric: &str, enabled: bool) -> Result<(), DashboardError> {
        self.descriptor(metric)?;
        self.next_seq += 1;
        let seq = self.next_seq;
        let entry = self.subscriptions.entry(metric.to_string()).or_default();
        entry.intent = enabled;
        entry.seq = seq;
        tracing::info!(metric, enabled, seq, "subscription toggled");

        let gateway = self.ports.gateway.clone();
        let metric = metric.to_string();
        self.spawn_request(async move {
            let result = if enabled {
                gateway.subscribe(&metric).await
            } else {
                gateway.unsubscribe(&metric).await
            };
            DashboardEvent::SubscriptionSettled {
                metric,
                enabled,
                seq,
                result: result.map_err(network),
            }
        });
        Ok(())
    }

    /// Only the reply to the latest toggle of a metric moves its switch
    fn settle_subscription(
        &mut self,
        metric: &str,
        enabled: bool,
        seq: u64,
        result: Result<String, DashboardError>,
    ) {
        let Some(entry) = self.subscriptions.get_mut(metric) else {
            tracing::debug!(metric, "subscription reply for untracked metric");
            return;
        };
        if entry.seq != seq {
            tracing::debug!(metric, enabled, seq, latest = entry.seq, "superseded subscription reply");
            return;
        }

        match result {
            Ok(status) => {
                tracing::info!(metric, enabled, status = %status, "subscription updated");
                entry.acked = enabled;
                entry.intent = enabled;
            }
            Err(e) => {
                // Server-side state may now disagree with the switch; no retry
                tracing::warn!(metric, enabled, "subscription request failed: {}", e);
                entry.intent = entry.acked;
                self.ports.notifier.notice(Some(metric), &e);
            }
        }
    }

    fn open_detail(&mut self, metric: &str) -> Result<(), DashboardError> {
        self.descriptor(metric)?;
        if let Some(open) = self.detail.clone() {
            if open != metric {
                self.close_detail(&open)?;
            }
        }
        self.detail = Some(metric.to_string());
        Ok(())
    }

    /// Leave the detail view: drop pending history and go back to live data
    fn close_detail(&mut self, metric: &str) -> Result<(), DashboardError> {
        self.descriptor(metric)?;
        self.next_seq += 1;
        self.latest_history.insert(metric.to_string(), self.next_seq);
        if self.detail.as_deref() == Some(metric) {
            self.detail = None;
        }

        match self.renderer.state(metric) {
            Some(ChartState::Live) | Some(ChartState::History { .. }) => {
                let window = self.buffer.snapshot(metric)?;
                self.renderer.resume_live(metric, &window)
            }
            _ => Ok(()),
        }
    }

    /// Allocate the sequence number that the next response must carry to be shown
    fn begin_history(&mut self, query: &HistoryQuery) -> Result<u64, DashboardError> {
        let metric = query.metric_id.as_str();
        self.descriptor(metric)?;
        if self.renderer.handle(metric).is_none() {
            return Err(DashboardError::MissingSurface(metric.to_string()));
        }
        if self.detail.as_deref() != Some(metric) {
            self.open_detail(metric)?;
        }

        self.next_seq += 1;
        self.latest_history.insert(metric.to_string(), self.next_seq);
        Ok(self.next_seq)
    }

    fn submit_history(&mut self, query: HistoryQuery) -> Result<u64, DashboardError> {
        let seq = self.begin_history(&query)?;
        tracing::info!(
            metric = %query.metric_id,
            seq,
            start = %query.start,
            end = %query.end,
            "history requested"
        );

        let gateway = self.ports.gateway.clone();
        self.spawn_request(async move {
            let result = gateway.fetch_history(&query).await.map_err(network);
            DashboardEvent::HistoryFetched {
                metric: query.metric_id,
                seq,
                result,
            }
        });
        Ok(seq)
    }

    /// Show a history response if it answers the latest request for the metric
    fn apply_history(
        &mut self,
        metric: &str,
        seq: u64,
        result: Result<Vec<HistoryPoint>, DashboardError>,
    ) -> Result<(), DashboardError> {
        if self.latest_history.get(metric) != Some(&seq) {
            let err = DashboardError::StaleHistory {
                metric: metric.to_string(),
                seq,
            };
            tracing::debug!(metric, seq, "{}", err);
            return Err(err);
        }

        let points = match result {
            Ok(points) => points,
            Err(e) => {
                tracing::warn!(metric, seq, "history request failed: {}", e);
                self.ports.notifier.notice(Some(metric), &e);
                return Err(e);
            }
        };

        let result = HistoryResult::new(metric.to_string(), seq, points);
        match self.renderer.load_history(metric, &result) {
            Ok(()) => {
                tracing::info!(metric, seq, points = result.points.len(), "history shown");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(metric, seq, "history not shown: {}", e);
                self.ports.notifier.notice(Some(metric), &e);
                Err(e)
            }
        }
    }

    /// Fetch card values. Only the reply to the latest fetch is applied.
    fn load_initial(&mut self) {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.latest_snapshot = seq;

        let gateway = self.ports.gateway.clone();
        self.spawn_request(async move {
            DashboardEvent::InitialLoaded {
                seq,
                result: gateway.fetch_snapshot().await.map_err(network),
            }
        });
    }

    fn apply_initial(&mut self, seq: u64, result: Result<SensorSnapshot, DashboardError>) {
        if seq != self.latest_snapshot {
            tracing::debug!(seq, latest = self.latest_snapshot, "dropping superseded sensor snapshot");
            return;
        }
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("initial sensor snapshot failed: {}", e);
                self.ports.notifier.notice(None, &e);
                return;
            }
        };

        if let (Some(selected), Some(node)) = (self.selected_node.as_deref(), snapshot.node_id.as_deref()) {
            if selected != node {
                tracing::debug!(node, selected, "dropping snapshot of another node");
                return;
            }
        }
        if self.selected_node.is_none() {
            self.selected_node = snapshot.node_id.clone();
        }
        for (metric, value) in snapshot.readings {
            let Some(descriptor) = self.descriptors.iter().find(|d| d.id == metric) else {
                tracing::debug!(metric = %metric, "snapshot carries untracked metric");
                continue;
            };
            let text = descriptor.readout(&value);
            self.ports.notifier.readout(&metric, &text);
            self.readings.insert(metric, text);
        }
    }

    fn load_nodes(&self) {
        let gateway = self.ports.gateway.clone();
        self.spawn_request(async move {
            DashboardEvent::NodesLoaded(gateway.fetch_nodes().await.map_err(network))
        });
    }

    fn apply_nodes(&mut self, result: Result<Vec<Node>, DashboardError>) {
        match result {
            Ok(nodes) => {
                tracing::info!(nodes = nodes.len(), "nodes loaded");
                self.nodes = nodes;
            }
            Err(e) => {
                tracing::warn!("node list failed: {}", e);
                self.ports.notifier.notice(None, &e);
            }
        }
    }

    /// Switch to another node: live data so far belongs to the old one
    fn select_node(&mut self, node_id: &str) -> Result<(), DashboardError> {
        if !self.nodes.is_empty() && !self.nodes.iter().any(|n| n.node_id == node_id) {
            return Err(DashboardError::InvalidQuery(format!("unknown node {}", node_id)));
        }

        if let Some(open) = self.detail.clone() {
            self.close_detail(&open)?;
        }
        self.ports.beacon.select_node(node_id);
        self.selected_node = Some(node_id.to_string());
        self.buffer.clear_all();
        self.readings.clear();
        for metric in self.renderer.bound_metrics() {
            if let Err(e) = self.renderer.resume_live(&metric, &[]) {
                tracing::debug!(metric = %metric, "chart not reset: {}", e);
            }
        }

        tracing::info!(node = node_id, "node selected");
        self.load_initial();
        Ok(())
    }

    fn inspect(&self) -> DashboardView {
        let metrics = self
            .descriptors
            .iter()
            .map(|d| MetricView {
                id: d.id.clone(),
                title: d.title.clone(),
                unit: d.unit.clone(),
                readout: self.readings.get(&d.id).cloned(),
                subscribed: self.subscriptions.get(&d.id).is_some_and(|s| s.acked),
                pending: self.subscriptions.get(&d.id).is_some_and(|s| s.intent != s.acked),
                chart: self.renderer.state(&d.id).map(|s| s.name()),
                handle: self.renderer.handle(&d.id),
            })
            .collect();

        DashboardView {
            metrics,
            detail: self.detail.clone(),
            selected_node: self.selected_node.clone(),
            nodes: self.nodes.clone(),
        }
    }

    fn chart_frame(&self, metric: &str) -> Result<ChartFrame, DashboardError> {
        self.descriptor(metric)?;
        self.renderer
            .frame(metric)
            .cloned()
            .ok_or_else(|| DashboardError::MissingSurface(metric.to_string()))
    }

    /// Best-effort unsubscribe for everything on or being switched on, then
    /// release all charts. Replies still in flight no longer count.
    fn teardown(&mut self) -> usize {
        let mut sent = 0;
        for (metric, subscription) in self.subscriptions.iter_mut() {
            if subscription.active() {
                self.ports.beacon.unsubscribe(metric);
                sent += 1;
            }
            self.next_seq += 1;
            *subscription = Subscription {
                seq: self.next_seq,
                ..Subscription::default()
            };
        }
        self.renderer.dispose_all();
        self.detail = None;

        tracing::info!(unsubscribed = sent, "dashboard torn down");
        sent
    }
}

/// Cloneable front door to the controller's queue
#[derive(Clone)]
pub struct ControllerHandle {
    events: mpsc::Sender<DashboardEvent>,
}

impl ControllerHandle {
    pub fn new(events: mpsc::Sender<DashboardEvent>) -> Self {
        Self { events }
    }

    /// Queue a push update. Updates are applied in the order they are queued.
    pub async fn push(&self, event: PushEvent) -> Result<(), DashboardError> {
        self.events
            .send(DashboardEvent::Push(event))
            .await
            .map_err(|_| DashboardError::Stopped)
    }

    pub async fn toggle(&self, metric: &str, enabled: bool) -> Result<(), DashboardError> {
        let metric = metric.to_string();
        self.request(|reply| DashboardEvent::Toggle { metric, enabled, reply })
            .await
    }

    pub async fn open_detail(&self, metric: &str) -> Result<(), DashboardError> {
        let metric = metric.to_string();
        self.request(|reply| DashboardEvent::OpenDetail { metric, reply }).await
    }

    pub async fn close_detail(&self, metric: &str) -> Result<(), DashboardError> {
        let metric = metric.to_string();
        self.request(|reply| DashboardEvent::CloseDetail { metric, reply }).await
    }

    pub async fn submit_history(&self, query: HistoryQuery) -> Result<u64, DashboardError> {
        self.request(|reply| DashboardEvent::SubmitHistory { query, reply }).await
    }

    pub async fn select_node(&self, node_id: &str) -> Result<(), DashboardError> {
        let node_id = node_id.to_string();
        self.request(|reply| DashboardEvent::SelectNode { node_id, reply }).await
    }

    pub async fn inspect(&self) -> Result<DashboardView, DashboardError> {
        self.request(|reply| DashboardEvent::Inspect { reply }).await
    }

    pub async fn chart(&self, metric: &str) -> Result<ChartFrame, DashboardError> {
        let metric = metric.to_string();
        self.request(|reply| DashboardEvent::Chart { metric, reply }).await
    }

    /// Returns how many unsubscribe beacons were dispatched
    pub async fn teardown(&self) -> Result<usize, DashboardError> {
        self.request(|reply| DashboardEvent::Teardown { reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> DashboardEvent) -> Result<T, DashboardError> {
        let (reply, response) = oneshot::channel();
        self.events
            .send(build(reply))
            .await
            .map_err(|_| DashboardError::Stopped)?;
        response.await.map_err(|_| DashboardError::Stopped)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{
        imu_descriptor, FakeGateway, RecordingBeacon, RecordingNotifier, RecordingSurfaces,
    };
    use crate::domain::metric::MetricValue;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    struct Harness {
        controller: DashboardController,
        events: mpsc::Receiver<DashboardEvent>,
        gateway: Arc<FakeGateway>,
        beacon: Arc<RecordingBeacon>,
        notifier: Arc<RecordingNotifier>,
        surfaces: Arc<RecordingSurfaces>,
    }

    fn descriptors() -> Vec<MetricDescriptor> {
        vec![
            MetricDescriptor::scalar("temperature", "Temperature", "°C", Some("red")),
            MetricDescriptor::scalar("pH", "pH Level", "pH", Some("brown")),
            imu_descriptor(),
            MetricDescriptor::scalar("soc", "State of Charge", "%", None),
        ]
    }

    fn harness_with(gateway: FakeGateway) -> Harness {
        let gateway = Arc::new(gateway);
        let beacon = Arc::new(RecordingBeacon::default());
        let notifier = Arc::new(RecordingNotifier::default());
        // soc has no panel
        let surfaces = Arc::new(RecordingSurfaces::new(&["temperature", "pH", "imu"]));
        let (tx, rx) = mpsc::channel(64);
        let mut controller = DashboardController::new(
            descriptors(),
            30,
            surfaces.clone(),
            Ports {
                gateway: gateway.clone(),
                beacon: beacon.clone(),
                notifier: notifier.clone(),
            },
            tx,
        );
        controller.start();
        Harness {
            controller,
            events: rx,
            gateway,
            beacon,
            notifier,
            surfaces,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeGateway::default())
    }

    fn at(t: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(t, 0).unwrap()
    }

    fn live(t: i64, readings: &[(&str, MetricValue)]) -> PushEvent {
        PushEvent::LiveUpdate {
            timestamp: at(t),
            readings: readings
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    fn points(values: &[f64]) -> Vec<HistoryPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| HistoryPoint::new(at(1_000 + i as i64), MetricValue::Scalar(*v)))
            .collect()
    }

    fn ph_query() -> HistoryQuery {
        HistoryQuery::parse("pH", "2024-01-01", "2024-01-02").unwrap()
    }

    fn ph_query_until(end: &str) -> HistoryQuery {
        HistoryQuery::parse("pH", "2024-01-01", end).unwrap()
    }

    /// Switch a metric on and apply the backend's reply
    async fn subscribe_acked(h: &mut Harness, metric: &str) {
        h.controller.toggle(metric, true).unwrap();
        let settled = h.events.recv().await.unwrap();
        h.controller.handle(settled);
    }

    #[test]
    fn test_start_skips_metrics_without_surface() {
        let h = harness();
        let view = h.controller.inspect();
        let soc = view.metrics.iter().find(|m| m.id == "soc").unwrap();
        assert!(soc.chart.is_none());
        let temp = view.metrics.iter().find(|m| m.id == "temperature").unwrap();
        assert_eq!(temp.chart, Some("live"));
        assert!(!temp.subscribed);
    }

    #[test]
    fn test_push_updates_buffer_chart_and_card() {
        let mut h = harness();
        let imu = MetricValue::Composite(vec![
            ("ax".to_string(), 1.0),
            ("ay".to_string(), 2.0),
            ("az".to_string(), 3.0),
        ]);

        h.controller.handle(DashboardEvent::Push(live(
            1,
            &[("temperature", MetricValue::Scalar(21.5)), ("imu", imu), ("salinity", MetricValue::Scalar(35.0))],
        )));
        h.controller.handle(DashboardEvent::Push(live(2, &[("soc", MetricValue::Scalar(80.0))])));

        let frame = h.controller.chart_frame("temperature").unwrap();
        assert_eq!(frame.datasets[0].data, vec![Some(21.5)]);
        assert_eq!(h.controller.buffer.len("soc"), 1);

        let readouts = h.notifier.readouts.lock().unwrap().clone();
        assert!(readouts.contains(&("imu".to_string(), "X: 1, Y: 2, Z: 3".to_string())));
        assert!(!readouts.iter().any(|(m, _)| m == "salinity"));
        assert_eq!(h.surfaces.last_frame("imu").unwrap().datasets.len(), 3);
    }

    #[test]
    fn test_updates_from_other_nodes_are_ignored() {
        let mut h = harness();
        h.controller.selected_node = Some("1".to_string());

        let update = |node: &str, t: i64| PushEvent::SensorUpdate {
            node_id: Some(node.to_string()),
            sensor: "pH".to_string(),
            value: MetricValue::Scalar(7.0),
            timestamp: at(t),
        };
        h.controller.handle(DashboardEvent::Push(update("2", 1)));
        h.controller.handle(DashboardEvent::Push(update("1", 2)));

        let frame = h.controller.chart_frame("pH").unwrap();
        assert_eq!(frame.labels, vec![at(2)]);
    }

    #[tokio::test]
    async fn test_last_history_request_wins() {
        let mut h = harness();

        let first = h.controller.begin_history(&ph_query()).unwrap();
        let second = h.controller.begin_history(&ph_query()).unwrap();
        assert!(second > first);

        // Second response lands first, then the slow first one
        h.controller.apply_history("pH", second, Ok(points(&[7.5, 7.6]))).unwrap();
        let err = h.controller.apply_history("pH", first, Ok(points(&[1.0]))).unwrap_err();

        assert!(matches!(err, DashboardError::StaleHistory { .. }));
        let frame = h.controller.chart_frame("pH").unwrap();
        assert_eq!(frame.mode, "history");
        assert_eq!(frame.datasets[0].data, vec![Some(7.5), Some(7.6)]);
    }

    #[tokio::test]
    async fn test_last_history_request_wins_through_event_loop() {
        let (older, newer) = (ph_query_until("2024-01-02"), ph_query_until("2024-01-03"));
        let gateway = FakeGateway::default();
        gateway.script_history(&older, Duration::from_millis(150), points(&[1.0]));
        gateway.script_history(&newer, Duration::from_millis(0), points(&[7.5, 7.6]));
        let h = harness_with(gateway);

        let (tx, rx) = (h.controller.events.clone(), h.events);
        let handle = ControllerHandle::new(tx);
        let task = tokio::spawn(h.controller.run(rx));

        let first = handle.submit_history(older).await.unwrap();
        let second = handle.submit_history(newer).await.unwrap();
        assert!(second > first);
        tokio::time::sleep(Duration::from_millis(400)).await;

        let frame = handle.chart("pH").await.unwrap();
        assert_eq!(frame.mode, "history");
        assert_eq!(frame.datasets[0].data, vec![Some(7.5), Some(7.6)]);
        assert_eq!(
            h.gateway.calls().iter().filter(|c| c.starts_with("history pH")).count(),
            2
        );

        handle.teardown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_history_is_reported_not_drawn() {
        let mut h = harness();
        let draws = h.surfaces.draws("temperature");

        let query = HistoryQuery::parse("temperature", "2024-01-01", "2024-01-02").unwrap();
        let seq = h.controller.begin_history(&query).unwrap();
        let err = h.controller.apply_history("temperature", seq, Ok(Vec::new())).unwrap_err();

        assert_eq!(err, DashboardError::EmptyHistoryResult("temperature".to_string()));
        assert_eq!(h.surfaces.draws("temperature"), draws);
        assert_eq!(h.controller.renderer.state("temperature"), Some(ChartState::Live));
        assert_eq!(h.notifier.notice_kinds(), vec!["empty_history"]);
    }

    #[tokio::test]
    async fn test_history_failure_leaves_chart_unchanged() {
        let mut h = harness();
        let seq = h.controller.begin_history(&ph_query()).unwrap();
        let failure = DashboardError::NetworkFailure("timed out".to_string());

        assert!(h.controller.apply_history("pH", seq, Err(failure)).is_err());
        assert_eq!(h.controller.renderer.state("pH"), Some(ChartState::Live));
        assert_eq!(h.notifier.notice_kinds(), vec!["network_failure"]);
    }

    #[tokio::test]
    async fn test_closing_detail_resumes_live_and_drops_late_history() {
        let mut h = harness();
        h.controller.handle(DashboardEvent::Push(live(1, &[("pH", MetricValue::Scalar(7.0))])));
        let before = h.controller.chart_frame("pH").unwrap();

        let seq = h.controller.begin_history(&ph_query()).unwrap();
        assert_eq!(h.controller.detail.as_deref(), Some("pH"));
        h.controller.apply_history("pH", seq, Ok(points(&[6.0, 6.1]))).unwrap();

        // Arrives while the history view is up
        h.controller.handle(DashboardEvent::Push(live(2, &[("pH", MetricValue::Scalar(7.1))])));
        assert_eq!(h.controller.chart_frame("pH").unwrap().mode, "history");

        let pending = h.controller.begin_history(&ph_query()).unwrap();
        h.controller.close_detail("pH").unwrap();
        assert!(h.controller.detail.is_none());

        let frame = h.controller.chart_frame("pH").unwrap();
        assert_eq!(frame.mode, "live");
        assert_eq!(frame.handle, before.handle);
        assert_eq!(frame.labels, vec![at(1), at(2)]);

        assert!(h.controller.apply_history("pH", pending, Ok(points(&[5.0]))).is_err());
        assert_eq!(h.controller.chart_frame("pH").unwrap().mode, "live");
    }

    #[tokio::test]
    async fn test_history_needs_a_chart() {
        let mut h = harness();
        let query = HistoryQuery::parse("soc", "2024-01-01", "2024-01-01").unwrap();
        assert_eq!(
            h.controller.submit_history(query).unwrap_err(),
            DashboardError::MissingSurface("soc".to_string())
        );
        let query = HistoryQuery::parse("salinity", "2024-01-01", "2024-01-01").unwrap();
        assert!(h.controller.submit_history(query).is_err());
    }

    #[tokio::test]
    async fn test_toggle_updates_state_after_backend_confirms() {
        let mut h = harness();
        h.controller.toggle("pH", true).unwrap();
        assert!(!h.controller.subscriptions["pH"].acked);
        let ph = h.controller.inspect().metrics.into_iter().find(|m| m.id == "pH").unwrap();
        assert!(ph.pending && !ph.subscribed);

        let settled = h.events.recv().await.unwrap();
        assert!(matches!(settled, DashboardEvent::SubscriptionSettled { .. }));
        h.controller.handle(settled);

        assert!(h.controller.subscriptions["pH"].acked);
        assert!(h.controller.subscriptions["pH"].intent);
        assert_eq!(h.gateway.calls(), vec!["subscribe pH".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_toggle_keeps_state_and_notifies() {
        let mut h = harness_with(FakeGateway {
            fail_subscriptions: true,
            ..Default::default()
        });
        h.controller.toggle("temperature", true).unwrap();
        let settled = h.events.recv().await.unwrap();
        h.controller.handle(settled);

        assert!(!h.controller.subscriptions["temperature"].active());
        assert_eq!(h.notifier.notice_kinds(), vec!["network_failure"]);
        assert_eq!(
            h.controller.toggle("salinity", true).unwrap_err(),
            DashboardError::UnknownMetric("salinity".to_string())
        );
    }

    #[tokio::test]
    async fn test_initial_snapshot_fills_cards_and_node() {
        let gateway = FakeGateway::default();
        *gateway.snapshot.lock().unwrap() = SensorSnapshot {
            node_id: Some("7".to_string()),
            readings: vec![
                ("temperature".to_string(), MetricValue::Scalar(18.25)),
                ("salinity".to_string(), MetricValue::Scalar(35.0)),
            ],
        };
        let mut h = harness_with(gateway);

        h.controller.load_initial();
        let loaded = h.events.recv().await.unwrap();
        h.controller.handle(loaded);

        let view = h.controller.inspect();
        assert_eq!(view.selected_node.as_deref(), Some("7"));
        let temp = view.metrics.iter().find(|m| m.id == "temperature").unwrap();
        assert_eq!(temp.readout.as_deref(), Some("18.25"));
        // Cards only; charts wait for push data
        assert!(h.controller.chart_frame("temperature").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_select_node_resets_live_data() {
        let gateway = FakeGateway::default();
        *gateway.nodes.lock().unwrap() = vec![
            Node { node_id: "1".to_string(), lat: -33.5, lon: -70.6 },
            Node { node_id: "2".to_string(), lat: -20.0, lon: -70.0 },
        ];
        let mut h = harness_with(gateway);
        h.controller.load_nodes();
        let loaded = h.events.recv().await.unwrap();
        h.controller.handle(loaded);

        h.controller.handle(DashboardEvent::Push(live(1, &[("temperature", MetricValue::Scalar(20.0))])));
        assert!(h.controller.select_node("9").is_err());
        h.controller.select_node("2").unwrap();

        assert_eq!(h.controller.selected_node.as_deref(), Some("2"));
        assert_eq!(*h.beacon.selected.lock().unwrap(), vec!["2".to_string()]);
        assert!(h.controller.chart_frame("temperature").unwrap().is_empty());
        assert_eq!(h.controller.buffer.len("temperature"), 0);
        assert!(matches!(h.events.recv().await.unwrap(), DashboardEvent::InitialLoaded { .. }));
    }

    #[tokio::test]
    async fn test_out_of_order_toggle_replies_follow_last_action() {
        let mut h = harness();
        h.controller.toggle("pH", true).unwrap();
        h.controller.toggle("pH", false).unwrap();

        let mut replies = vec![h.events.recv().await.unwrap(), h.events.recv().await.unwrap()];
        // The "on" reply lands last
        replies.sort_by_key(|e| matches!(e, DashboardEvent::SubscriptionSettled { enabled: true, .. }));
        for reply in replies {
            h.controller.handle(reply);
        }

        let ph = h.controller.subscriptions["pH"];
        assert!(!ph.acked);
        assert!(!ph.intent);
    }

    #[tokio::test]
    async fn test_snapshot_from_before_node_switch_is_dropped() {
        let gateway = FakeGateway::default();
        *gateway.nodes.lock().unwrap() = vec![
            Node { node_id: "1".to_string(), lat: -33.5, lon: -70.6 },
            Node { node_id: "2".to_string(), lat: -20.0, lon: -70.0 },
        ];
        *gateway.snapshot.lock().unwrap() = SensorSnapshot {
            node_id: Some("1".to_string()),
            readings: vec![("temperature".to_string(), MetricValue::Scalar(99.0))],
        };
        let mut h = harness_with(gateway);
        h.controller.load_nodes();
        let loaded = h.events.recv().await.unwrap();
        h.controller.handle(loaded);

        h.controller.load_initial();
        let late = h.events.recv().await.unwrap();
        h.controller.select_node("2").unwrap();
        h.controller.handle(late);

        // The fresh reply still carries node 1's readings
        let fresh = h.events.recv().await.unwrap();
        h.controller.handle(fresh);

        let view = h.controller.inspect();
        assert_eq!(view.selected_node.as_deref(), Some("2"));
        let temp = view.metrics.iter().find(|m| m.id == "temperature").unwrap();
        assert!(temp.readout.is_none());
        assert!(h.notifier.readouts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_teardown_unsubscribes_active_metrics_only() {
        let mut h = harness();
        subscribe_acked(&mut h, "pH").await;
        subscribe_acked(&mut h, "imu").await;
        h.controller.toggle("imu", false).unwrap();
        let settled = h.events.recv().await.unwrap();
        h.controller.handle(settled);

        let (reply, response) = oneshot::channel();
        let keep_running = h.controller.handle(DashboardEvent::Teardown { reply });

        assert!(!keep_running);
        assert_eq!(response.await.unwrap().unwrap(), 1);
        assert_eq!(*h.beacon.unsubscribed.lock().unwrap(), vec!["pH".to_string()]);
        assert!(h.controller.subscriptions.values().all(|s| !s.active()));
        assert_eq!(h.controller.renderer.state("pH"), Some(ChartState::Disposed));
        assert_eq!(h.surfaces.released("temperature"), 1);
    }

    #[tokio::test]
    async fn test_teardown_before_subscribe_settles_still_unsubscribes() {
        let mut h = harness();
        h.controller.toggle("pH", true).unwrap();

        let (reply, response) = oneshot::channel();
        h.controller.handle(DashboardEvent::Teardown { reply });
        assert_eq!(response.await.unwrap().unwrap(), 1);
        assert_eq!(*h.beacon.unsubscribed.lock().unwrap(), vec!["pH".to_string()]);

        // The subscribe reply arriving afterwards does not turn the switch back on
        let settled = h.events.recv().await.unwrap();
        h.controller.handle(settled);
        assert!(!h.controller.subscriptions["pH"].active());
    }
}
