// Ports to the sensor backend
use crate::domain::history::{HistoryPoint, HistoryQuery};
use crate::domain::node::{Node, SensorSnapshot};
use async_trait::async_trait;

/// Request/response calls against the backend. No call here retries.
#[async_trait]
pub trait SensorGateway: Send + Sync {
    /// Latest value per metric for the active node
    async fn fetch_snapshot(&self) -> anyhow::Result<SensorSnapshot>;

    /// Nodes for the map view
    async fn fetch_nodes(&self) -> anyhow::Result<Vec<Node>>;

    /// Start server-side push for a metric; returns the backend's status text
    async fn subscribe(&self, sensor: &str) -> anyhow::Result<String>;

    async fn unsubscribe(&self, sensor: &str) -> anyhow::Result<String>;

    /// Points for the query range, oldest first. An empty range is `Ok(vec![])`.
    async fn fetch_history(&self, query: &HistoryQuery) -> anyhow::Result<Vec<HistoryPoint>>;
}

/// Fire-and-forget delivery that is still attempted while the dashboard shuts down.
/// Callers never see an outcome.
pub trait TeardownBeacon: Send + Sync {
    fn unsubscribe(&self, sensor: &str);

    fn select_node(&self, node_id: &str);
}
