// Fire-and-forget HTTP beacons
use crate::application::sensor_gateway::TeardownBeacon;
use crate::infrastructure::config::{expand_template, EndpointSettings};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinSet;

/// Each dispatch is sent on its own task and nobody waits on the reply.
/// At shutdown, [`HttpBeacon::flush`] gives in-flight sends a bounded grace period.
pub struct HttpBeacon {
    client: reqwest::Client,
    base_url: String,
    endpoints: EndpointSettings,
    inflight: Mutex<JoinSet<()>>,
}

impl HttpBeacon {
    pub fn new(base_url: &str, endpoints: EndpointSettings, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build beacon client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints,
            inflight: Mutex::new(JoinSet::new()),
        })
    }

    fn dispatch(&self, path: String, body: Value) {
        let url = format!("{}{}", self.base_url, path);
        let client = self.client.clone();
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        while inflight.try_join_next().is_some() {}

        inflight.spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(response) => tracing::debug!(url = %url, status = %response.status(), "beacon delivered"),
                Err(e) => tracing::debug!(url = %url, "beacon not delivered: {}", e),
            }
        });
    }

    /// Wait up to `grace` for dispatched beacons. Returns how many were pending.
    pub async fn flush(&self, grace: Duration) -> usize {
        let mut pending = std::mem::take(&mut *self.inflight.lock().unwrap_or_else(PoisonError::into_inner));
        let total = pending.len();

        let drained = tokio::time::timeout(grace, async {
            while pending.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::warn!(remaining = pending.len(), "abandoning beacons still in flight");
        }
        total
    }
}

impl TeardownBeacon for HttpBeacon {
    fn unsubscribe(&self, sensor: &str) {
        let encoded = urlencoding::encode(sensor);
        let path = expand_template(&self.endpoints.unsubscribe, &[("sensor", encoded.as_ref())]);
        self.dispatch(path, json!({ "sensor": sensor }));
    }

    fn select_node(&self, node_id: &str) {
        let encoded = urlencoding::encode(node_id);
        let path = expand_template(&self.endpoints.select_node, &[("node", encoded.as_ref())]);
        self.dispatch(path, json!({ "id": node_id }));
    }
}
