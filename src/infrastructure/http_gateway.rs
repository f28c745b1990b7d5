// HTTP implementation of the sensor gateway
use crate::application::sensor_gateway::SensorGateway;
use crate::domain::history::{HistoryPoint, HistoryQuery};
use crate::domain::metric::{parse_timestamp, MetricValue};
use crate::domain::node::{Node, SensorSnapshot};
use crate::infrastructure::config::{expand_template, EndpointSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpSensorGateway {
    client: reqwest::Client,
    base_url: String,
    endpoints: EndpointSettings,
}

impl HttpSensorGateway {
    pub fn new(base_url: &str, endpoints: EndpointSettings, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints,
        })
    }

    fn url(&self, template: &str, vars: &[(&str, &str)]) -> String {
        let encoded: Vec<(&str, String)> = vars
            .iter()
            .map(|(k, v)| (*k, urlencoding::encode(v).into_owned()))
            .collect();
        let vars: Vec<(&str, &str)> = encoded.iter().map(|(k, v)| (*k, v.as_str())).collect();
        format!("{}{}", self.base_url, expand_template(template, &vars))
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GET {} failed with status {}: {}", url, status, body);
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// POST without a body, returning the backend's `status` text
    async fn post_status(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .post(url)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("POST {} failed with status {}: {}", url, status, body);
        }

        let body = response
            .json::<Value>()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))?;
        Ok(body
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// Decode a history body: an array of `{timestamp, value}`, returned oldest first.
/// Rows that cannot be read are skipped.
fn parse_history(body: &Value) -> Result<Vec<HistoryPoint>> {
    let rows = body
        .as_array()
        .with_context(|| format!("Unexpected history response: {}", body))?;

    let mut points: Vec<HistoryPoint> = rows
        .iter()
        .filter_map(|row| {
            let timestamp = row.get("timestamp").and_then(parse_timestamp);
            let value = row.get("value").and_then(MetricValue::from_json);
            match (timestamp, value) {
                (Some(t), Some(v)) => Some(HistoryPoint::new(t, v)),
                _ => {
                    tracing::debug!("Skipping unreadable history row: {}", row);
                    None
                }
            }
        })
        .collect();

    points.sort_by_key(|p| p.timestamp);
    Ok(points)
}

#[async_trait]
impl SensorGateway for HttpSensorGateway {
    async fn fetch_snapshot(&self) -> Result<SensorSnapshot> {
        let url = self.url(&self.endpoints.sensors, &[]);
        let body = self.get_json(&url).await?;
        Ok(SensorSnapshot::from_json(&body))
    }

    async fn fetch_nodes(&self) -> Result<Vec<Node>> {
        let url = self.url(&self.endpoints.nodes, &[]);
        let body = self.get_json(&url).await?;
        serde_json::from_value(body).context("Failed to parse node list")
    }

    async fn subscribe(&self, sensor: &str) -> Result<String> {
        let url = self.url(&self.endpoints.subscribe, &[("sensor", sensor)]);
        self.post_status(&url).await
    }

    async fn unsubscribe(&self, sensor: &str) -> Result<String> {
        let url = self.url(&self.endpoints.unsubscribe, &[("sensor", sensor)]);
        self.post_status(&url).await
    }

    async fn fetch_history(&self, query: &HistoryQuery) -> Result<Vec<HistoryPoint>> {
        let url = self.url(&self.endpoints.history, &[("sensor", query.metric_id.as_str())]);
        tracing::debug!(url = %url, start = %query.start, end = %query.end, "Fetching history");

        let response = self
            .client
            .get(&url)
            .query(&[("start", query.start_param()), ("end", query.end_param())])
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        // The backend answers an empty range with 404 and a message
        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(metric = %query.metric_id, "No history in range: {}", body);
            return Ok(Vec::new());
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("History query failed with status {}: {}", status, body);
        }

        let body = response
            .json::<Value>()
            .await
            .context("Failed to parse history response")?;
        parse_history(&body)
    }
}
