use crate::domain::metric::{ChannelDescriptor, MetricDescriptor};
use crate::domain::series::DEFAULT_WINDOW_SIZE;
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub backend: BackendSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub live: LiveSettings,
    #[serde(default)]
    pub endpoints: EndpointSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub realtime_url: String,
    /// Metrics passed along with the realtime `subscribe` event; empty means all
    #[serde(default)]
    pub realtime_filter: Vec<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LiveSettings {
    pub window_size: usize,
    pub teardown_grace_ms: u64,
    pub event_queue: usize,
    pub feed_capacity: usize,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            teardown_grace_ms: 2_000,
            event_queue: 256,
            feed_capacity: 256,
        }
    }
}

/// Backend paths. `${sensor}` and `${node}` are filled in per request.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EndpointSettings {
    pub sensors: String,
    pub nodes: String,
    pub subscribe: String,
    pub unsubscribe: String,
    pub history: String,
    pub select_node: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            sensors: "/api/sensors".to_string(),
            nodes: "/api/nodes-data".to_string(),
            subscribe: "/api/subscribe/${sensor}".to_string(),
            unsubscribe: "/api/unsubscribe/${sensor}".to_string(),
            history: "/api/history/${sensor}".to_string(),
            select_node: "/api/node/${node}".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default)]
    pub metrics: Vec<MetricConfig>,
    #[serde(default)]
    pub layout: LayoutConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MetricConfig {
    pub id: String,
    pub title: String,
    pub unit: String,
    pub color: Option<String>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    pub key: String,
    pub label: String,
    pub color: Option<String>,
    pub readout: Option<String>,
}

/// Metrics that get a chart panel
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LayoutConfig {
    #[serde(default)]
    pub panels: Vec<String>,
}

impl MetricConfig {
    pub fn to_descriptor(&self) -> MetricDescriptor {
        if self.channels.is_empty() {
            return MetricDescriptor::scalar(&self.id, &self.title, &self.unit, self.color.as_deref());
        }

        MetricDescriptor {
            id: self.id.clone(),
            title: self.title.clone(),
            unit: self.unit.clone(),
            channels: self
                .channels
                .iter()
                .map(|c| ChannelDescriptor {
                    key: c.key.clone(),
                    label: c.label.clone(),
                    color: c.color.clone(),
                    readout: c.readout.clone().unwrap_or_else(|| c.key.clone()),
                })
                .collect(),
        }
    }
}

impl MetricsConfig {
    pub fn descriptors(&self) -> Vec<MetricDescriptor> {
        self.metrics.iter().map(MetricConfig::to_descriptor).collect()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for metric in &self.metrics {
            if !seen.insert(metric.id.as_str()) {
                anyhow::bail!("metric {} is configured twice", metric.id);
            }
        }
        for panel in &self.layout.panels {
            if !seen.contains(panel.as_str()) {
                // Not fatal: the panel simply never gets a chart
                tracing::warn!(panel = %panel, "layout panel has no configured metric");
            }
        }
        Ok(())
    }
}

fn default_request_timeout() -> u64 {
    10
}

pub fn load_dashboard_config() -> anyhow::Result<DashboardConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/dashboard"))
        .add_source(
            config::Environment::with_prefix("DASHBOARD")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

pub fn load_metrics_config() -> anyhow::Result<MetricsConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/metrics"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Replace `${name}` placeholders in an endpoint template
pub fn expand_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
