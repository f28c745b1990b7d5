// Push events delivered over the realtime channel
use super::error::DashboardError;
use super::metric::{parse_timestamp, MetricValue};
use super::node::node_id_from_json;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub const SENSOR_UPDATE: &str = "sensor_update";
pub const LIVE_UPDATE: &str = "live_update";

#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// One metric of one node
    SensorUpdate {
        node_id: Option<String>,
        sensor: String,
        value: MetricValue,
        timestamp: DateTime<Utc>,
    },
    /// Every subscribed metric at one instant
    LiveUpdate {
        timestamp: DateTime<Utc>,
        readings: Vec<(String, MetricValue)>,
    },
}

impl PushEvent {
    /// Decode the `data` of a named event. Missing timestamps fall back to
    /// `received_at`. Readings whose value cannot be decoded are dropped.
    pub fn decode(event: &str, data: &Value, received_at: DateTime<Utc>) -> Result<Self, DashboardError> {
        let fields = data
            .as_object()
            .ok_or_else(|| DashboardError::MalformedPush(format!("{} payload is not an object", event)))?;
        let timestamp = fields
            .get("timestamp")
            .and_then(parse_timestamp)
            .unwrap_or(received_at);

        match event {
            SENSOR_UPDATE if fields.contains_key("sensor") => {
                let sensor = fields
                    .get("sensor")
                    .and_then(Value::as_str)
                    .ok_or_else(|| DashboardError::MalformedPush("sensor is not a string".to_string()))?;
                let value = fields
                    .get("value")
                    .and_then(MetricValue::from_json)
                    .ok_or_else(|| {
                        DashboardError::MalformedPush(format!("unreadable value for {}", sensor))
                    })?;
                Ok(PushEvent::SensorUpdate {
                    node_id: fields.get("node_id").and_then(node_id_from_json),
                    sensor: sensor.to_string(),
                    value,
                    timestamp,
                })
            }
            // Older backends emit sensor_update as a bare metric map
            SENSOR_UPDATE | LIVE_UPDATE => {
                let readings = fields
                    .iter()
                    .filter(|(key, _)| key.as_str() != "timestamp" && key.as_str() != "node_id")
                    .filter_map(|(key, v)| MetricValue::from_json(v).map(|value| (key.clone(), value)))
                    .collect();
                Ok(PushEvent::LiveUpdate { timestamp, readings })
            }
            other => Err(DashboardError::MalformedPush(format!("unsupported event {}", other))),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            PushEvent::SensorUpdate { timestamp, .. } | PushEvent::LiveUpdate { timestamp, .. } => {
                *timestamp
            }
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            PushEvent::SensorUpdate { node_id, .. } => node_id.as_deref(),
            PushEvent::LiveUpdate { .. } => None,
        }
    }

    pub fn into_readings(self) -> Vec<(String, MetricValue)> {
        match self {
            PushEvent::SensorUpdate { sensor, value, .. } => vec![(sensor, value)],
            PushEvent::LiveUpdate { readings, .. } => readings,
        }
    }
}
