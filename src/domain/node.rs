// Sensor node and snapshot models
use super::metric::MetricValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A remote sensor node shown on the map view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(deserialize_with = "id_as_string")]
    pub node_id: String,
    pub lat: f64,
    pub lon: f64,
}

fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    node_id_from_json(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid node id: {}", value)))
}

/// Node ids arrive as strings or bare numbers
pub fn node_id_from_json(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Latest value per metric for the active node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorSnapshot {
    pub node_id: Option<String>,
    pub readings: Vec<(String, MetricValue)>,
}

impl SensorSnapshot {
    /// Accepts `{node_id, sensors: [{sensor, value}]}` or a flat `{metric: value}` map.
    /// Entries whose value cannot be decoded are skipped.
    pub fn from_json(body: &Value) -> Self {
        let Some(fields) = body.as_object() else {
            return Self::default();
        };

        if let Some(sensors) = fields.get("sensors").and_then(Value::as_array) {
            let readings = sensors
                .iter()
                .filter_map(|entry| {
                    let sensor = entry.get("sensor")?.as_str()?;
                    let value = MetricValue::from_json(entry.get("value")?)?;
                    Some((sensor.to_string(), value))
                })
                .collect();
            return Self {
                node_id: fields.get("node_id").and_then(node_id_from_json),
                readings,
            };
        }

        let readings = fields
            .iter()
            .filter(|(key, _)| key.as_str() != "timestamp" && key.as_str() != "node_id")
            .filter_map(|(key, v)| MetricValue::from_json(v).map(|value| (key.clone(), value)))
            .collect();
        Self {
            node_id: fields.get("node_id").and_then(node_id_from_json),
            readings,
        }
    }
}
