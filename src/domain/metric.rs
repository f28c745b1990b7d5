// Metric domain models
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

/// A single reading. Composite metrics (gps, imu) always travel as one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(f64),
    Composite(Vec<(String, f64)>),
}

impl MetricValue {
    /// Decode a JSON reading: a number, or an object of numeric sub-channels.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(MetricValue::Scalar),
            // Some producers send numbers as strings
            Value::String(s) => s.trim().parse::<f64>().ok().map(MetricValue::Scalar),
            Value::Object(fields) => {
                let channels: Vec<(String, f64)> = fields
                    .iter()
                    .filter_map(|(key, v)| v.as_f64().map(|f| (key.clone(), f)))
                    .collect();
                if channels.is_empty() {
                    None
                } else {
                    Some(MetricValue::Composite(channels))
                }
            }
            _ => None,
        }
    }

    /// Value of a sub-channel. A scalar only answers for the first channel.
    pub fn channel(&self, key: &str, index: usize) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => (index == 0).then_some(*v),
            MetricValue::Composite(channels) => channels
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| *v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub metric_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: MetricValue,
}

impl MetricSample {
    pub fn new(metric_id: impl Into<String>, timestamp: DateTime<Utc>, value: MetricValue) -> Self {
        Self {
            metric_id: metric_id.into(),
            timestamp,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDescriptor {
    pub key: String,
    pub label: String,
    pub color: Option<String>,
    /// Prefix used on the card readout, e.g. "Lat"
    pub readout: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDescriptor {
    pub id: String,
    pub title: String,
    pub unit: String,
    pub channels: Vec<ChannelDescriptor>,
}

impl MetricDescriptor {
    /// Single-channel metric labelled with its title and unit
    pub fn scalar(id: &str, title: &str, unit: &str, color: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            unit: unit.to_string(),
            channels: vec![ChannelDescriptor {
                key: id.to_string(),
                label: format!("{} ({})", title, unit),
                color: color.map(str::to_string),
                readout: title.to_string(),
            }],
        }
    }

    pub fn is_composite(&self) -> bool {
        self.channels.len() > 1
    }

    /// Text shown on the metric's card
    pub fn readout(&self, value: &MetricValue) -> String {
        match value {
            MetricValue::Scalar(v) => format!("{}", v),
            MetricValue::Composite(_) => self
                .channels
                .iter()
                .enumerate()
                .map(|(i, c)| match value.channel(&c.key, i) {
                    Some(v) => format!("{}: {}", c.readout, v),
                    None => format!("{}: N/A", c.readout),
                })
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Parse a wire timestamp: epoch seconds (float) or an RFC 3339 string.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            let millis = (secs * 1000.0).round() as i64;
            Utc.timestamp_millis_opt(millis).single()
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}
