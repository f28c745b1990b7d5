// History query domain models
use super::error::DashboardError;
use super::metric::{MetricSample, MetricValue};
use chrono::{DateTime, NaiveDate, Utc};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Bounded range request for one metric. Both bounds are whole days, inclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryQuery {
    pub metric_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl HistoryQuery {
    pub fn new(metric_id: String, start: NaiveDate, end: NaiveDate) -> Result<Self, DashboardError> {
        if start > end {
            return Err(DashboardError::InvalidQuery(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self {
            metric_id,
            start,
            end,
        })
    }

    /// Build from the `YYYY-MM-DD` strings of the date-range form
    pub fn parse(metric_id: &str, start: &str, end: &str) -> Result<Self, DashboardError> {
        let parse = |label: &str, raw: &str| {
            NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
                DashboardError::InvalidQuery(format!("{} date '{}' is not YYYY-MM-DD", label, raw))
            })
        };
        Self::new(metric_id.to_string(), parse("start", start)?, parse("end", end)?)
    }

    pub fn start_param(&self) -> String {
        self.start.format(DATE_FORMAT).to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format(DATE_FORMAT).to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPoint {
    pub timestamp: DateTime<Utc>,
    pub value: MetricValue,
}

impl HistoryPoint {
    pub fn new(timestamp: DateTime<Utc>, value: MetricValue) -> Self {
        Self { timestamp, value }
    }
}

/// Fetched history tagged with the sequence number of the request that asked for it
#[derive(Debug, Clone)]
pub struct HistoryResult {
    pub metric_id: String,
    pub seq: u64,
    pub points: Vec<HistoryPoint>,
}

impl HistoryResult {
    pub fn new(metric_id: String, seq: u64, points: Vec<HistoryPoint>) -> Self {
        Self {
            metric_id,
            seq,
            points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn to_samples(&self) -> Vec<MetricSample> {
        self.points
            .iter()
            .map(|p| MetricSample::new(self.metric_id.clone(), p.timestamp, p.value.clone()))
            .collect()
    }
}
