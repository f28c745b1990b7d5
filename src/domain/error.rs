// Dashboard error taxonomy
use thiserror::Error;

/// Failures the dashboard reports and then moves on from. None of them
/// stop the event loop.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DashboardError {
    #[error("no rendering surface for metric {0}")]
    MissingSurface(String),

    #[error("network request failed: {0}")]
    NetworkFailure(String),

    #[error("no history data for {0} in the selected range")]
    EmptyHistoryResult(String),

    #[error("unknown metric {0}")]
    UnknownMetric(String),

    #[error("history response #{seq} for {metric} was superseded")]
    StaleHistory { metric: String, seq: u64 },

    #[error("cannot {operation} chart {metric} while {state}")]
    InvalidTransition {
        metric: String,
        operation: &'static str,
        state: &'static str,
    },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("malformed push event: {0}")]
    MalformedPush(String),

    #[error("dashboard controller has stopped")]
    Stopped,
}

impl DashboardError {
    /// Short machine-readable tag used on the event feed
    pub fn kind(&self) -> &'static str {
        match self {
            DashboardError::MissingSurface(_) => "missing_surface",
            DashboardError::NetworkFailure(_) => "network_failure",
            DashboardError::EmptyHistoryResult(_) => "empty_history",
            DashboardError::UnknownMetric(_) => "unknown_metric",
            DashboardError::StaleHistory { .. } => "stale_history",
            DashboardError::InvalidTransition { .. } => "invalid_transition",
            DashboardError::InvalidQuery(_) => "invalid_query",
            DashboardError::MalformedPush(_) => "malformed_push",
            DashboardError::Stopped => "stopped",
        }
    }
}
