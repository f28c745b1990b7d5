// HTTP request handlers
use crate::domain::error::DashboardError;
use crate::domain::history::HistoryQuery;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Deserialize)]
pub struct RangeQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Deserialize)]
pub struct SubscriptionBody {
    pub enabled: bool,
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = match &self {
            DashboardError::UnknownMetric(_) | DashboardError::EmptyHistoryResult(_) => StatusCode::NOT_FOUND,
            DashboardError::InvalidQuery(_) | DashboardError::MalformedPush(_) => StatusCode::BAD_REQUEST,
            DashboardError::MissingSurface(_)
            | DashboardError::InvalidTransition { .. }
            | DashboardError::StaleHistory { .. } => StatusCode::CONFLICT,
            DashboardError::NetworkFailure(_) => StatusCode::BAD_GATEWAY,
            DashboardError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = json!({ "error": self.kind(), "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Cards, subscription switches, chart states and nodes in one view
pub async fn get_dashboard(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, DashboardError> {
    Ok(Json(state.controller.inspect().await?))
}

pub async fn get_chart(
    Path(metric): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, DashboardError> {
    Ok(Json(state.controller.chart(&metric).await?))
}

/// Accepted once queued; the switch flips when the backend confirms
pub async fn set_subscription(
    Path(metric): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubscriptionBody>,
) -> Result<StatusCode, DashboardError> {
    state.controller.toggle(&metric, body.enabled).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn open_detail(
    Path(metric): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, DashboardError> {
    state.controller.open_detail(&metric).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn close_detail(
    Path(metric): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, DashboardError> {
    state.controller.close_detail(&metric).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Queue a history query. The result shows up on the event feed.
pub async fn submit_history(
    Path(metric): Path<String>,
    Query(range): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, DashboardError> {
    let (Some(start), Some(end)) = (range.start, range.end) else {
        return Err(DashboardError::InvalidQuery("Start and end date are required".to_string()));
    };
    let query = HistoryQuery::parse(&metric, &start, &end)?;
    let seq = state.controller.submit_history(query).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "seq": seq }))))
}

pub async fn list_nodes(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, DashboardError> {
    let view = state.controller.inspect().await?;
    Ok(Json(view.nodes))
}

pub async fn select_node(
    Path(node_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, DashboardError> {
    state.controller.select_node(&node_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Server-sent events: chart frames, readouts and notices as they happen
pub async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let mut rx = state.feed.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    yield Event::default().event(event.name()).json_data(&event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event feed viewer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
