// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use anyhow::Context;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::view_controller::{ControllerHandle, DashboardController, Ports};
use crate::infrastructure::beacon::HttpBeacon;
use crate::infrastructure::chart_feed::ChartFeed;
use crate::infrastructure::config::{load_dashboard_config, load_metrics_config};
use crate::infrastructure::http_gateway::HttpSensorGateway;
use crate::infrastructure::realtime;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    close_detail, get_chart, get_dashboard, health_check, list_nodes, open_detail, select_node,
    set_subscription, stream_events, submit_history,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_dashboard_config().context("Failed to load config/dashboard")?;
    let metrics = load_metrics_config().context("Failed to load config/metrics")?;
    metrics.validate()?;

    // Backend adapters (infrastructure layer)
    let timeout = Duration::from_secs(config.backend.request_timeout_secs);
    let gateway = Arc::new(HttpSensorGateway::new(
        &config.backend.base_url,
        config.endpoints.clone(),
        timeout,
    )?);
    let beacon = Arc::new(HttpBeacon::new(
        &config.backend.base_url,
        config.endpoints.clone(),
        timeout,
    )?);
    let feed = ChartFeed::new(metrics.layout.panels.clone(), config.live.feed_capacity);

    // Controller (application layer)
    let (tx, rx) = mpsc::channel(config.live.event_queue.max(1));
    let controller = DashboardController::new(
        metrics.descriptors(),
        config.live.window_size,
        Arc::new(feed.clone()),
        Ports {
            gateway,
            beacon: beacon.clone(),
            notifier: Arc::new(feed.clone()),
        },
        tx.clone(),
    );
    let handle = ControllerHandle::new(tx);
    let controller_task = tokio::spawn(controller.run(rx));

    // The dashboard stays usable without live data
    let channel = match realtime::connect(
        &config.backend.realtime_url,
        &config.backend.realtime_filter,
        handle.clone(),
    )
    .await
    {
        Ok(channel) => Some(channel),
        Err(e) => {
            tracing::error!("Realtime updates unavailable: {:#}", e);
            None
        }
    };

    let state = Arc::new(AppState {
        controller: handle.clone(),
        feed,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/dashboard", get(get_dashboard))
        .route("/charts/:metric", get(get_chart))
        .route("/metrics/:metric/subscription", put(set_subscription))
        .route("/metrics/:metric/detail", post(open_detail).delete(close_detail))
        .route("/metrics/:metric/history", post(submit_history))
        .route("/nodes", get(list_nodes))
        .route("/nodes/:id/select", post(select_node))
        .route("/events", get(stream_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind_addr))?;
    tracing::info!("Starting sensor-dashboard on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Teardown: unsubscribe what is still on, then give beacons a moment to leave
    let grace = Duration::from_millis(config.live.teardown_grace_ms);
    match handle.teardown().await {
        Ok(sent) => tracing::info!(sent, "Teardown beacons dispatched"),
        Err(e) => tracing::warn!("Teardown skipped: {}", e),
    }
    if let Some(channel) = channel {
        channel.close(grace).await;
    }
    beacon.flush(grace).await;
    if let Err(e) = controller_task.await {
        tracing::error!("Controller task failed: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown requested");
}
