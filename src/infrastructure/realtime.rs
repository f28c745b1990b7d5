// Realtime push channel over WebSocket
use crate::application::view_controller::ControllerHandle;
use crate::domain::error::DashboardError;
use crate::domain::push::{PushEvent, LIVE_UPDATE, SENSOR_UPDATE};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

enum Command {
    Unsubscribe,
}

/// Running push channel. Drop it or call [`RealtimeHandle::close`] to stop.
pub struct RealtimeHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl RealtimeHandle {
    /// Send `unsubscribe`, close the socket, and wait up to `grace` for it to finish
    pub async fn close(self, grace: Duration) {
        let _ = self.commands.send(Command::Unsubscribe).await;
        if tokio::time::timeout(grace, self.task).await.is_err() {
            tracing::warn!("Realtime channel did not close in time");
        }
    }
}

fn control(event: &str, sensors: &[String]) -> String {
    let data = if sensors.is_empty() {
        json!({})
    } else {
        json!({ "sensors": sensors })
    };
    json!({ "event": event, "data": data }).to_string()
}

/// Decode one text frame. Accepts `{"event": .., "data": ..}` and the
/// array form `["event", data]`. Events other than pushes yield `None`.
pub fn decode_frame(text: &str, received_at: DateTime<Utc>) -> Result<Option<PushEvent>, DashboardError> {
    let frame: Value =
        serde_json::from_str(text).map_err(|e| DashboardError::MalformedPush(e.to_string()))?;

    let (event, data) = match &frame {
        Value::Object(fields) => (
            fields.get("event").and_then(Value::as_str),
            fields.get("data").unwrap_or(&Value::Null),
        ),
        Value::Array(parts) => (
            parts.first().and_then(Value::as_str),
            parts.get(1).unwrap_or(&Value::Null),
        ),
        _ => (None, &Value::Null),
    };

    match event {
        Some(name @ (SENSOR_UPDATE | LIVE_UPDATE)) => PushEvent::decode(name, data, received_at).map(Some),
        Some(other) => {
            tracing::debug!(event = other, "Ignoring realtime event");
            Ok(None)
        }
        None => Err(DashboardError::MalformedPush("frame has no event name".to_string())),
    }
}

/// Connect, subscribe, and forward every push event to the controller in arrival order.
/// The channel is not reconnected if the server goes away.
pub async fn connect(url: &str, sensors: &[String], controller: ControllerHandle) -> Result<RealtimeHandle> {
    let (stream, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to realtime channel {}", url))?;
    tracing::info!(url, "Realtime channel connected");

    let (mut write, mut read) = stream.split();
    write
        .send(Message::Text(control("subscribe", sensors)))
        .await
        .context("Failed to send subscribe event")?;

    let sensors = sensors.to_vec();
    let (commands, mut pending) = mpsc::channel(4);
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => match decode_frame(&text, Utc::now()) {
                        Ok(Some(event)) => {
                            if controller.push(event).await.is_err() {
                                tracing::info!("Controller stopped; leaving realtime channel");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!("Dropping realtime frame: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::warn!("Realtime channel closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("Realtime channel failed: {}", e);
                        break;
                    }
                },
                command = pending.recv() => {
                    if let Some(Command::Unsubscribe) = command {
                        if let Err(e) = write.send(Message::Text(control("unsubscribe", &sensors))).await {
                            tracing::debug!("Unsubscribe event not sent: {}", e);
                        }
                    }
                    let _ = write.close().await;
                    break;
                }
            }
        }
    });

    Ok(RealtimeHandle { commands, task })
}
