//! WebSocket streaming for real-time alert updates.
use crate::state::AppState;
use arbiter_core::AlertEntry;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Handler for WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsQuery>,
) -> axum::response::Response {
    let agent_filter = params.agent_id;
    ws.on_upgrade(move |socket| handle_socket(socket, state, agent_filter))
        .into_response()
}

#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    agent_id: Option<String>,
}

/// Alerts visible to a subscriber. Error entries always pass the filter.
pub fn filter_alerts(alerts: &[AlertEntry], agent_id: Option<&str>) -> Vec<AlertEntry> {
    alerts
        .iter()
        .filter(|entry| match (agent_id, entry.as_conflict()) {
            (Some(agent_id), Some(alert)) => alert.involves(agent_id),
            _ => true,
        })
        .cloned()
        .collect()
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, agent_filter: Option<String>) {
    let mut rx = state.subscribe_alerts();
    let closing = state.shutdown_requested();
    tokio::pin!(closing);

    loop {
        tokio::select! {
            _ = &mut closing => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(alerts) => {
                        let visible = filter_alerts(&alerts, agent_filter.as_deref());
                        let payload = json!({
                            "alerts": visible,
                            "count": visible.len(),
                        });
                        if socket.send(Message::Text(payload.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        // Drop missed snapshots; the next one supersedes them.
                        continue;
                    }
                    Err(_) => break,
                }
            }
        }
    }
}
