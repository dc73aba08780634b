//! Server-sent alert stream.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

/// One `data:` event per published alert list. The stream ends when the
/// server begins shutting down.
pub async fn alerts_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.subscribe_alerts();
    let closing = state.shutdown_requested();

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(alerts) => {
                    let event = Event::default().json_data(alerts.as_slice());
                    return Some((event, rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Alert stream subscriber skipped {} snapshot(s)", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .take_until(closing);

    Sse::new(events).keep_alive(KeepAlive::default())
}
