//! REST API routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use arbiter_core::AgentRecommendation;

use crate::api::{sse, ws};
use crate::loops::arbiter_loop::CycleReport;
use crate::state::AppState;

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/v1/alerts", get(list_alerts))
        .route("/v1/alerts/stream", get(sse::alerts_stream))
        .route("/v1/ws", get(ws::ws_handler))
        .route("/v1/recommendations", get(list_recommendations))
        .route("/v1/recommendations/list", get(recommendation_feed))
        .route("/v1/recommendations/:agent_id", get(get_recommendation))
        .route("/v1/status", get(get_status))
}

async fn list_alerts(State(state): State<Arc<AppState>>) -> Json<Value> {
    let alerts = state.alerts();
    Json(json!({
        "alerts": alerts.as_slice(),
        "count": alerts.len(),
    }))
}

async fn list_recommendations(State(state): State<Arc<AppState>>) -> Json<Value> {
    let recommendations = state.recommendations();
    Json(json!({
        "recommendations": recommendations.as_ref(),
        "count": recommendations.len(),
    }))
}

async fn recommendation_feed(State(state): State<Arc<AppState>>) -> Json<Value> {
    let items = state.recommendation_list();
    Json(json!({
        "count": items.len(),
        "items": items,
    }))
}

async fn get_recommendation(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<AgentRecommendation>, StatusCode> {
    state
        .recommendation(&agent_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    last_cycle: Option<CycleReport>,
    fingerprints: BTreeMap<String, String>,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        last_cycle: state.last_cycle(),
        fingerprints: state.fingerprints(),
    })
}
