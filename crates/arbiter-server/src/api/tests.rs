use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use chrono::Utc;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use arbiter_core::{
    AgentRecommendation, AlertEntry, Bounds, ConflictAction, ConflictAlert, ConflictSeverity,
    GeoPoint, Path, PathFingerprint, Recommendation, RecommendationError,
};

use crate::{api, loops::arbiter_loop::CycleReport, state::AppState};

fn setup_app() -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new());
    let app = api::routes().with_state(state.clone());
    (app, state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

fn conflict(a: &str, b: &str, area: f64) -> AlertEntry {
    AlertEntry::RouteConflict(ConflictAlert {
        a: a.to_string(),
        b: b.to_string(),
        overlap_area_m2: area,
        severity: ConflictSeverity::High,
        bounds_utm: Bounds {
            minx: 670_000.0,
            miny: 3_550_000.0,
            maxx: 670_030.0,
            maxy: 3_550_030.0,
        },
        recommendation: ConflictAction::RecomputeRoute,
    })
}

fn recommendation(car: &str, timestamp: f64) -> AgentRecommendation {
    let mut rec = Recommendation::from_ranking(
        car,
        GeoPoint::new(32.0853, 34.7818),
        GeoPoint::new(32.0900, 34.7900),
        Vec::new(),
        5,
        "http://planner",
    );
    rec.timestamp = timestamp;
    AgentRecommendation::Recommendation(rec)
}

#[tokio::test]
async fn health_check() {
    let (app, _state) = setup_app();
    let res = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn alerts_serve_latest_snapshot() {
    let (app, state) = setup_app();

    let body = read_json(app.clone().oneshot(get("/v1/alerts")).await.unwrap()).await;
    assert_eq!(body["count"], 0);
    assert_eq!(body["alerts"], Value::Array(Vec::new()));

    state.publish_alerts(vec![conflict("0xA", "0xB", 812.5)]);
    let body = read_json(app.oneshot(get("/v1/alerts")).await.unwrap()).await;
    assert_eq!(body["count"], 1);
    let alert = &body["alerts"][0];
    assert_eq!(alert["type"], "ROUTE_CONFLICT");
    assert_eq!(alert["a"], "0xA");
    assert_eq!(alert["severity"], "high");
    assert_eq!(alert["recommendation"], "RECOMPUTE_ROUTE");
    assert_eq!(alert["bounds_utm"]["maxx"], 670_030.0);
}

#[tokio::test]
async fn recommendations_by_agent_and_newest_first() {
    let (app, state) = setup_app();
    state.publish_recommendation(recommendation("0xA", 100.0));
    state.publish_recommendation(recommendation("0xB", 300.0));
    let mut failed = RecommendationError::new("0xC", "No server mapping for car");
    failed.timestamp = 200.0;
    state.publish_recommendation(AgentRecommendation::Error(failed));

    let body = read_json(app.clone().oneshot(get("/v1/recommendations")).await.unwrap()).await;
    assert_eq!(body["count"], 3);
    assert_eq!(body["recommendations"]["0xA"]["type"], "RECOMMENDATION");
    assert_eq!(body["recommendations"]["0xC"]["type"], "ERROR");

    let body = read_json(
        app.clone()
            .oneshot(get("/v1/recommendations/list"))
            .await
            .unwrap(),
    )
    .await;
    let cars: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["car"].as_str().unwrap())
        .collect();
    assert_eq!(cars, vec!["0xB", "0xC", "0xA"]);

    let res = app.clone().oneshot(get("/v1/recommendations/0xA")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["server_url"], "http://planner");
    assert!(body["best"].is_null());

    let res = app.oneshot(get("/v1/recommendations/0xZ")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_reports_cycle_and_fingerprints() {
    let (app, state) = setup_app();

    let body = read_json(app.clone().oneshot(get("/v1/status")).await.unwrap()).await;
    assert!(body["last_cycle"].is_null());

    let path = Path::new(vec![GeoPoint::new(1.0, 2.0), GeoPoint::new(3.0, 4.0)]);
    state.update_fingerprint("0xA", PathFingerprint::of(&path));
    state.record_cycle(CycleReport {
        cycle: 7,
        agents: 2,
        degraded: 1,
        alerts: 0,
        replanned: 1,
        errors: 0,
        finished_at: Utc::now(),
    });

    let body = read_json(app.oneshot(get("/v1/status")).await.unwrap()).await;
    assert_eq!(body["last_cycle"]["cycle"], 7);
    assert_eq!(body["last_cycle"]["degraded"], 1);
    assert_eq!(body["fingerprints"]["0xA"], "2|1,2->3,4");
}

#[tokio::test]
async fn alert_stream_emits_published_snapshots() {
    let (app, state) = setup_app();

    let res = app.oneshot(get("/v1/alerts/stream")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()[CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    state.publish_alerts(vec![conflict("0xA", "0xB", 64.0)]);

    let mut body = res.into_body().into_data_stream();
    let frame = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .expect("event before timeout")
        .expect("stream open")
        .expect("frame");
    let text = String::from_utf8(frame.to_vec()).unwrap();
    let data = text
        .strip_prefix("data: ")
        .expect("data event")
        .trim_end();
    let alerts: Value = serde_json::from_str(data).unwrap();
    assert_eq!(alerts[0]["overlap_area_m2"], 64.0);
}
