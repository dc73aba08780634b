//! End-to-end arbitration loop tests.
//!
//! Runs the loop against an in-memory path source and a local planner
//! service, then reads the results back through the query surface.

use axum::{body::Body, http::Request, routing::post, Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tower::ServiceExt;

use arbiter_core::{offset_geo, AgentRecommendation, GeoPoint, Path, Recommendation};
use arbiter_planner::{CandidateRequest, PlannerClient, PlannerTimeouts, StaticPathSource};
use arbiter_server::api;
use arbiter_server::config::Config;
use arbiter_server::loops::arbiter_loop::{run_arbiter_loop, ArbiterDeps};
use arbiter_server::state::AppState;

const ORIGIN: GeoPoint = GeoPoint {
    lat: 32.0853,
    lng: 34.7818,
};

fn metric_path(points: &[(f64, f64)]) -> Path {
    points
        .iter()
        .map(|&(east, north)| offset_geo(&ORIGIN, east, north))
        .collect()
}

/// Planner that offers the straight route and a wide northern detour.
async fn spawn_planner(pushed: Arc<Mutex<Vec<Recommendation>>>) -> String {
    let app = Router::new()
        .route(
            "/route/candidates",
            post(|Json(req): Json<CandidateRequest>| async move {
                let detour = metric_path(&[
                    (-150.0, 0.0),
                    (-150.0, 300.0),
                    (150.0, 300.0),
                    (150.0, 0.0),
                ]);
                Json(json!({
                    "candidates": [
                        {"algorithm": "dijkstra", "path": [req.start, req.end], "metrics": {"length_m": 300.0}},
                        {"algorithm": "combined", "path": detour, "metrics": {"length_m": 900.0}}
                    ]
                }))
            }),
        )
        .route(
            "/agent/recommendation",
            post(move |Json(rec): Json<Recommendation>| {
                let pushed = pushed.clone();
                async move {
                    pushed.lock().unwrap().push(rec);
                    Json(json!({"ok": true}))
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn wait_for<F: Fn() -> bool>(check: F) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn loop_replans_changed_agent_and_shuts_down() {
    let pushed = Arc::new(Mutex::new(Vec::new()));
    let planner_url = spawn_planner(pushed.clone()).await;

    let paths = Arc::new(StaticPathSource::new());
    paths
        .set("0xA", metric_path(&[(-150.0, 0.0), (150.0, 0.0)]))
        .await;
    paths
        .set("0xB", metric_path(&[(0.0, -150.0), (0.0, 150.0)]))
        .await;

    let mut config = Config::default();
    config.poll_interval = Duration::from_millis(50);
    config.agents = vec!["0xA".to_string(), "0xB".to_string()];
    config.agent_servers = [("0xA".to_string(), planner_url)].into_iter().collect();

    let planner = PlannerClient::new(PlannerTimeouts::default()).unwrap();
    let deps = Arc::new(ArbiterDeps::new(config, paths.clone(), Arc::new(planner)).unwrap());
    let state = Arc::new(AppState::new());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let handle = tokio::spawn(run_arbiter_loop(
        state.clone(),
        deps,
        shutdown_tx.subscribe(),
    ));

    wait_for(|| state.recommendation("0xA").is_some() && state.recommendation("0xB").is_some())
        .await;

    let Some(AgentRecommendation::Recommendation(rec)) = state.recommendation("0xA") else {
        panic!("0xA should have a recommendation");
    };
    assert_eq!(rec.best.as_ref().unwrap().algorithm, "combined");
    assert!(state.recommendation("0xB").unwrap().is_error());
    wait_for(|| pushed.lock().unwrap().len() == 1).await;

    let app = api::routes().with_state(state.clone());
    let res = app
        .oneshot(Request::builder().uri("/v1/alerts").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["count"], 1);
    assert_eq!(body["alerts"][0]["severity"], "high");

    // Later cycles see unchanged paths and must not push again
    let cycle = state.last_cycle().map(|c| c.cycle).unwrap_or(0);
    wait_for(|| state.last_cycle().map(|c| c.cycle).unwrap_or(0) >= cycle + 2).await;
    assert_eq!(pushed.lock().unwrap().len(), 1);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops after shutdown")
        .unwrap();
}
