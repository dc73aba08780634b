//! Route planner HTTP client.

use anyhow::{Context, Result};
use arbiter_core::{Candidate, GeoPoint, Recommendation};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Planner;

/// Body of `POST {server}/route/candidates`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRequest {
    pub start: GeoPoint,
    pub end: GeoPoint,
    #[serde(rename = "dangerZones", default)]
    pub danger_zones: Vec<serde_json::Value>,
    pub random_runs: u32,
    pub algorithms: Vec<String>,
    #[serde(default)]
    pub include_on_road: bool,
    pub use_crop: bool,
}

impl CandidateRequest {
    pub fn new(
        start: GeoPoint,
        end: GeoPoint,
        algorithms: Vec<String>,
        random_runs: u32,
        use_crop: bool,
    ) -> Self {
        Self {
            start,
            end,
            danger_zones: Vec::new(),
            random_runs,
            algorithms,
            include_on_road: false,
            use_crop,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Copy)]
pub struct PlannerTimeouts {
    /// Candidate generation runs several search algorithms server-side
    pub candidates: Duration,
    pub recommendation: Duration,
}

impl Default for PlannerTimeouts {
    fn default() -> Self {
        Self {
            candidates: Duration::from_secs(20),
            recommendation: Duration::from_secs(5),
        }
    }
}

/// HTTP client shared across every agent's planner endpoint.
#[derive(Debug, Clone)]
pub struct PlannerClient {
    client: Client,
    timeouts: PlannerTimeouts,
}

impl PlannerClient {
    pub fn new(timeouts: PlannerTimeouts) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create planner HTTP client")?;
        Ok(Self { client, timeouts })
    }

    pub fn timeouts(&self) -> PlannerTimeouts {
        self.timeouts
    }
}

fn endpoint(server_url: &str, path: &str) -> String {
    format!("{}{}", server_url.trim_end_matches('/'), path)
}

#[async_trait]
impl Planner for PlannerClient {
    async fn fetch_candidates(
        &self,
        server_url: &str,
        request: &CandidateRequest,
    ) -> Result<Vec<Candidate>> {
        let url = endpoint(server_url, "/route/candidates");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeouts.candidates)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to request candidates from {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Candidate request failed: {} {}",
                status,
                body
            ));
        }

        let payload = response
            .json::<CandidateResponse>()
            .await
            .context("Failed to parse candidate response")?;

        tracing::debug!("{} returned {} candidate(s)", url, payload.candidates.len());
        Ok(payload.candidates)
    }

    async fn push_recommendation(
        &self,
        server_url: &str,
        recommendation: &Recommendation,
    ) -> Result<()> {
        let url = endpoint(server_url, "/agent/recommendation");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeouts.recommendation)
            .json(recommendation)
            .send()
            .await
            .with_context(|| format!("Failed to push recommendation to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Recommendation push failed: {} {}",
                status,
                body
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request() -> CandidateRequest {
        CandidateRequest::new(
            GeoPoint::new(32.08, 34.78),
            GeoPoint::new(32.09, 34.79),
            vec!["dijkstra".into(), "astar".into()],
            3,
            true,
        )
    }

    #[test]
    fn request_uses_planner_field_names() {
        let value = serde_json::to_value(request()).unwrap();
        assert_eq!(value["dangerZones"], json!([]));
        assert_eq!(value["random_runs"], 3);
        assert_eq!(value["include_on_road"], false);
        assert_eq!(value["use_crop"], true);
        assert_eq!(value["start"]["lng"], 34.78);
    }

    #[tokio::test]
    async fn fetches_candidates() {
        let app = Router::new().route(
            "/route/candidates",
            post(|Json(req): Json<CandidateRequest>| async move {
                Json(json!({
                    "candidates": [{
                        "algorithm": req.algorithms[0],
                        "path": [req.start, req.end],
                        "metrics": {"length_m": 1400.0}
                    }]
                }))
            }),
        );
        let base = spawn(app).await;
        let client = PlannerClient::new(PlannerTimeouts::default()).unwrap();

        let candidates = client.fetch_candidates(&base, &request()).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].algorithm, "dijkstra");
        assert_eq!(candidates[0].reported_length_m(), Some(1400.0));
    }

    #[tokio::test]
    async fn planner_error_status_is_an_error() {
        let app = Router::new().route(
            "/route/candidates",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "no graph loaded") }),
        );
        let base = spawn(app).await;
        let client = PlannerClient::new(PlannerTimeouts::default()).unwrap();

        let err = client.fetch_candidates(&base, &request()).await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn slow_planner_times_out() {
        let app = Router::new().route(
            "/route/candidates",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(json!({"candidates": []}))
            }),
        );
        let base = spawn(app).await;
        let client = PlannerClient::new(PlannerTimeouts {
            candidates: Duration::from_millis(100),
            recommendation: Duration::from_millis(100),
        })
        .unwrap();

        assert!(client.fetch_candidates(&base, &request()).await.is_err());
    }

    #[tokio::test]
    async fn pushes_recommendation() {
        let seen: Arc<Mutex<Vec<Recommendation>>> = Arc::default();
        let sink = seen.clone();
        let app = Router::new().route(
            "/agent/recommendation",
            post(move |Json(rec): Json<Recommendation>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(rec);
                    StatusCode::OK
                }
            }),
        );
        let base = spawn(app).await;
        let client = PlannerClient::new(PlannerTimeouts::default()).unwrap();

        let rec = Recommendation::from_ranking(
            "0xA",
            GeoPoint::new(32.08, 34.78),
            GeoPoint::new(32.09, 34.79),
            Vec::new(),
            5,
            base.clone(),
        );
        client
            .push_recommendation(&format!("{}/", base), &rec)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].car, "0xA");
        assert!(seen[0].best.is_none());
    }
}
