//! Sources of each agent's committed path.

use anyhow::{Context, Result};
use arbiter_core::Path;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::PathSource;

/// Reads paths from a registry exposing `GET {base}/routes/{agent}`.
#[derive(Debug, Clone)]
pub struct HttpPathSource {
    client: Client,
    base: Url,
    timeout: Duration,
}

impl HttpPathSource {
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.as_ref();
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid path source URL '{}'", base_url))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("Path source URL '{}' cannot take a path", base_url);
        }
        let client = Client::builder()
            .build()
            .context("Failed to create path source HTTP client")?;
        Ok(Self {
            client,
            base,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// `{base}/routes/{agent}` with the agent id as one escaped segment.
    pub fn route_url(&self, agent_id: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("routes").push(agent_id);
        }
        url
    }
}

/// Decode a registry payload.
///
/// Agents may store the path either as a JSON array or as a string holding
/// that array. `null` and blank strings mean no path.
pub fn decode_path(value: Value) -> Result<Path> {
    match value {
        Value::Null => Ok(Path::empty()),
        Value::String(raw) => {
            let raw = raw.trim();
            if raw.is_empty() || raw == "null" {
                return Ok(Path::empty());
            }
            serde_json::from_str(raw).context("Path string is not a JSON point array")
        }
        other => serde_json::from_value(other).context("Path payload is not a point array"),
    }
}

#[async_trait]
impl PathSource for HttpPathSource {
    async fn current_path(&self, agent_id: &str) -> Result<Path> {
        let response = self
            .client
            .get(self.route_url(agent_id))
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to fetch path for {}", agent_id))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Path request for {} failed: {} {}",
                agent_id,
                status,
                body
            ));
        }

        let value = response
            .json::<Value>()
            .await
            .with_context(|| format!("Failed to read path body for {}", agent_id))?;
        decode_path(value)
    }
}

#[derive(Debug, Clone)]
enum StaticEntry {
    Path(Path),
    Failure(String),
}

/// In-memory path source. Unknown agents have an empty path.
#[derive(Debug, Default)]
pub struct StaticPathSource {
    entries: RwLock<HashMap<String, StaticEntry>>,
}

impl StaticPathSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_paths(paths: HashMap<String, Path>) -> Self {
        let entries = paths
            .into_iter()
            .map(|(id, path)| (id, StaticEntry::Path(path)))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub async fn set(&self, agent_id: impl Into<String>, path: Path) {
        self.entries
            .write()
            .await
            .insert(agent_id.into(), StaticEntry::Path(path));
    }

    /// Make every read for `agent_id` fail with `message`.
    pub async fn fail(&self, agent_id: impl Into<String>, message: impl Into<String>) {
        self.entries
            .write()
            .await
            .insert(agent_id.into(), StaticEntry::Failure(message.into()));
    }

    pub async fn remove(&self, agent_id: &str) {
        self.entries.write().await.remove(agent_id);
    }
}

#[async_trait]
impl PathSource for StaticPathSource {
    async fn current_path(&self, agent_id: &str) -> Result<Path> {
        match self.entries.read().await.get(agent_id) {
            Some(StaticEntry::Path(path)) => Ok(path.clone()),
            Some(StaticEntry::Failure(message)) => Err(anyhow::anyhow!("{}", message)),
            None => Ok(Path::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::GeoPoint;
    use axum::{extract::Path as UrlPath, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
    use serde_json::json;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn decodes_array_string_and_null() {
        let array = decode_path(json!([{"lat": 32.0, "lng": 34.7}, {"lat": 32.1, "lng": 34.8}]))
            .unwrap();
        assert_eq!(array.len(), 2);

        let encoded =
            decode_path(json!(r#"[{"lat": 32.0, "lng": 34.7}, {"lat": 32.1, "lng": 34.8}]"#))
                .unwrap();
        assert_eq!(encoded, array);

        assert!(decode_path(Value::Null).unwrap().is_empty());
        assert!(decode_path(json!("  ")).unwrap().is_empty());
        assert!(decode_path(json!({"lat": 1.0})).is_err());
        assert!(decode_path(json!("not json")).is_err());
    }

    #[tokio::test]
    async fn http_source_reads_registry() {
        let app = Router::new().route(
            "/routes/:agent",
            get(|UrlPath(agent): UrlPath<String>| async move {
                match agent.as_str() {
                    "0xA" => Json(json!([{"lat": 32.0, "lng": 34.7}, {"lat": 32.1, "lng": 34.8}]))
                        .into_response(),
                    "0xB" => Json(json!(r#"[{"lat": 32.0, "lng": 34.7}]"#)).into_response(),
                    "0xC" => Json(Value::Null).into_response(),
                    "fleet/7?x#y" => Json(json!([
                        {"lat": 32.0, "lng": 34.7},
                        {"lat": 32.1, "lng": 34.8},
                        {"lat": 32.2, "lng": 34.9}
                    ]))
                    .into_response(),
                    _ => (StatusCode::BAD_GATEWAY, "rpc down").into_response(),
                }
            }),
        );
        let base = spawn(app).await;
        let source = HttpPathSource::new(format!("{}/", base), Duration::from_secs(5)).unwrap();
        assert_eq!(source.base_url(), base);

        assert_eq!(source.current_path("0xA").await.unwrap().len(), 2);
        assert_eq!(source.current_path("0xB").await.unwrap().len(), 1);
        assert!(source.current_path("0xC").await.unwrap().is_empty());

        let err = source.current_path("0xD").await.unwrap_err();
        assert!(err.to_string().contains("502"));

        assert_eq!(source.current_path("fleet/7?x#y").await.unwrap().len(), 3);
    }

    #[test]
    fn agent_id_is_one_escaped_segment() {
        let source =
            HttpPathSource::new("http://registry:8080/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(source.base_url(), "http://registry:8080/api");
        assert_eq!(
            source.route_url("fleet/7?x#y").as_str(),
            "http://registry:8080/api/routes/fleet%2F7%3Fx%23y"
        );
        assert_eq!(
            source.route_url("0xA").as_str(),
            "http://registry:8080/api/routes/0xA"
        );

        assert!(HttpPathSource::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn static_source_serves_updates_and_failures() {
        let source = StaticPathSource::new();
        assert!(source.current_path("car-1").await.unwrap().is_empty());

        let path = Path::new(vec![GeoPoint::new(32.0, 34.7), GeoPoint::new(32.1, 34.8)]);
        source.set("car-1", path.clone()).await;
        assert_eq!(source.current_path("car-1").await.unwrap(), path);

        source.fail("car-1", "registry unavailable").await;
        let err = source.current_path("car-1").await.unwrap_err();
        assert_eq!(err.to_string(), "registry unavailable");

        source.remove("car-1").await;
        assert!(source.current_path("car-1").await.unwrap().is_empty());
    }
}
