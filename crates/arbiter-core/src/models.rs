//! Core data models for route arbitration.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::scoring::ScoredCandidate;

/// A geographic point in decimal degrees.
///
/// Field names match the path records agents commit (`lat`/`lng`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Ordered sequence of points an agent has committed to.
///
/// Paths with fewer than two points are degenerate and never enter geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<GeoPoint>);

impl Path {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self(points)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_degenerate(&self) -> bool {
        self.0.len() < 2
    }

    pub fn start(&self) -> Option<&GeoPoint> {
        self.0.first()
    }

    pub fn end(&self) -> Option<&GeoPoint> {
        self.0.last()
    }
}

impl From<Vec<GeoPoint>> for Path {
    fn from(points: Vec<GeoPoint>) -> Self {
        Self(points)
    }
}

impl FromIterator<GeoPoint> for Path {
    fn from_iter<I: IntoIterator<Item = GeoPoint>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The chosen candidate and ranking for one agent.
///
/// This is also the body pushed back to the agent's planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub car: String,
    pub start: GeoPoint,
    pub end: GeoPoint,
    /// `None` when no candidate survived scoring
    pub best: Option<ScoredCandidate>,
    /// Top-K candidates, ascending by score
    pub ranking: Vec<ScoredCandidate>,
    pub server_url: String,
    /// Unix seconds
    pub timestamp: f64,
}

impl Recommendation {
    /// Build a recommendation from a ranking already sorted best-first.
    pub fn from_ranking(
        car: impl Into<String>,
        start: GeoPoint,
        end: GeoPoint,
        mut ranked: Vec<ScoredCandidate>,
        top_k: usize,
        server_url: impl Into<String>,
    ) -> Self {
        ranked.truncate(top_k);
        Self {
            car: car.into(),
            start,
            end,
            best: ranked.first().cloned(),
            ranking: ranked,
            server_url: server_url.into(),
            timestamp: unix_timestamp(),
        }
    }
}

/// A replan that could not produce a ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationError {
    pub car: String,
    pub message: String,
    pub timestamp: f64,
}

impl RecommendationError {
    pub fn new(car: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            car: car.into(),
            message: message.into(),
            timestamp: unix_timestamp(),
        }
    }
}

/// Latest replan outcome stored per agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentRecommendation {
    Recommendation(Recommendation),
    Error(RecommendationError),
}

impl AgentRecommendation {
    pub fn agent_id(&self) -> &str {
        match self {
            Self::Recommendation(rec) => &rec.car,
            Self::Error(err) => &err.car,
        }
    }

    pub fn timestamp(&self) -> f64 {
        match self {
            Self::Recommendation(rec) => rec.timestamp,
            Self::Error(err) => err.timestamp,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Current time as fractional Unix seconds.
pub fn unix_timestamp() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}
