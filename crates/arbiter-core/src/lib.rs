//! Arbiter Core - corridor geometry, conflict detection and candidate scoring.

pub mod conflict;
pub mod corridor;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod projection;
pub mod rules;
pub mod scoring;

pub use conflict::{detect_conflicts, AlertEntry, ConflictAction, ConflictAlert, ConflictSeverity};
pub use corridor::{Bounds, Corridor, CorridorBuilder, Overlap, MIN_SAMPLE_STEP_M};
pub use error::{ArbiterError, Result};
pub use fingerprint::PathFingerprint;
pub use models::{
    unix_timestamp, AgentRecommendation, GeoPoint, Path, Recommendation, RecommendationError,
};
pub use projection::{offset_geo, Hemisphere, PlanarPoint, UtmProjection, DEFAULT_UTM_ZONE};
pub use rules::ArbiterRules;
pub use scoring::{rank, score, score_candidates, Candidate, CandidateMetrics, ScoredCandidate};
