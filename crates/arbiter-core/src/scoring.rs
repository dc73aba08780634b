//! Ranking of planner-supplied alternative paths.
//!
//! A candidate's score is its total corridor overlap with every other agent
//! plus a small per-meter length penalty, so conflict avoidance dominates and
//! length only breaks near-ties.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::corridor::{Corridor, CorridorBuilder};
use crate::error::Result;
use crate::models::Path;

/// Metrics reported by the planner alongside a candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetrics {
    #[serde(default)]
    pub length_m: Option<f64>,
}

/// Alternative path proposed by a planner for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub algorithm: String,
    #[serde(default)]
    pub path: Path,
    #[serde(default)]
    pub metrics: CandidateMetrics,
}

impl Candidate {
    pub fn new(algorithm: impl Into<String>, path: Path, length_m: Option<f64>) -> Self {
        Self {
            algorithm: algorithm.into(),
            path,
            metrics: CandidateMetrics { length_m },
        }
    }

    /// Planner-reported length, if present and sane.
    pub fn reported_length_m(&self) -> Option<f64> {
        self.metrics
            .length_m
            .filter(|len| len.is_finite() && *len >= 0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub algorithm: String,
    pub score: f64,
    pub conflict_area_m2: f64,
    pub length_m: f64,
}

impl ScoredCandidate {
    pub fn new(
        algorithm: impl Into<String>,
        conflict_area_m2: f64,
        length_m: f64,
        length_weight: f64,
    ) -> Self {
        Self {
            algorithm: algorithm.into(),
            score: score(conflict_area_m2, length_m, length_weight),
            conflict_area_m2,
            length_m,
        }
    }
}

/// Scalar objective: lower is better.
pub fn score(conflict_area_m2: f64, length_m: f64, length_weight: f64) -> f64 {
    conflict_area_m2 + length_weight * length_m
}

/// Sort best-first. Equal scores keep their input order.
pub fn rank(scored: &mut [ScoredCandidate]) {
    scored.sort_by(|a, b| a.score.total_cmp(&b.score));
}

/// Score `candidates` for `agent_id` against everyone else's current path.
///
/// Overlaps are summed without the alert threshold so small conflicts still
/// separate candidates. Degenerate candidates and candidates with invalid
/// coordinates are left out; an empty result means no viable alternative.
pub fn score_candidates(
    agent_id: &str,
    candidates: &[Candidate],
    other_paths: &HashMap<String, Path>,
    builder: &CorridorBuilder,
    length_weight: f64,
) -> Result<Vec<ScoredCandidate>> {
    let mut others: Vec<Corridor> = Vec::with_capacity(other_paths.len());
    for (other_id, path) in other_paths {
        if other_id == agent_id {
            continue;
        }
        if let Some(corridor) = builder.build(path)? {
            others.push(corridor);
        }
    }

    let mut scored = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let corridor = match builder.build(&candidate.path) {
            Ok(Some(corridor)) => corridor,
            Ok(None) => {
                tracing::debug!(
                    "Skipping degenerate candidate '{}' for {}",
                    candidate.algorithm,
                    agent_id
                );
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    "Skipping candidate '{}' for {}: {}",
                    candidate.algorithm,
                    agent_id,
                    e
                );
                continue;
            }
        };

        let conflict_area_m2: f64 = others
            .iter()
            .filter_map(|other| corridor.overlap(other))
            .map(|overlap| overlap.area_m2)
            .sum();
        let length_m = candidate
            .reported_length_m()
            .unwrap_or_else(|| corridor.length_m());

        scored.push(ScoredCandidate::new(
            candidate.algorithm.clone(),
            conflict_area_m2,
            length_m,
            length_weight,
        ));
    }

    rank(&mut scored);
    Ok(scored)
}
