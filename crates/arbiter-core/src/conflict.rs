//! Pairwise corridor conflict detection.
//!
//! Every pair of non-degenerate paths is intersected, so cost grows with the
//! square of the fleet size. Fleets are expected to be tens of agents.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::corridor::{Bounds, Corridor, CorridorBuilder};
use crate::error::Result;
use crate::models::Path;
use crate::rules::ArbiterRules;

/// Severity levels for detected overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    /// Overlap above the noise threshold
    Medium,
    /// Overlap above the severity threshold
    High,
}

/// Action advised to the agents involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictAction {
    AlertOnly,
    RecomputeRoute,
}

/// Overlap between two agents' corridors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictAlert {
    /// Lexicographically smaller agent id
    pub a: String,
    pub b: String,
    pub overlap_area_m2: f64,
    pub severity: ConflictSeverity,
    /// Extent of the shared region in projected meters
    pub bounds_utm: Bounds,
    pub recommendation: ConflictAction,
}

impl ConflictAlert {
    pub fn involves(&self, agent_id: &str) -> bool {
        self.a == agent_id || self.b == agent_id
    }
}

/// One published alert entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertEntry {
    RouteConflict(ConflictAlert),
    /// Stands in for the whole list when detection itself failed
    Error { message: String },
}

impl AlertEntry {
    pub fn as_conflict(&self) -> Option<&ConflictAlert> {
        match self {
            Self::RouteConflict(alert) => Some(alert),
            Self::Error { .. } => None,
        }
    }
}

/// Detect overlapping corridors across all agents.
///
/// Pairs below `area_threshold_m2` are dropped. The result is sorted by
/// overlap area, largest first.
pub fn detect_conflicts(
    paths: &HashMap<String, Path>,
    builder: &CorridorBuilder,
    rules: &ArbiterRules,
) -> Result<Vec<ConflictAlert>> {
    let mut ids: Vec<&String> = paths.keys().collect();
    ids.sort();

    let mut corridors: Vec<(&String, Corridor)> = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(corridor) = builder.build(&paths[id])? {
            corridors.push((id, corridor));
        }
    }

    let mut alerts = Vec::new();
    for (i, (a_id, a)) in corridors.iter().enumerate() {
        for (b_id, b) in &corridors[i + 1..] {
            let Some(overlap) = a.overlap(b) else {
                continue;
            };
            if overlap.area_m2 < rules.area_threshold_m2 {
                continue;
            }

            let (severity, recommendation) = rules.classify(overlap.area_m2);
            alerts.push(ConflictAlert {
                a: (*a_id).clone(),
                b: (*b_id).clone(),
                overlap_area_m2: overlap.area_m2,
                severity,
                bounds_utm: overlap.bounds,
                recommendation,
            });
        }
    }

    alerts.sort_by(|x, y| y.overlap_area_m2.total_cmp(&x.overlap_area_m2));
    Ok(alerts)
}
