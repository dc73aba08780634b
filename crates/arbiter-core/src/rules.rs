//! Arbitration policy thresholds.

use serde::{Deserialize, Serialize};

use crate::conflict::{ConflictAction, ConflictSeverity};
use crate::corridor::{CorridorBuilder, DEFAULT_SAMPLE_STEP_M};
use crate::error::Result;
use crate::projection::UtmProjection;

/// Tunable policy for conflict detection and candidate ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterRules {
    /// Corridor half-width around each path (meters)
    pub safety_radius_m: f64,
    /// Overlaps smaller than this are treated as tangent noise (m²)
    pub area_threshold_m2: f64,
    /// Overlaps larger than this are high severity (m²)
    pub severity_threshold_m2: f64,
    /// Score penalty per meter of candidate length
    pub length_weight: f64,
    /// Number of ranked candidates kept in a recommendation
    pub ranking_size: usize,
    /// Scanline spacing for area integration (meters)
    pub sample_step_m: f64,
}

impl Default for ArbiterRules {
    fn default() -> Self {
        Self {
            safety_radius_m: 15.0,
            area_threshold_m2: 5.0,
            severity_threshold_m2: 50.0,
            length_weight: 0.001,
            ranking_size: 5,
            sample_step_m: DEFAULT_SAMPLE_STEP_M,
        }
    }
}

impl ArbiterRules {
    pub fn corridor_builder(&self, projection: UtmProjection) -> Result<CorridorBuilder> {
        CorridorBuilder::new(projection, self.safety_radius_m, self.sample_step_m)
    }

    pub fn classify(&self, overlap_area_m2: f64) -> (ConflictSeverity, ConflictAction) {
        if overlap_area_m2 > self.severity_threshold_m2 {
            (ConflictSeverity::High, ConflictAction::RecomputeRoute)
        } else {
            (ConflictSeverity::Medium, ConflictAction::AlertOnly)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_boundary_is_exclusive() {
        let rules = ArbiterRules::default();
        assert_eq!(
            rules.classify(50.0),
            (ConflictSeverity::Medium, ConflictAction::AlertOnly)
        );
        assert_eq!(
            rules.classify(50.01),
            (ConflictSeverity::High, ConflictAction::RecomputeRoute)
        );
    }

    #[test]
    fn invalid_radius_surfaces_from_builder() {
        let rules = ArbiterRules {
            safety_radius_m: 0.0,
            ..ArbiterRules::default()
        };
        assert!(rules.corridor_builder(UtmProjection::default()).is_err());
    }
}
