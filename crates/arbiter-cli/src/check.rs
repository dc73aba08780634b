use anyhow::{Context, Result};
use arbiter_core::{
    detect_conflicts, score_candidates, ArbiterRules, Candidate, ConflictAlert, CorridorBuilder,
    Hemisphere, Path, ScoredCandidate, UtmProjection,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path as FsPath;

#[derive(Debug, Clone, Default)]
pub struct CheckSettings {
    pub projection: UtmProjection,
    pub rules: ArbiterRules,
}

impl CheckSettings {
    pub fn new(zone: u8, hemisphere: Hemisphere, rules: ArbiterRules) -> Result<Self> {
        let projection = UtmProjection::new(zone, hemisphere).context("Invalid UTM zone")?;
        Ok(Self { projection, rules })
    }

    fn builder(&self) -> Result<CorridorBuilder> {
        self.rules
            .corridor_builder(self.projection)
            .context("Invalid corridor settings")
    }
}

/// Planner responses and bare candidate arrays are both accepted.
#[derive(Deserialize)]
#[serde(untagged)]
enum CandidateFile {
    List(Vec<Candidate>),
    Response { candidates: Vec<Candidate> },
}

/// Fleet files map agent id to its path: `{"0xA": [{"lat": .., "lng": ..}, ..]}`.
pub fn parse_fleet(raw: &str) -> Result<HashMap<String, Path>> {
    serde_json::from_str(raw).context("Fleet file must map agent ids to point arrays")
}

pub fn load_fleet(file: &FsPath) -> Result<HashMap<String, Path>> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    parse_fleet(&raw).with_context(|| format!("Failed to parse {}", file.display()))
}

pub fn parse_candidates(raw: &str) -> Result<Vec<Candidate>> {
    let file: CandidateFile =
        serde_json::from_str(raw).context("Expected a candidate array or planner response")?;
    Ok(match file {
        CandidateFile::List(candidates) => candidates,
        CandidateFile::Response { candidates } => candidates,
    })
}

pub fn load_candidates(file: &FsPath) -> Result<Vec<Candidate>> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    parse_candidates(&raw).with_context(|| format!("Failed to parse {}", file.display()))
}

pub fn run_conflicts(
    fleet: &HashMap<String, Path>,
    settings: &CheckSettings,
) -> Result<Vec<ConflictAlert>> {
    let builder = settings.builder()?;
    detect_conflicts(fleet, &builder, &settings.rules).context("Conflict detection failed")
}

/// Rank `candidates` for `agent_id`, keeping the configured top entries.
pub fn run_score(
    agent_id: &str,
    fleet: &HashMap<String, Path>,
    candidates: &[Candidate],
    settings: &CheckSettings,
) -> Result<Vec<ScoredCandidate>> {
    let builder = settings.builder()?;
    let mut ranked = score_candidates(
        agent_id,
        candidates,
        fleet,
        &builder,
        settings.rules.length_weight,
    )
    .context("Candidate scoring failed")?;
    ranked.truncate(settings.rules.ranking_size);
    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two crossing paths near Tel Aviv, roughly 300 m long each
    const FLEET: &str = r#"{
        "0xA": [{"lat": 32.0853, "lng": 34.7802}, {"lat": 32.0853, "lng": 34.7834}],
        "0xB": [{"lat": 32.0840, "lng": 34.7818}, {"lat": 32.0866, "lng": 34.7818}],
        "0xC": []
    }"#;

    #[test]
    fn crossing_fleet_reports_one_alert() {
        let fleet = parse_fleet(FLEET).unwrap();
        let alerts = run_conflicts(&fleet, &CheckSettings::default()).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].a, "0xA");
        assert_eq!(alerts[0].b, "0xB");
        assert!(alerts[0].overlap_area_m2 > 800.0);
    }

    #[test]
    fn higher_threshold_silences_alert() {
        let fleet = parse_fleet(FLEET).unwrap();
        let settings = CheckSettings {
            rules: ArbiterRules {
                area_threshold_m2: 5000.0,
                ..ArbiterRules::default()
            },
            ..CheckSettings::default()
        };
        assert!(run_conflicts(&fleet, &settings).unwrap().is_empty());
    }

    #[test]
    fn scores_planner_response_file() {
        let fleet = parse_fleet(FLEET).unwrap();
        let candidates = parse_candidates(
            r#"{"candidates": [
                {"algorithm": "dijkstra",
                 "path": [{"lat": 32.0853, "lng": 34.7802}, {"lat": 32.0853, "lng": 34.7834}],
                 "metrics": {"length_m": 302.0}},
                {"algorithm": "astar",
                 "path": [{"lat": 32.0853, "lng": 34.7802}, {"lat": 32.0900, "lng": 34.7802},
                          {"lat": 32.0900, "lng": 34.7834}, {"lat": 32.0853, "lng": 34.7834}],
                 "metrics": {"length_m": 1344.0}}
            ]}"#,
        )
        .unwrap();

        let ranked = run_score("0xA", &fleet, &candidates, &CheckSettings::default()).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].algorithm, "astar");
        assert_eq!(ranked[0].conflict_area_m2, 0.0);
    }

    #[test]
    fn bare_candidate_array_is_accepted() {
        assert!(parse_candidates("[]").unwrap().is_empty());
        assert!(parse_candidates(r#"{"items": []}"#).is_err());
    }

    #[test]
    fn malformed_fleet_is_an_error() {
        assert!(parse_fleet(r#"{"0xA": "not a path"}"#).is_err());
    }
}
