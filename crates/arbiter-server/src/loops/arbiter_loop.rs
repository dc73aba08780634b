//! Continuous route arbitration loop.
//!
//! Each cycle reads every agent's committed path, publishes fleet-wide
//! conflict alerts, and asks the planner of every agent whose path changed
//! for alternatives to rank.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arbiter_core::{
    detect_conflicts, score_candidates, AgentRecommendation, AlertEntry, ArbiterError,
    ConflictSeverity, CorridorBuilder, GeoPoint, Path, PathFingerprint, Recommendation,
    RecommendationError, UtmProjection,
};
use arbiter_planner::{CandidateRequest, PathSource, Planner};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::config::Config;
use crate::state::AppState;

/// Why an agent's replan produced an error record instead of a ranking.
#[derive(Debug, Error)]
pub enum ReplanError {
    #[error("No server mapping for car")]
    NoServerMapping,
    #[error("Failed to fetch candidates: {0:#}")]
    FetchFailure(anyhow::Error),
    #[error("Failed to score candidates: {0}")]
    Scoring(#[from] ArbiterError),
    #[error("Candidate scoring aborted: {0}")]
    ScoringAborted(#[from] tokio::task::JoinError),
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub agents: usize,
    /// Agents whose path could not be read and counted as empty
    pub degraded: usize,
    pub alerts: usize,
    pub replanned: usize,
    pub errors: usize,
    pub finished_at: DateTime<Utc>,
}

/// Collaborators and settings the loop runs against.
pub struct ArbiterDeps {
    pub config: Config,
    pub builder: CorridorBuilder,
    pub paths: Arc<dyn PathSource>,
    pub planner: Arc<dyn Planner>,
}

impl ArbiterDeps {
    pub fn new(
        config: Config,
        paths: Arc<dyn PathSource>,
        planner: Arc<dyn Planner>,
    ) -> arbiter_core::Result<Self> {
        let projection = UtmProjection::new(config.utm_zone, config.hemisphere)?;
        let builder = config.rules.corridor_builder(projection)?;
        Ok(Self {
            config,
            builder,
            paths,
            planner,
        })
    }
}

/// Start the arbitration loop. Runs until `shutdown` fires.
pub async fn run_arbiter_loop(
    state: Arc<AppState>,
    deps: Arc<ArbiterDeps>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(deps.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycle: u64 = 0;

    if deps.config.agents.is_empty() {
        tracing::warn!("No agents configured; set CAR_ADDRS");
    }

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Arbiter loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                cycle += 1;
                let report = run_cycle(&state, &deps, cycle).await;
                if report.errors > 0 || report.degraded > 0 {
                    tracing::warn!(
                        "Cycle {}: {} alert(s), {} replanned, {} replan error(s), {} degraded path(s)",
                        report.cycle,
                        report.alerts,
                        report.replanned,
                        report.errors,
                        report.degraded
                    );
                } else {
                    tracing::debug!(
                        "Cycle {}: {} alert(s), {} replanned",
                        report.cycle,
                        report.alerts,
                        report.replanned
                    );
                }
                state.record_cycle(report);
            }
        }
    }
}

/// Run one fetch, detect, change-scan and replan pass.
pub async fn run_cycle(state: &AppState, deps: &ArbiterDeps, cycle: u64) -> CycleReport {
    let (paths, degraded) = fetch_paths(deps).await;
    let paths = Arc::new(paths);

    let alerts = detect(paths.clone(), deps).await;
    let alert_count = alerts.len();
    state.publish_alerts(alerts);

    let mut changed: Vec<(String, GeoPoint, GeoPoint)> = Vec::new();
    for agent_id in &deps.config.agents {
        let Some(path) = paths.get(agent_id) else {
            continue;
        };
        let (Some(start), Some(end)) = (path.start(), path.end()) else {
            continue;
        };
        if path.is_degenerate() {
            continue;
        }
        if state.update_fingerprint(agent_id, PathFingerprint::of(path)) {
            tracing::info!("Path change detected for {}", agent_id);
            changed.push((agent_id.clone(), *start, *end));
        }
    }

    let outcomes: Vec<bool> = stream::iter(changed)
        .map(|(agent_id, start, end)| {
            let fleet = paths.clone();
            async move { replan_and_publish(state, deps, fleet, agent_id, start, end).await }
        })
        .buffer_unordered(deps.config.max_concurrent_replans.max(1))
        .collect()
        .await;

    let replanned = outcomes.iter().filter(|ok| **ok).count();
    CycleReport {
        cycle,
        agents: deps.config.agents.len(),
        degraded,
        alerts: alert_count,
        replanned,
        errors: outcomes.len() - replanned,
        finished_at: Utc::now(),
    }
}

/// Read every configured agent's path. Unreadable or invalid paths count as
/// empty for this cycle.
async fn fetch_paths(deps: &ArbiterDeps) -> (HashMap<String, Path>, usize) {
    let limit = deps.config.path_timeout;
    let reads = deps.config.agents.iter().map(|agent_id| async move {
        let result = timeout(limit, deps.paths.current_path(agent_id)).await;
        (agent_id, result)
    });
    let results = futures::future::join_all(reads).await;

    let mut paths = HashMap::with_capacity(results.len());
    let mut degraded = 0;
    for (agent_id, result) in results {
        let path = match result {
            Ok(Ok(path)) => match deps.builder.projection().project_all(path.points()) {
                Ok(_) => path,
                Err(e) => {
                    tracing::warn!("Ignoring path for {}: {}", agent_id, e);
                    degraded += 1;
                    Path::empty()
                }
            },
            Ok(Err(e)) => {
                tracing::warn!("Failed to read path for {}: {:#}", agent_id, e);
                degraded += 1;
                Path::empty()
            }
            Err(_) => {
                tracing::warn!("Timed out reading path for {} after {:?}", agent_id, limit);
                degraded += 1;
                Path::empty()
            }
        };
        paths.insert(agent_id.clone(), path);
    }
    (paths, degraded)
}

async fn detect(paths: Arc<HashMap<String, Path>>, deps: &ArbiterDeps) -> Vec<AlertEntry> {
    let builder = deps.builder;
    let rules = deps.config.rules.clone();
    let result =
        tokio::task::spawn_blocking(move || detect_conflicts(&paths, &builder, &rules)).await;

    let message = match result {
        Ok(Ok(alerts)) => {
            for alert in alerts.iter().filter(|a| a.severity == ConflictSeverity::High) {
                tracing::warn!(
                    "  [high] {} <-> {} overlap {:.1} m2",
                    alert.a,
                    alert.b,
                    alert.overlap_area_m2
                );
            }
            return alerts.into_iter().map(AlertEntry::RouteConflict).collect();
        }
        Ok(Err(e)) => e.to_string(),
        Err(e) => format!("Conflict detection aborted: {}", e),
    };
    tracing::error!("Conflict detection failed: {}", message);
    vec![AlertEntry::Error { message }]
}

async fn replan_and_publish(
    state: &AppState,
    deps: &ArbiterDeps,
    fleet: Arc<HashMap<String, Path>>,
    agent_id: String,
    start: GeoPoint,
    end: GeoPoint,
) -> bool {
    match replan(deps, fleet, &agent_id, start, end).await {
        Ok(recommendation) => {
            match recommendation.best.as_ref() {
                Some(best) => tracing::info!(
                    "Recommendation for {}: {} (score {:.3}, conflict {:.1} m2)",
                    agent_id,
                    best.algorithm,
                    best.score,
                    best.conflict_area_m2
                ),
                None => tracing::info!("No viable candidate for {}", agent_id),
            }
            state.publish_recommendation(AgentRecommendation::Recommendation(
                recommendation.clone(),
            ));
            notify(deps, &recommendation).await;
            true
        }
        Err(e) => {
            tracing::warn!("Replan for {} failed: {}", agent_id, e);
            state.publish_recommendation(AgentRecommendation::Error(RecommendationError::new(
                agent_id,
                e.to_string(),
            )));
            false
        }
    }
}

async fn replan(
    deps: &ArbiterDeps,
    fleet: Arc<HashMap<String, Path>>,
    agent_id: &str,
    start: GeoPoint,
    end: GeoPoint,
) -> Result<Recommendation, ReplanError> {
    let server_url = deps
        .config
        .server_for(agent_id)
        .ok_or(ReplanError::NoServerMapping)?;

    let request = CandidateRequest::new(
        start,
        end,
        deps.config.candidate_algorithms.clone(),
        deps.config.random_runs,
        deps.config.use_crop,
    );
    let candidates = bounded(
        deps.config.candidates_timeout,
        deps.planner.fetch_candidates(server_url, &request),
    )
    .await
    .map_err(ReplanError::FetchFailure)?;
    tracing::debug!("{} candidate(s) for {}", candidates.len(), agent_id);

    // CPU bound, runs on the blocking pool like detection
    let builder = deps.builder;
    let length_weight = deps.config.rules.length_weight;
    let owner = agent_id.to_string();
    let ranked = tokio::task::spawn_blocking(move || {
        score_candidates(&owner, &candidates, &fleet, &builder, length_weight)
    })
    .await??;

    Ok(Recommendation::from_ranking(
        agent_id,
        start,
        end,
        ranked,
        deps.config.rules.ranking_size,
        server_url,
    ))
}

/// Best effort. A failed push is logged and not retried.
async fn notify(deps: &ArbiterDeps, recommendation: &Recommendation) {
    let push = deps
        .planner
        .push_recommendation(&recommendation.server_url, recommendation);
    if let Err(e) = bounded(deps.config.recommendation_timeout, push).await {
        tracing::warn!(
            "Failed to push recommendation to {}: {:#}",
            recommendation.car,
            e
        );
    }
}

async fn bounded<T>(
    limit: Duration,
    call: impl std::future::Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("timed out after {:?}", limit)),
    }
}
