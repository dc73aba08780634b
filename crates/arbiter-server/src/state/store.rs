//! Published fleet state.
//!
//! Collections are swapped whole behind `Arc` snapshots, so readers never see
//! a half-written cycle.

use arbiter_core::{AgentRecommendation, AlertEntry, PathFingerprint};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{broadcast, watch};

use crate::loops::arbiter_loop::CycleReport;

/// Snapshots buffered per alert subscriber before the oldest are dropped.
pub const ALERT_CHANNEL_CAPACITY: usize = 16;

pub type AlertSnapshot = Arc<Vec<AlertEntry>>;

/// Application state shared by the arbiter loop and the query surface.
pub struct AppState {
    alerts: RwLock<AlertSnapshot>,
    recommendations: RwLock<Arc<HashMap<String, AgentRecommendation>>>,
    fingerprints: DashMap<String, PathFingerprint>,
    last_cycle: RwLock<Option<CycleReport>>,
    alert_tx: broadcast::Sender<AlertSnapshot>,
    closing: watch::Sender<bool>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        let (alert_tx, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        let (closing, _) = watch::channel(false);
        Self {
            alerts: RwLock::new(Arc::new(Vec::new())),
            recommendations: RwLock::new(Arc::new(HashMap::new())),
            fingerprints: DashMap::new(),
            last_cycle: RwLock::new(None),
            alert_tx,
            closing,
        }
    }

    /// Replace the alert list and fan it out to every subscriber.
    pub fn publish_alerts(&self, alerts: Vec<AlertEntry>) {
        let snapshot = Arc::new(alerts);
        *self.alerts.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        // No subscribers is fine
        let _ = self.alert_tx.send(snapshot);
    }

    pub fn alerts(&self) -> AlertSnapshot {
        self.alerts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Each receiver gets its own bounded queue. A receiver that falls behind
    /// loses the oldest snapshots instead of stalling the publisher.
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<AlertSnapshot> {
        self.alert_tx.subscribe()
    }

    pub fn publish_recommendation(&self, entry: AgentRecommendation) {
        let mut guard = self
            .recommendations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut next = HashMap::clone(&guard);
        next.insert(entry.agent_id().to_string(), entry);
        *guard = Arc::new(next);
    }

    pub fn recommendations(&self) -> Arc<HashMap<String, AgentRecommendation>> {
        self.recommendations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn recommendation(&self, agent_id: &str) -> Option<AgentRecommendation> {
        self.recommendations().get(agent_id).cloned()
    }

    /// All recommendations, newest first.
    pub fn recommendation_list(&self) -> Vec<AgentRecommendation> {
        let mut items: Vec<AgentRecommendation> = self.recommendations().values().cloned().collect();
        items.sort_by(|a, b| b.timestamp().total_cmp(&a.timestamp()));
        items
    }

    pub fn fingerprint(&self, agent_id: &str) -> Option<PathFingerprint> {
        self.fingerprints.get(agent_id).map(|fp| fp.value().clone())
    }

    /// Store `fingerprint` for `agent_id`. Returns true when it differs from
    /// the previous one.
    pub fn update_fingerprint(&self, agent_id: &str, fingerprint: PathFingerprint) -> bool {
        match self.fingerprints.insert(agent_id.to_string(), fingerprint.clone()) {
            Some(previous) => previous != fingerprint,
            None => true,
        }
    }

    pub fn fingerprints(&self) -> BTreeMap<String, String> {
        self.fingerprints
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().as_str().to_string()))
            .collect()
    }

    pub fn record_cycle(&self, report: CycleReport) {
        *self.last_cycle.write().unwrap_or_else(PoisonError::into_inner) = Some(report);
    }

    pub fn last_cycle(&self) -> Option<CycleReport> {
        self.last_cycle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ask every open feed to finish so graceful shutdown can drain.
    pub fn begin_shutdown(&self) {
        self.closing.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.closing.borrow()
    }

    /// Resolves once `begin_shutdown` has been called, including before the
    /// future was created.
    pub fn shutdown_requested(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut rx = self.closing.subscribe();
        async move {
            let _ = rx.wait_for(|closing| *closing).await;
        }
    }
}
