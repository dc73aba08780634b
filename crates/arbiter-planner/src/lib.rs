//! Arbiter Planner - external collaborators of the arbitration loop
//!
//! Covers the source of each agent's committed path and the per-agent route
//! planner that proposes alternative candidates and receives recommendations.

pub mod client;
pub mod paths;

use anyhow::Result;
use arbiter_core::{Candidate, Path, Recommendation};
use async_trait::async_trait;

pub use client::{CandidateRequest, CandidateResponse, PlannerClient, PlannerTimeouts};
pub use paths::{HttpPathSource, StaticPathSource};

/// Supplies each agent's currently committed path.
#[async_trait]
pub trait PathSource: Send + Sync {
    async fn current_path(&self, agent_id: &str) -> Result<Path>;
}

/// Per-agent route planner, addressed by its base URL.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn fetch_candidates(
        &self,
        server_url: &str,
        request: &CandidateRequest,
    ) -> Result<Vec<Candidate>>;

    async fn push_recommendation(
        &self,
        server_url: &str,
        recommendation: &Recommendation,
    ) -> Result<()>;
}
