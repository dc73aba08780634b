//! Arbiter CLI - offline checks over recorded fleet paths.
//!
//! Runs the same detector and scorer as the server against JSON files, which
//! is handy for replaying a cycle or tuning thresholds.

pub mod check;

pub use check::{load_candidates, load_fleet, run_conflicts, run_score, CheckSettings};
