//! Coarse path signatures for change detection.
//!
//! Only the point count and the two endpoints go into the signature, so a
//! path that changes interior waypoints while keeping both endpoints and its
//! length is reported as unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Path;

const EMPTY: &str = "empty";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathFingerprint(String);

impl PathFingerprint {
    /// Signature of `path`; degenerate paths share the `"empty"` signature.
    pub fn of(path: &Path) -> Self {
        match (path.start(), path.end()) {
            (Some(s), Some(e)) if !path.is_degenerate() => Self(format!(
                "{}|{},{}->{},{}",
                path.len(),
                s.lat,
                s.lng,
                e.lat,
                e.lng
            )),
            _ => Self(EMPTY.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0 == EMPTY
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
