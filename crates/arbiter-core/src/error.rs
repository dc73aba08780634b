//! Error types for the arbitration core.

use thiserror::Error;

/// Failures raised by projection and corridor construction.
///
/// A degenerate path is not an error: builders return `Ok(None)` for it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArbiterError {
    #[error("invalid coordinate (lat {lat}, lng {lng}): {reason}")]
    InvalidCoordinate {
        lat: f64,
        lng: f64,
        reason: &'static str,
    },

    #[error("safety radius must be positive and finite, got {0}")]
    InvalidRadius(f64),

    #[error("scanline step must be positive and finite, got {0}")]
    InvalidSampleStep(f64),

    #[error("UTM zone must be within 1..=60, got {0}")]
    InvalidZone(u8),
}

pub type Result<T> = std::result::Result<T, ArbiterError>;
