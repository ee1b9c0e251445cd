//! Error types for the association core.

use thiserror::Error;

/// Result type alias used throughout `kpi_core`.
pub type Result<T> = std::result::Result<T, KpiError>;

/// Errors raised by geometry construction, timestamp alignment and
/// association configuration.
///
/// Empty frames (no detections, no ground truth) are not errors: they yield a
/// ratio of 0 so that verdicts stay computable for sparse recordings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KpiError {
    /// Alignment was attempted against an empty ground-truth set.
    #[error("ground truth is empty: cannot align timestamp")]
    EmptyGroundTruth,

    /// Zero-length segment, polygon with fewer than 3 vertices, etc.
    #[error("degenerate geometry: {reason}")]
    DegenerateGeometry { reason: String },

    /// Non-positive association radius or another out-of-range threshold.
    #[error("invalid threshold `{name}`: {value}")]
    InvalidThreshold { name: &'static str, value: f64 },
}

impl KpiError {
    pub fn degenerate<S: Into<String>>(reason: S) -> Self {
        Self::DegenerateGeometry {
            reason: reason.into(),
        }
    }

    pub fn threshold(name: &'static str, value: f64) -> Self {
        Self::InvalidThreshold { name, value }
    }
}
