//! Fundamental types used across the entire workspace.

use crate::geometry::Geometry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recording timestamp in microseconds.
pub type Timestamp = u64;

// ---------------------------------------------------------------------------
// Identifier types — newtype wrappers so IDs are never confused at compile time
// ---------------------------------------------------------------------------

/// Camera / sensor that produced a detection (e.g. front, rear, left, right
/// surround-view camera, or a fused source).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Detections
// ---------------------------------------------------------------------------

/// One detected object decoded from a timeframe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub timestamp: Timestamp,
    /// Which camera / sensor produced this detection
    pub source: SourceId,
    pub geometry: Geometry,
    /// Existence probability reported by the detector, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// All detections decoded for one timeframe.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub timestamp: Timestamp,
    pub detections: Vec<DetectionRecord>,
}

impl DetectionFrame {
    /// Detections with confidence at or above `min_confidence`. Records
    /// without a confidence always pass.
    pub fn confident(&self, min_confidence: f64) -> impl Iterator<Item = &DetectionRecord> {
        self.detections
            .iter()
            .filter(move |d| d.confidence.map_or(true, |c| c >= min_confidence))
    }

    /// Distinct sources present in this frame, ascending.
    pub fn sources(&self) -> Vec<SourceId> {
        let mut ids: Vec<SourceId> = self.detections.iter().map(|d| d.source).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

// ---------------------------------------------------------------------------
// Ground truth
// ---------------------------------------------------------------------------

/// Reference geometries valid at one timestamp.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthFrame {
    pub timestamp: Timestamp,
    pub geometries: Vec<Geometry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Segment;

    fn det(source: u32, confidence: Option<f64>) -> DetectionRecord {
        DetectionRecord {
            timestamp: 0,
            source: SourceId(source),
            geometry: Segment::from_coords(0.0, 0.0, 1.0, 0.0).unwrap().into(),
            confidence,
        }
    }

    #[test]
    fn confidence_filter_keeps_unscored() {
        let frame = DetectionFrame {
            timestamp: 0,
            detections: vec![det(0, Some(0.9)), det(0, Some(0.2)), det(1, None)],
        };
        assert_eq!(frame.confident(0.5).count(), 2);
        assert_eq!(frame.sources(), vec![SourceId(0), SourceId(1)]);
    }

    #[test]
    fn missing_confidence_deserializes() {
        let json = r#"{"timestamp":5,"source":3,"geometry":{"Segment":{"start":[0,0],"end":[2,0]}}}"#;
        let rec: DetectionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.source, SourceId(3));
        assert_eq!(rec.confidence, None);
    }
}
