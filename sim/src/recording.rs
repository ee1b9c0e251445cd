//! Recordings: serialize/deserialize detection logs and ground truth for
//! offline evaluation.

use anyhow::Context;
use kpi_core::timestamp::GroundTruthIndex;
use kpi_core::types::{DetectionFrame, GroundTruthFrame};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A recorded drive: detection frames plus (optionally) the ground truth.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Recording {
    pub scenario_name: String,
    pub seed: u64,
    /// All detection frames in chronological order
    pub frames: Vec<DetectionFrame>,
    /// Ground-truth frames; may be shipped in a separate file instead
    #[serde(default)]
    pub ground_truth: Vec<GroundTruthFrame>,
}

impl Recording {
    /// Ground truth keyed by timestamp, ready for nearest-timestamp lookup.
    pub fn ground_truth_index(&self) -> GroundTruthIndex<GroundTruthFrame> {
        index_ground_truth(self.ground_truth.iter().cloned())
    }
}

/// Key ground-truth frames by their timestamp.
pub fn index_ground_truth(
    frames: impl IntoIterator<Item = GroundTruthFrame>,
) -> GroundTruthIndex<GroundTruthFrame> {
    frames.into_iter().map(|f| (f.timestamp, f)).collect()
}

/// Save a recording to a JSON file.
pub fn save_recording(rec: &Recording, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), rec)?;
    Ok(())
}

/// Load a recording from a JSON file.
pub fn load_recording(path: &Path) -> anyhow::Result<Recording> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let rec = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing recording {}", path.display()))?;
    Ok(rec)
}

/// Save ground-truth frames on their own.
pub fn save_ground_truth(frames: &[GroundTruthFrame], path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), frames)?;
    Ok(())
}

/// Load a JSON array of ground-truth frames.
pub fn load_ground_truth(path: &Path) -> anyhow::Result<Vec<GroundTruthFrame>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let frames = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing ground truth {}", path.display()))?;
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kpi_core::geometry::Segment;

    fn gt(ts: u64) -> GroundTruthFrame {
        GroundTruthFrame {
            timestamp: ts,
            geometries: vec![Segment::from_coords(0.0, 0.0, 1.0, 0.0).unwrap().into()],
        }
    }

    #[test]
    fn ground_truth_is_optional_in_json() {
        let json = r#"{"scenario_name":"x","seed":1,"frames":[]}"#;
        let rec: Recording = serde_json::from_str(json).unwrap();
        assert!(rec.ground_truth.is_empty());
        assert!(rec.ground_truth_index().is_empty());
    }

    #[test]
    fn index_finds_nearest_frame() {
        let index = index_ground_truth(vec![gt(200), gt(100), gt(300)]);
        assert_eq!(index.len(), 3);
        assert_eq!(index.closest(190).unwrap().timestamp, 200);
    }
}
