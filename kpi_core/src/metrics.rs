//! Classification metrics: true/false-positive tallies folded over frames,
//! overall and per source.

use crate::association::{AssociationResult, RatioBasis};
use crate::types::{SourceId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::AddAssign;

/// Running true/false-positive counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationTally {
    pub true_positive_count: u64,
    pub false_positive_count: u64,
    pub total_ground_truth: u64,
    pub total_detections: u64,
}

impl ClassificationTally {
    pub fn false_negative_count(&self) -> u64 {
        self.total_ground_truth
            .saturating_sub(self.true_positive_count)
    }

    /// TP / detections; 0 when nothing was detected.
    pub fn precision(&self) -> f64 {
        if self.total_detections == 0 {
            0.0
        } else {
            self.true_positive_count as f64 / self.total_detections as f64
        }
    }

    /// TP / ground truth; 0 when there was no ground truth.
    pub fn recall(&self) -> f64 {
        if self.total_ground_truth == 0 {
            0.0
        } else {
            self.true_positive_count as f64 / self.total_ground_truth as f64
        }
    }

    /// FP / detections; complements `precision` when both are non-zero.
    pub fn false_positive_rate(&self) -> f64 {
        if self.total_detections == 0 {
            0.0
        } else {
            self.false_positive_count as f64 / self.total_detections as f64
        }
    }

    pub fn ratio(&self, basis: RatioBasis) -> f64 {
        match basis {
            RatioBasis::Detections => self.precision(),
            RatioBasis::GroundTruth => self.recall(),
        }
    }
}

impl AddAssign for ClassificationTally {
    fn add_assign(&mut self, rhs: Self) {
        self.true_positive_count += rhs.true_positive_count;
        self.false_positive_count += rhs.false_positive_count;
        self.total_ground_truth += rhs.total_ground_truth;
        self.total_detections += rhs.total_detections;
    }
}

impl From<&AssociationResult> for ClassificationTally {
    fn from(res: &AssociationResult) -> Self {
        Self {
            true_positive_count: res.true_positives() as u64,
            false_positive_count: res.false_positives() as u64,
            total_ground_truth: res.n_ground_truth as u64,
            total_detections: res.n_detections as u64,
        }
    }
}

/// One frame's contribution to the aggregator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameResult {
    pub timestamp: Timestamp,
    /// `None` for the fused (all sources) result, `Some` for a per-source slice
    pub source: Option<SourceId>,
    pub tally: ClassificationTally,
}

impl FrameResult {
    pub fn fused(timestamp: Timestamp, res: &AssociationResult) -> Self {
        Self {
            timestamp,
            source: None,
            tally: res.into(),
        }
    }

    pub fn for_source(timestamp: Timestamp, source: SourceId, res: &AssociationResult) -> Self {
        Self {
            timestamp,
            source: Some(source),
            tally: res.into(),
        }
    }
}

/// Folds per-frame results into running tallies.
#[derive(Clone, Debug, Default)]
pub struct ClassificationAggregator {
    basis: RatioBasis,
    overall: ClassificationTally,
    per_source: BTreeMap<SourceId, ClassificationTally>,
    /// Overall ratio of every fused frame, in update order
    timeline: Vec<(Timestamp, f64)>,
    n_frames: u64,
}

impl ClassificationAggregator {
    pub fn new(basis: RatioBasis) -> Self {
        Self {
            basis,
            ..Default::default()
        }
    }

    pub fn basis(&self) -> RatioBasis {
        self.basis
    }

    pub fn update(&mut self, frame: &FrameResult) {
        match frame.source {
            None => {
                self.overall += frame.tally;
                self.timeline
                    .push((frame.timestamp, frame.tally.ratio(self.basis)));
                self.n_frames += 1;
            }
            Some(id) => *self.per_source.entry(id).or_default() += frame.tally,
        }
    }

    /// Overall ratio under the configured basis; 0 when nothing was counted.
    pub fn ratio(&self) -> f64 {
        self.overall.ratio(self.basis)
    }

    pub fn precision(&self) -> f64 {
        self.overall.precision()
    }

    pub fn recall(&self) -> f64 {
        self.overall.recall()
    }

    pub fn per_source_ratios(&self) -> BTreeMap<SourceId, f64> {
        self.per_source
            .iter()
            .map(|(id, t)| (*id, t.ratio(self.basis)))
            .collect()
    }

    pub fn tally(&self) -> &ClassificationTally {
        &self.overall
    }

    pub fn per_source(&self) -> &BTreeMap<SourceId, ClassificationTally> {
        &self.per_source
    }

    pub fn timeline(&self) -> &[(Timestamp, f64)] {
        &self.timeline
    }

    /// Number of fused frames folded in.
    pub fn n_frames(&self) -> u64 {
        self.n_frames
    }
}
