//! KPI evaluator: runs one association KPI over a whole recording.
//!
//! # Processing steps per detection frame
//! 1. Align: pick the ground-truth frame with the closest timestamp
//!    (optionally skip the frame when it is further than `max_time_offset`)
//! 2. Filter detections by confidence (optional)
//! 3. Associate all detections against the ground truth (fused result)
//! 4. When partitioning by source, associate each source's detections alone
//! 5. Fold the tallies into the aggregator
//!
//! [`KpiEvaluator::evaluate`] computes steps 1-4 for all frames in parallel
//! and folds step 5 in frame order, so it yields exactly what calling
//! [`KpiEvaluator::process_frame`] frame by frame would.

use crate::{
    association::{AssociationConfig, AssociationResult, Associator, RatioBasis},
    error::{KpiError, Result},
    geometry::Geometry,
    metrics::{ClassificationAggregator, ClassificationTally, FrameResult},
    timestamp::GroundTruthIndex,
    types::{DetectionFrame, GroundTruthFrame, SourceId, Timestamp},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn default_pass_threshold() -> f64 {
    0.9
}

/// Configuration of one KPI evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    #[serde(default)]
    pub association: AssociationConfig,
    /// Denominator of the headline ratio
    #[serde(default)]
    pub ratio_basis: RatioBasis,
    /// Also evaluate every camera / sensor on its own
    #[serde(default)]
    pub partition_by_source: bool,
    /// Sources scored in every frame even when they report nothing.
    /// Sources seen in the detections are added to this set.
    #[serde(default)]
    pub sources: Vec<SourceId>,
    /// Frames whose nearest ground truth is further away (µs) are skipped
    #[serde(default)]
    pub max_time_offset: Option<Timestamp>,
    /// Detections below this confidence are ignored
    #[serde(default)]
    pub min_confidence: Option<f64>,
    /// Minimum headline ratio for a `Passed` verdict
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            association: AssociationConfig::default(),
            ratio_basis: RatioBasis::Detections,
            partition_by_source: false,
            sources: Vec::new(),
            max_time_offset: None,
            min_confidence: None,
            pass_threshold: default_pass_threshold(),
        }
    }
}

impl EvaluatorConfig {
    pub fn validate(&self) -> Result<()> {
        self.association.validate()?;
        if !(0.0..=1.0).contains(&self.pass_threshold) {
            return Err(KpiError::threshold("pass_threshold", self.pass_threshold));
        }
        if let Some(c) = self.min_confidence {
            if !(0.0..=1.0).contains(&c) {
                return Err(KpiError::threshold("min_confidence", c));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Final verdict of a KPI step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Passed,
    Failed,
    /// Inputs missing (no ground truth, or no frame could be aligned)
    NotAssessed,
}

/// Per-source slice of a report.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SourceSummary {
    pub source: SourceId,
    pub ratio: f64,
    pub tally: ClassificationTally,
}

/// Summary handed to the reporting layer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KpiReport {
    pub ratio_basis: RatioBasis,
    pub ratio: f64,
    pub precision: f64,
    pub recall: f64,
    pub tally: ClassificationTally,
    pub per_source: Vec<SourceSummary>,
    pub frames_assessed: u64,
    pub frames_skipped: u64,
    pub pass_threshold: f64,
    pub verdict: Verdict,
    /// Overall ratio per assessed frame (detection timestamp, ratio)
    pub timeline: Vec<(Timestamp, f64)>,
}

/// Report emitted when the KPI could not be computed at all.
pub fn not_assessed_report(config: &EvaluatorConfig) -> KpiReport {
    KpiReport {
        ratio_basis: config.ratio_basis,
        ratio: 0.0,
        precision: 0.0,
        recall: 0.0,
        tally: ClassificationTally::default(),
        per_source: Vec::new(),
        frames_assessed: 0,
        frames_skipped: 0,
        pass_threshold: config.pass_threshold,
        verdict: Verdict::NotAssessed,
        timeline: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Association results for one detection frame.
#[derive(Clone, Debug)]
pub struct FrameOutcome {
    pub timestamp: Timestamp,
    /// Timestamp of the ground-truth frame it was aligned with
    pub ground_truth_timestamp: Timestamp,
    pub fused: AssociationResult,
    pub per_source: Vec<(SourceId, AssociationResult)>,
}

/// Runs one KPI step: alignment, association, aggregation, verdict.
pub struct KpiEvaluator {
    pub config: EvaluatorConfig,
    associator: Associator,
    aggregator: ClassificationAggregator,
    /// Sources sliced out of every assessed frame
    known_sources: BTreeSet<SourceId>,
    frames_skipped: u64,
}

impl KpiEvaluator {
    /// Validates the configuration eagerly.
    pub fn new(config: EvaluatorConfig) -> Result<Self> {
        config.validate()?;
        let associator = Associator::new(config.association.clone())?;
        let aggregator = ClassificationAggregator::new(config.ratio_basis);
        let known_sources = config.sources.iter().copied().collect();
        Ok(Self {
            config,
            associator,
            aggregator,
            known_sources,
            frames_skipped: 0,
        })
    }

    pub fn aggregator(&self) -> &ClassificationAggregator {
        &self.aggregator
    }

    /// Align + associate one frame without touching the running tallies.
    /// `Ok(None)` when the frame is outside the ground-truth time tolerance.
    pub fn assess(
        &self,
        frame: &DetectionFrame,
        ground_truth: &GroundTruthIndex<GroundTruthFrame>,
    ) -> Result<Option<FrameOutcome>> {
        let (gt_ts, gt_frame) = match self.config.max_time_offset {
            Some(tol) => match ground_truth.closest_within(frame.timestamp, tol)? {
                Some(entry) => entry,
                None => {
                    debug!(ts = frame.timestamp, tol, "no ground truth within tolerance");
                    return Ok(None);
                }
            },
            None => ground_truth.closest_entry(frame.timestamp)?,
        };

        let min_conf = self.config.min_confidence.unwrap_or(0.0);
        let mut all: Vec<Geometry> = Vec::with_capacity(frame.detections.len());
        let mut by_source: BTreeMap<SourceId, Vec<Geometry>> = BTreeMap::new();
        if self.config.partition_by_source {
            // A silent source still owes this frame's ground truth
            for id in self.known_sources.iter().copied().chain(frame.sources()) {
                by_source.entry(id).or_default();
            }
        }
        for det in frame.confident(min_conf) {
            all.push(det.geometry.clone());
            if self.config.partition_by_source {
                by_source
                    .entry(det.source)
                    .or_default()
                    .push(det.geometry.clone());
            }
        }

        let fused = self.associator.associate(&all, &gt_frame.geometries);
        let per_source = by_source
            .into_iter()
            .map(|(id, dets)| (id, self.associator.associate(&dets, &gt_frame.geometries)))
            .collect();

        debug!(
            ts = frame.timestamp,
            gt_ts,
            detections = fused.n_detections,
            ground_truth = fused.n_ground_truth,
            tp = fused.true_positives(),
            "frame associated"
        );

        Ok(Some(FrameOutcome {
            timestamp: frame.timestamp,
            ground_truth_timestamp: gt_ts,
            fused,
            per_source,
        }))
    }

    fn fold(&mut self, outcome: Option<FrameOutcome>) {
        let Some(outcome) = outcome else {
            self.frames_skipped += 1;
            return;
        };
        self.aggregator
            .update(&FrameResult::fused(outcome.timestamp, &outcome.fused));
        for (id, res) in &outcome.per_source {
            self.aggregator
                .update(&FrameResult::for_source(outcome.timestamp, *id, res));
        }
    }

    /// Process one frame and fold it into the running tallies.
    /// Only sources declared in the config or already seen are scored.
    pub fn process_frame(
        &mut self,
        frame: &DetectionFrame,
        ground_truth: &GroundTruthIndex<GroundTruthFrame>,
    ) -> Result<Option<FrameOutcome>> {
        self.known_sources.extend(frame.sources());
        let outcome = self.assess(frame, ground_truth)?;
        self.fold(outcome.clone());
        Ok(outcome)
    }

    /// Evaluate a whole recording. Every source present anywhere in `frames`
    /// is scored in every assessed frame. Empty ground truth is an error the
    /// caller turns into a `NotAssessed` verdict.
    pub fn evaluate(
        &mut self,
        frames: &[DetectionFrame],
        ground_truth: &GroundTruthIndex<GroundTruthFrame>,
    ) -> Result<KpiReport> {
        if ground_truth.is_empty() {
            warn!("ground truth is empty, KPI not assessed");
            return Err(KpiError::EmptyGroundTruth);
        }

        self.known_sources
            .extend(frames.iter().flat_map(|f| f.sources()));
        let this = &*self;
        let outcomes: Vec<Option<FrameOutcome>> = frames
            .par_iter()
            .map(|f| this.assess(f, ground_truth))
            .collect::<Result<_>>()?;

        for outcome in outcomes {
            self.fold(outcome);
        }

        if self.frames_skipped > 0 {
            warn!(
                skipped = self.frames_skipped,
                total = frames.len(),
                "frames skipped: no ground truth within tolerance"
            );
        }

        let report = self.report();
        info!(
            ratio = report.ratio,
            precision = report.precision,
            recall = report.recall,
            verdict = ?report.verdict,
            "KPI evaluated"
        );
        Ok(report)
    }

    /// Snapshot of the current tallies.
    pub fn report(&self) -> KpiReport {
        let agg = &self.aggregator;
        let ratio = agg.ratio();
        let verdict = if agg.n_frames() == 0 {
            Verdict::NotAssessed
        } else if ratio >= self.config.pass_threshold {
            Verdict::Passed
        } else {
            Verdict::Failed
        };

        KpiReport {
            ratio_basis: agg.basis(),
            ratio,
            precision: agg.precision(),
            recall: agg.recall(),
            tally: *agg.tally(),
            per_source: agg
                .per_source()
                .iter()
                .map(|(id, t)| SourceSummary {
                    source: *id,
                    ratio: t.ratio(agg.basis()),
                    tally: *t,
                })
                .collect(),
            frames_assessed: agg.n_frames(),
            frames_skipped: self.frames_skipped,
            pass_threshold: self.config.pass_threshold,
            verdict,
            timeline: agg.timeline().to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Segment;
    use crate::types::DetectionRecord;
    use approx::assert_abs_diff_eq;

    fn line(y: f64) -> Geometry {
        Segment::from_coords(0.0, y, 4.0, y).unwrap().into()
    }

    fn det(ts: Timestamp, source: u32, y: f64) -> DetectionRecord {
        DetectionRecord {
            timestamp: ts,
            source: SourceId(source),
            geometry: line(y),
            confidence: None,
        }
    }

    /// Three delimiter lines at y = 0, 3, 6, sampled every 100 ms.
    fn ground_truth() -> GroundTruthIndex<GroundTruthFrame> {
        (0..5u64)
            .map(|i| {
                let ts = i * 100_000;
                (
                    ts,
                    GroundTruthFrame {
                        timestamp: ts,
                        geometries: vec![line(0.0), line(3.0), line(6.0)],
                    },
                )
            })
            .collect()
    }

    #[test]
    fn perfect_detections_pass() {
        let frames: Vec<DetectionFrame> = (0..5u64)
            .map(|i| {
                let ts = i * 100_000 + 20_000;
                DetectionFrame {
                    timestamp: ts,
                    detections: vec![det(ts, 0, 0.1), det(ts, 0, 3.0), det(ts, 1, 5.9)],
                }
            })
            .collect();
        let mut ev = KpiEvaluator::new(EvaluatorConfig::default()).unwrap();
        let report = ev.evaluate(&frames, &ground_truth()).unwrap();
        assert_eq!(report.verdict, Verdict::Passed);
        assert_abs_diff_eq!(report.ratio, 1.0);
        assert_eq!(report.frames_assessed, 5);
        assert_eq!(report.tally.true_positive_count, 15);
    }

    #[test]
    fn clutter_fails_precision_not_recall() {
        let ts = 0;
        let frames = vec![DetectionFrame {
            timestamp: ts,
            detections: vec![
                det(ts, 0, 0.0),
                det(ts, 0, 3.0),
                det(ts, 0, 6.0),
                det(ts, 0, 20.0),
            ],
        }];
        let cfg = EvaluatorConfig {
            pass_threshold: 0.8,
            ..Default::default()
        };
        let report = KpiEvaluator::new(cfg.clone())
            .unwrap()
            .evaluate(&frames, &ground_truth())
            .unwrap();
        assert_abs_diff_eq!(report.precision, 0.75);
        assert_abs_diff_eq!(report.recall, 1.0);
        assert_eq!(report.verdict, Verdict::Failed);

        let cfg = EvaluatorConfig {
            ratio_basis: RatioBasis::GroundTruth,
            ..cfg
        };
        let report = KpiEvaluator::new(cfg)
            .unwrap()
            .evaluate(&frames, &ground_truth())
            .unwrap();
        assert_eq!(report.verdict, Verdict::Passed);
    }

    #[test]
    fn frames_outside_tolerance_are_skipped() {
        let frames = vec![
            DetectionFrame {
                timestamp: 10_000,
                detections: vec![det(10_000, 0, 0.0)],
            },
            DetectionFrame {
                timestamp: 950_000,
                detections: vec![det(950_000, 0, 0.0)],
            },
        ];
        let cfg = EvaluatorConfig {
            max_time_offset: Some(50_000),
            ..Default::default()
        };
        let report = KpiEvaluator::new(cfg)
            .unwrap()
            .evaluate(&frames, &ground_truth())
            .unwrap();
        assert_eq!(report.frames_assessed, 1);
        assert_eq!(report.frames_skipped, 1);
    }

    #[test]
    fn empty_ground_truth_is_not_assessed() {
        let cfg = EvaluatorConfig::default();
        let mut ev = KpiEvaluator::new(cfg.clone()).unwrap();
        let err = ev
            .evaluate(&[DetectionFrame::default()], &GroundTruthIndex::default())
            .unwrap_err();
        assert_eq!(err, KpiError::EmptyGroundTruth);
        assert_eq!(not_assessed_report(&cfg).verdict, Verdict::NotAssessed);
        // No frames at all: nothing assessed either
        assert_eq!(ev.report().verdict, Verdict::NotAssessed);
    }

    #[test]
    fn per_source_partition() {
        let ts = 100_000;
        let frames = vec![DetectionFrame {
            timestamp: ts,
            detections: vec![det(ts, 0, 0.0), det(ts, 0, 9.0), det(ts, 1, 3.1)],
        }];
        let cfg = EvaluatorConfig {
            partition_by_source: true,
            ..Default::default()
        };
        let report = KpiEvaluator::new(cfg)
            .unwrap()
            .evaluate(&frames, &ground_truth())
            .unwrap();
        assert_eq!(report.per_source.len(), 2);
        assert_eq!(report.per_source[0].source, SourceId(0));
        assert_abs_diff_eq!(report.per_source[0].ratio, 0.5);
        assert_abs_diff_eq!(report.per_source[1].ratio, 1.0);
        assert_abs_diff_eq!(report.ratio, 2.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn parallel_evaluate_matches_sequential() {
        let gt = ground_truth();
        let frames: Vec<DetectionFrame> = (0..40u64)
            .map(|i| {
                let ts = i * 13_000;
                let detections = (0..(i % 4))
                    .map(|k| det(ts, (k % 2) as u32, k as f64 * 3.0 + 0.1 * (i % 3) as f64))
                    .collect();
                DetectionFrame {
                    timestamp: ts,
                    detections,
                }
            })
            .collect();
        let cfg = EvaluatorConfig {
            partition_by_source: true,
            sources: vec![SourceId(0), SourceId(1)],
            max_time_offset: Some(40_000),
            ..Default::default()
        };

        let par = KpiEvaluator::new(cfg.clone())
            .unwrap()
            .evaluate(&frames, &gt)
            .unwrap();
        let mut seq = KpiEvaluator::new(cfg).unwrap();
        for f in &frames {
            seq.process_frame(f, &gt).unwrap();
        }
        assert_eq!(par, seq.report());
    }

    #[test]
    fn silent_source_still_counts_missed_ground_truth() {
        // One line in every frame; camera 1 only sees it in the first one.
        let frames: Vec<DetectionFrame> = (0..10u64)
            .map(|i| {
                let ts = i * 100_000;
                let detections = if i == 0 { vec![det(ts, 1, 0.0)] } else { vec![] };
                DetectionFrame {
                    timestamp: ts,
                    detections,
                }
            })
            .collect();
        let gt: GroundTruthIndex<GroundTruthFrame> = (0..10u64)
            .map(|i| {
                let ts = i * 100_000;
                (
                    ts,
                    GroundTruthFrame {
                        timestamp: ts,
                        geometries: vec![line(0.0)],
                    },
                )
            })
            .collect();
        let cfg = EvaluatorConfig {
            ratio_basis: RatioBasis::GroundTruth,
            partition_by_source: true,
            ..Default::default()
        };
        let report = KpiEvaluator::new(cfg)
            .unwrap()
            .evaluate(&frames, &gt)
            .unwrap();

        assert_abs_diff_eq!(report.recall, 0.1);
        assert_eq!(report.per_source.len(), 1);
        let cam = &report.per_source[0];
        assert_eq!(cam.source, SourceId(1));
        assert_eq!(cam.tally.total_ground_truth, 10);
        assert_abs_diff_eq!(cam.ratio, 0.1);
    }

    #[test]
    fn declared_source_without_detections_is_reported() {
        let ts = 0;
        let frames = vec![DetectionFrame {
            timestamp: ts,
            detections: vec![det(ts, 0, 0.0)],
        }];
        let cfg = EvaluatorConfig {
            ratio_basis: RatioBasis::GroundTruth,
            partition_by_source: true,
            sources: vec![SourceId(3)],
            ..Default::default()
        };
        let mut ev = KpiEvaluator::new(cfg).unwrap();
        ev.process_frame(&frames[0], &ground_truth()).unwrap();
        let report = ev.report();
        let ids: Vec<SourceId> = report.per_source.iter().map(|s| s.source).collect();
        assert_eq!(ids, vec![SourceId(0), SourceId(3)]);
        assert_eq!(report.per_source[1].tally.total_ground_truth, 3);
        assert_abs_diff_eq!(report.per_source[1].ratio, 0.0);
    }

    #[test]
    fn invalid_pass_threshold_rejected() {
        let cfg = EvaluatorConfig {
            pass_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            KpiEvaluator::new(cfg),
            Err(KpiError::InvalidThreshold { name: "pass_threshold", .. })
        ));
    }

    #[test]
    fn config_from_json_uses_defaults() {
        let cfg: EvaluatorConfig =
            serde_json::from_str(r#"{"association":{"max_radius":0.3}}"#).unwrap();
        assert_eq!(cfg.pass_threshold, 0.9);
        assert_eq!(cfg.ratio_basis, RatioBasis::Detections);
        assert!(cfg.validate().is_ok());
    }
}
