//! `kpi_core` — Ground-truth association and true/false-positive
//! classification for parking perception KPIs.
//!
//! # Module layout
//! - [`types`]       — Fundamental types (source IDs, detection / ground-truth frames)
//! - [`geometry`]    — Points, segments, slot polygons, distances and angles
//! - [`timestamp`]   — Nearest-timestamp ground-truth lookup
//! - [`gating`]      — Cost metrics and radius / orientation gate
//! - [`association`] — Greedy and Hungarian assignment, TP/FP/FN per frame
//! - [`metrics`]     — Tallies folded over frames, overall and per source
//! - [`evaluator`]   — Full KPI step over a recording, with verdict
//! - [`error`]       — Error type

pub mod association;
pub mod error;
pub mod evaluator;
pub mod gating;
pub mod geometry;
pub mod metrics;
pub mod timestamp;
pub mod types;

pub use association::{
    Association, AssociationConfig, AssociationPolicy, AssociationResult, Associator, RatioBasis,
};
pub use error::{KpiError, Result};
pub use evaluator::{EvaluatorConfig, KpiEvaluator, KpiReport, Verdict};
pub use geometry::{Geometry, Point2D, Polygon, Segment};
pub use metrics::{ClassificationAggregator, ClassificationTally, FrameResult};
pub use timestamp::GroundTruthIndex;
pub use types::{DetectionFrame, DetectionRecord, GroundTruthFrame, SourceId, Timestamp};
