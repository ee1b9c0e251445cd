//! Gating: decides whether a detection is "close enough" to a ground-truth
//! geometry to be considered as a potential association.
//!
//! # Gating criterion
//! cost(det, gt) ≤ max_radius, and, when an angle gate is configured,
//! line_angle(det, gt) ≤ max_angle.
//!
//! The cost is computed by a [`CostMetric`]:
//! - `RepresentativePoint`: ‖rep(det) − rep(gt)‖ (segment midpoint / slot center)
//! - `PointToShape`: mean over det points p of dist(p, gt)

use crate::geometry::{line_angle, Geometry};
use serde::{Deserialize, Serialize};

/// How the association cost between two geometries is measured.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostMetric {
    /// Euclidean distance between representative points.
    RepresentativePoint,
    /// Mean distance of the detection's points to the ground-truth shape.
    #[default]
    PointToShape,
}

impl CostMetric {
    pub fn cost(&self, detection: &Geometry, ground_truth: &Geometry) -> f64 {
        match self {
            CostMetric::RepresentativePoint => {
                (detection.representative_point() - ground_truth.representative_point()).norm()
            }
            CostMetric::PointToShape => {
                let pts = detection.points();
                let sum: f64 = pts.iter().map(|p| ground_truth.distance_to(p)).sum();
                sum / pts.len() as f64
            }
        }
    }
}

/// Result of a gate check for one (ground truth, detection) pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GateResult {
    pub cost: f64,
    /// Undirected orientation difference, only computed with an angle gate
    pub angle: Option<f64>,
    /// True if both the radius and the angle gate pass
    pub passes: bool,
}

/// Radius + optional orientation gate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairGate {
    pub metric: CostMetric,
    pub max_radius: f64,
    pub max_angle: Option<f64>,
}

impl PairGate {
    pub fn check(&self, detection: &Geometry, ground_truth: &Geometry) -> GateResult {
        let cost = self.metric.cost(detection, ground_truth);
        let angle = self.max_angle.map(|_| {
            line_angle(
                &detection.orientation_edge(),
                &ground_truth.orientation_edge(),
            )
        });
        let angle_ok = match (angle, self.max_angle) {
            (Some(a), Some(max)) => a <= max,
            _ => true,
        };
        GateResult {
            cost,
            angle,
            passes: cost <= self.max_radius && angle_ok,
        }
    }
}
