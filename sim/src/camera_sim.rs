//! Camera detection simulator.
//!
//! Generates one detection frame per tick from all cameras with:
//! - Uniform position noise on every point
//! - Miss probability (1 - P_D)
//! - Poisson clutter (false positives) inside the camera's field of view

use crate::landmark::{Landmark, LandmarkKind};
use kpi_core::geometry::{Geometry, Point2D, Polygon, Segment};
use kpi_core::types::{DetectionFrame, DetectionRecord, SourceId, Timestamp};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Detector characteristics of one camera.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CameraParams {
    /// Probability of detecting a visible landmark
    pub p_detection: f64,
    /// Half-width of the uniform noise added to every point (m)
    pub position_noise: f64,
    /// Mean number of false detections per frame
    pub lambda_clutter: f64,
    /// Coverage in the ego frame: [x_min, x_max, y_min, y_max]
    pub fov: [f64; 4],
}

impl CameraParams {
    /// Perfect detector over `fov`: no noise, no misses, no clutter.
    pub fn ideal(fov: [f64; 4]) -> Self {
        Self {
            p_detection: 1.0,
            position_noise: 0.0,
            lambda_clutter: 0.0,
            fov,
        }
    }

    /// Half-open coverage test so adjacent cameras never both see a point.
    pub fn sees(&self, p: &Point2D) -> bool {
        let [x0, x1, y0, y1] = self.fov;
        p.x >= x0 && p.x < x1 && p.y >= y0 && p.y < y1
    }
}

/// One configured camera.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimCamera {
    pub id: SourceId,
    pub params: CameraParams,
}

impl SimCamera {
    pub fn new(id: u32, params: CameraParams) -> Self {
        Self {
            id: SourceId(id),
            params,
        }
    }
}

/// Generates detection frames from a set of landmarks.
pub struct CameraSimulator {
    pub cameras: Vec<SimCamera>,
    /// Shape of the false positives
    pub clutter_kind: LandmarkKind,
    rng: ChaCha8Rng,
}

impl CameraSimulator {
    pub fn new(cameras: Vec<SimCamera>, clutter_kind: LandmarkKind, seed: u64) -> Self {
        Self {
            cameras,
            clutter_kind,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Detections of all cameras for the ego position `ego` at sim time `t`.
    pub fn generate_frame(
        &mut self,
        landmarks: &[Landmark],
        ego: &Point2D,
        t: f64,
        timestamp: Timestamp,
    ) -> DetectionFrame {
        let mut detections = Vec::new();

        for cam in &self.cameras {
            // True detections
            for lm in landmarks {
                if !lm.is_active(t) {
                    continue;
                }
                let geometry = lm.in_ego_frame(ego);
                if !cam.params.sees(&geometry.representative_point()) {
                    continue;
                }
                if self.rng.gen::<f64>() > cam.params.p_detection {
                    continue;
                }
                match perturb(&mut self.rng, &geometry, cam.params.position_noise) {
                    Ok(noisy) => detections.push(DetectionRecord {
                        timestamp,
                        source: cam.id,
                        geometry: noisy,
                        confidence: Some(0.6 + 0.4 * self.rng.gen::<f64>()),
                    }),
                    Err(e) => trace!(landmark = lm.id, %e, "noisy detection dropped"),
                }
            }

            // Clutter: Poisson sample by multiplying uniforms until < e^{-λ}
            let lambda = cam.params.lambda_clutter;
            let n_clutter = if lambda <= 0.0 {
                0usize
            } else {
                let mut n = 0usize;
                let threshold = (-lambda).exp();
                let mut prod = self.rng.gen::<f64>();
                while prod > threshold && n < 50 {
                    prod *= self.rng.gen::<f64>();
                    n += 1;
                }
                n
            };
            for _ in 0..n_clutter {
                let [x0, x1, y0, y1] = cam.params.fov;
                let cx = x0 + (x1 - x0) * self.rng.gen::<f64>();
                let cy = y0 + (y1 - y0) * self.rng.gen::<f64>();
                if let Ok(geometry) = clutter_shape(self.clutter_kind, cx, cy) {
                    detections.push(DetectionRecord {
                        timestamp,
                        source: cam.id,
                        geometry,
                        confidence: Some(0.1 + 0.5 * self.rng.gen::<f64>()),
                    });
                }
            }
        }

        DetectionFrame {
            timestamp,
            detections,
        }
    }
}

fn jitter(rng: &mut ChaCha8Rng, p: Point2D, half_width: f64) -> Point2D {
    Point2D::new(
        p.x + (rng.gen::<f64>() * 2.0 - 1.0) * half_width,
        p.y + (rng.gen::<f64>() * 2.0 - 1.0) * half_width,
    )
}

/// Add point noise; fails only if the noise collapses the shape.
fn perturb(rng: &mut ChaCha8Rng, g: &Geometry, half_width: f64) -> kpi_core::Result<Geometry> {
    if half_width <= 0.0 {
        return Ok(g.clone());
    }
    match g {
        Geometry::Segment(s) => {
            let a = jitter(rng, s.start(), half_width);
            let b = jitter(rng, s.end(), half_width);
            Segment::new(a, b).map(Geometry::from)
        }
        Geometry::Polygon(p) => {
            let vertices = p
                .vertices()
                .iter()
                .map(|v| jitter(rng, *v, half_width))
                .collect();
            Polygon::new(vertices).map(Geometry::from)
        }
    }
}

/// A false detection centred on (cx, cy), shaped like the scene's landmarks.
fn clutter_shape(kind: LandmarkKind, cx: f64, cy: f64) -> kpi_core::Result<Geometry> {
    match kind {
        LandmarkKind::Slot => Polygon::new(vec![
            Point2D::new(cx - 1.25, cy - 2.5),
            Point2D::new(cx + 1.25, cy - 2.5),
            Point2D::new(cx + 1.25, cy + 2.5),
            Point2D::new(cx - 1.25, cy + 2.5),
        ])
        .map(Geometry::from),
        LandmarkKind::Delimiter => Segment::from_coords(cx, cy - 2.5, cx, cy + 2.5).map(Geometry::from),
        LandmarkKind::WheelStopper => {
            Segment::from_coords(cx - 0.8, cy, cx + 0.8, cy).map(Geometry::from)
        }
    }
}
