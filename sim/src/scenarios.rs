//! Scenario definitions.
//!
//! Each scenario is a parking lot layout, an ego drive past it and a set of
//! surround-view cameras. All scenarios are deterministic given the same seed.

use crate::{
    camera_sim::{CameraParams, CameraSimulator, SimCamera},
    landmark::{line, perpendicular_slot, EgoMotion, Landmark, LandmarkKind},
    recording::Recording,
};
use kpi_core::association::AssociationConfig;
use kpi_core::types::{GroundTruthFrame, Timestamp};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// Two rows of perpendicular slots, 4 cameras, low clutter
    Slots,
    /// Parking-course lines between the slots of both rows
    Delimiters,
    /// One wheel stopper per slot
    WheelStoppers,
    /// Slots that appear / disappear mid-drive (parked cars leaving, arriving)
    Occlusion,
    /// Dense lines, noisy cameras, heavy clutter
    Crowded,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub kind: ScenarioKind,
    pub seed: u64,
    /// seconds
    pub duration: f64,
    /// Detection frame period (s)
    pub frame_period: f64,
    /// Ground-truth sampling period (s)
    pub gt_period: f64,
    /// Time of the first ground-truth sample (s)
    pub gt_phase: f64,
    pub ego: EgoMotion,
    pub landmarks: Vec<Landmark>,
    pub cameras: Vec<SimCamera>,
}

/// Seconds → recording timestamp (µs).
pub fn to_timestamp(t: f64) -> Timestamp {
    (t * 1e6).round().max(0.0) as Timestamp
}

const SLOT_WIDTH: f64 = 2.5;
const SLOT_DEPTH: f64 = 5.0;
const SLOT_PITCH: f64 = 2.7;
const ROAD_HALF_WIDTH: f64 = 2.0;

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> anyhow::Result<Self> {
        let (name, landmarks, cameras) = match kind {
            ScenarioKind::Slots => ("slots", slot_rows(12, None)?, surround_cameras(0.95, 0.05, 0.1)),
            ScenarioKind::Delimiters => (
                "delimiters",
                delimiter_rows(13, SLOT_PITCH)?,
                surround_cameras(0.95, 0.05, 0.1),
            ),
            ScenarioKind::WheelStoppers => (
                "wheel_stoppers",
                wheel_stoppers(12)?,
                surround_cameras(0.9, 0.05, 0.1),
            ),
            ScenarioKind::Occlusion => (
                "occlusion",
                slot_rows(12, Some(seed))?,
                surround_cameras(0.95, 0.05, 0.1),
            ),
            ScenarioKind::Crowded => (
                "crowded",
                delimiter_rows(25, SLOT_PITCH / 2.0)?,
                surround_cameras(0.8, 0.15, 2.0),
            ),
        };

        Ok(Scenario {
            name: name.into(),
            kind,
            seed,
            duration: 20.0,
            frame_period: 1.0 / 30.0,
            gt_period: 0.1,
            gt_phase: 0.0,
            ego: EgoMotion {
                start: [-10.0, 0.0],
                speed: 2.0,
            },
            landmarks,
            cameras,
        })
    }

    /// Shape the scenario's false positives take.
    pub fn landmark_kind(&self) -> LandmarkKind {
        match self.kind {
            ScenarioKind::Slots | ScenarioKind::Occlusion => LandmarkKind::Slot,
            ScenarioKind::Delimiters | ScenarioKind::Crowded => LandmarkKind::Delimiter,
            ScenarioKind::WheelStoppers => LandmarkKind::WheelStopper,
        }
    }

    /// Association preset matching the landmark type.
    pub fn association_config(&self) -> AssociationConfig {
        match self.landmark_kind() {
            LandmarkKind::Slot => AssociationConfig::parking_slot(),
            LandmarkKind::Delimiter => AssociationConfig::pcl(),
            LandmarkKind::WheelStopper => AssociationConfig::wheel_stopper(),
        }
    }

    /// Replace every camera with a perfect one over the same field of view.
    pub fn with_ideal_cameras(mut self) -> Self {
        for cam in &mut self.cameras {
            cam.params = CameraParams::ideal(cam.params.fov);
        }
        self
    }

    /// Ground truth at time `t`: active landmarks inside the camera coverage.
    fn ground_truth_at(&self, t: f64) -> GroundTruthFrame {
        let ego = self.ego.position(t);
        let geometries = self
            .landmarks
            .iter()
            .filter(|lm| lm.is_active(t))
            .map(|lm| lm.in_ego_frame(&ego))
            .filter(|g| {
                let rep = g.representative_point();
                self.cameras.iter().any(|c| c.params.sees(&rep))
            })
            .collect();
        GroundTruthFrame {
            timestamp: to_timestamp(t),
            geometries,
        }
    }

    /// Drive the ego past the layout and record detections + ground truth.
    pub fn record(&self) -> Recording {
        let mut sim = CameraSimulator::new(self.cameras.clone(), self.landmark_kind(), self.seed);

        let n_frames = (self.duration / self.frame_period).floor() as u64;
        let frames = (0..n_frames)
            .map(|i| {
                let t = i as f64 * self.frame_period;
                sim.generate_frame(&self.landmarks, &self.ego.position(t), t, to_timestamp(t))
            })
            .collect::<Vec<_>>();

        let n_gt = ((self.duration - self.gt_phase) / self.gt_period).floor().max(0.0) as u64;
        let ground_truth = (0..n_gt)
            .map(|j| self.ground_truth_at(self.gt_phase + j as f64 * self.gt_period))
            .collect::<Vec<_>>();

        info!(
            scenario = %self.name,
            seed = self.seed,
            frames = frames.len(),
            gt_frames = ground_truth.len(),
            "scenario recorded"
        );

        Recording {
            scenario_name: self.name.clone(),
            seed: self.seed,
            frames,
            ground_truth,
        }
    }
}

// ---------------------------------------------------------------------------
// Builder helpers
// ---------------------------------------------------------------------------

/// Front, rear, left and right cameras with disjoint coverage.
fn surround_cameras(p_detection: f64, position_noise: f64, lambda_clutter: f64) -> Vec<SimCamera> {
    let fovs = [
        [5.0, 15.0, -10.0, 10.0],  // front
        [-15.0, -5.0, -10.0, 10.0], // rear
        [-5.0, 5.0, 0.0, 10.0],    // left
        [-5.0, 5.0, -10.0, 0.0],   // right
    ];
    fovs.iter()
        .enumerate()
        .map(|(i, fov)| {
            SimCamera::new(
                i as u32,
                CameraParams {
                    p_detection,
                    position_noise,
                    lambda_clutter,
                    fov: *fov,
                },
            )
        })
        .collect()
}

/// `n` slots on each side of the road. With `occlusion_seed`, a third of
/// the slots get a random appear / disappear time.
fn slot_rows(n: usize, occlusion_seed: Option<u64>) -> anyhow::Result<Vec<Landmark>> {
    let mut rng = occlusion_seed.map(|s| ChaCha8Rng::seed_from_u64(s.wrapping_add(1)));
    let mut landmarks = Vec::with_capacity(2 * n);
    for (side, left) in [(0u64, true), (1u64, false)] {
        let road_y = if left { ROAD_HALF_WIDTH } else { -ROAD_HALF_WIDTH };
        for i in 0..n {
            let slot = perpendicular_slot(i as f64 * SLOT_PITCH, road_y, SLOT_WIDTH, SLOT_DEPTH, left)?;
            let id = side * n as u64 + i as u64;
            let (appear_at, disappear_at) = match rng.as_mut() {
                Some(rng) if i % 3 == 0 => {
                    let t = 2.0 + rng.gen::<f64>() * 14.0;
                    if rng.gen::<bool>() {
                        (Some(t), None)
                    } else {
                        (None, Some(t))
                    }
                }
                _ => (None, None),
            };
            landmarks.push(Landmark {
                id,
                kind: LandmarkKind::Slot,
                geometry: slot.into(),
                appear_at,
                disappear_at,
            });
        }
    }
    Ok(landmarks)
}

/// `n` parking-course lines per side, `pitch` meters apart.
fn delimiter_rows(n: usize, pitch: f64) -> anyhow::Result<Vec<Landmark>> {
    let mut landmarks = Vec::with_capacity(2 * n);
    for (side, sign) in [(0u64, 1.0), (1u64, -1.0)] {
        for i in 0..n {
            let x = i as f64 * pitch - 0.1;
            let y0 = sign * ROAD_HALF_WIDTH;
            let y1 = sign * (ROAD_HALF_WIDTH + SLOT_DEPTH);
            landmarks.push(Landmark {
                id: side * n as u64 + i as u64,
                kind: LandmarkKind::Delimiter,
                geometry: line(x, y0, x, y1)?.into(),
                appear_at: None,
                disappear_at: None,
            });
        }
    }
    Ok(landmarks)
}

/// One 1.6 m wheel stopper near the back of every slot.
fn wheel_stoppers(n: usize) -> anyhow::Result<Vec<Landmark>> {
    let mut landmarks = Vec::with_capacity(2 * n);
    for (side, sign) in [(0u64, 1.0), (1u64, -1.0)] {
        for i in 0..n {
            let x = i as f64 * SLOT_PITCH + 0.45;
            let y = sign * (ROAD_HALF_WIDTH + SLOT_DEPTH - 0.5);
            landmarks.push(Landmark {
                id: side * n as u64 + i as u64,
                kind: LandmarkKind::WheelStopper,
                geometry: line(x, y, x + 1.6, y)?.into(),
                appear_at: None,
                disappear_at: None,
            });
        }
    }
    Ok(landmarks)
}
