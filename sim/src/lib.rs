//! `sim` — Parking scenario simulator: landmark layouts, camera detections,
//! recordings.

pub mod camera_sim;
pub mod landmark;
pub mod recording;
pub mod scenarios;

pub use camera_sim::{CameraParams, CameraSimulator, SimCamera};
pub use landmark::{EgoMotion, Landmark, LandmarkKind};
pub use recording::{
    index_ground_truth, load_ground_truth, load_recording, save_ground_truth, save_recording,
    Recording,
};
pub use scenarios::{Scenario, ScenarioKind};
