//! Static parking landmarks (slots, delimiter lines, wheel stoppers) and the
//! ego vehicle driving past them.
//!
//! Landmarks live in the world frame. Detections and ground truth are
//! expressed in the ego frame, so every sample shifts the landmark by the
//! current ego position.

use kpi_core::geometry::{Geometry, Point2D, Polygon, Segment};
use kpi_core::Result;
use serde::{Deserialize, Serialize};

/// What a landmark represents (used for clutter shape and logging).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LandmarkKind {
    Slot,
    Delimiter,
    WheelStopper,
}

/// A static landmark with ground-truth geometry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Landmark {
    pub id: u64,
    pub kind: LandmarkKind,
    /// Geometry in the world frame
    pub geometry: Geometry,
    /// Optional: landmark only exists after this time (s), e.g. painted late
    pub appear_at: Option<f64>,
    /// Optional: landmark vanishes at this time (s), e.g. occluded by a car
    pub disappear_at: Option<f64>,
}

impl Landmark {
    /// True if the landmark exists at time `t`.
    pub fn is_active(&self, t: f64) -> bool {
        if let Some(appear) = self.appear_at {
            if t < appear {
                return false;
            }
        }
        if let Some(disappear) = self.disappear_at {
            if t >= disappear {
                return false;
            }
        }
        true
    }

    /// Geometry seen from an ego vehicle at `ego` (axis-aligned ego frame).
    pub fn in_ego_frame(&self, ego: &Point2D) -> Geometry {
        self.geometry.translated(&(-ego.coords))
    }
}

/// Ego vehicle moving along +x at constant speed.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EgoMotion {
    pub start: [f64; 2],
    /// m/s
    pub speed: f64,
}

impl EgoMotion {
    pub fn position(&self, t: f64) -> Point2D {
        Point2D::new(self.start[0] + self.speed * t, self.start[1])
    }
}

// ---------------------------------------------------------------------------
// Layout helpers
// ---------------------------------------------------------------------------

/// Perpendicular slot with its road-side edge on `y = road_y`, extending
/// away from the road (towards +y when `left`, -y otherwise).
pub fn perpendicular_slot(
    x: f64,
    road_y: f64,
    width: f64,
    depth: f64,
    left: bool,
) -> Result<Polygon> {
    let far_y = if left { road_y + depth } else { road_y - depth };
    // Road-side edge first; keep the winding counter-clockwise on both sides
    let vertices = if left {
        vec![
            Point2D::new(x, road_y),
            Point2D::new(x + width, road_y),
            Point2D::new(x + width, far_y),
            Point2D::new(x, far_y),
        ]
    } else {
        vec![
            Point2D::new(x + width, road_y),
            Point2D::new(x, road_y),
            Point2D::new(x, far_y),
            Point2D::new(x + width, far_y),
        ]
    };
    Polygon::new(vertices)
}

pub fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Result<Segment> {
    Segment::from_coords(x0, y0, x1, y1)
}
