//! Geometric primitives: points, segments, polygons (parking slots).
//!
//! Segments and polygons are validated when they are built (and when they are
//! deserialized), so every distance / angle function below is total on the
//! values it receives.
//!
//! # Vertex order
//! For a [`Polygon`] describing a parking slot, the edge between vertex 0 and
//! vertex 1 is the **road-side edge**. Slot orientation and the orientation
//! gate in association are both derived from that edge.

use crate::error::{KpiError, Result};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 2D point in the vehicle / world frame (meters).
pub type Point2D = Point2<f64>;

/// 2D direction / offset vector.
pub type Vec2 = Vector2<f64>;

/// Segments shorter than this are rejected as degenerate.
pub const MIN_SEGMENT_LENGTH: f64 = 1e-9;

/// Relative tolerance used by [`segment_intersection`] for parallel tests and
/// for accepting intersections that land exactly on an endpoint.
const INTERSECTION_EPS: f64 = 1e-12;

fn cross(a: &Vec2, b: &Vec2) -> f64 {
    a.x * b.y - a.y * b.x
}

fn check_finite(p: &Point2D) -> Result<()> {
    if p.x.is_finite() && p.y.is_finite() {
        Ok(())
    } else {
        Err(KpiError::degenerate(format!(
            "non-finite coordinate ({}, {})",
            p.x, p.y
        )))
    }
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// A line segment: delimiter, wheel-stopper edge or slot boundary edge.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSegment", into = "RawSegment")]
pub struct Segment {
    points: [Point2D; 2],
}

#[derive(Clone, Serialize, Deserialize)]
struct RawSegment {
    start: Point2D,
    end: Point2D,
}

impl TryFrom<RawSegment> for Segment {
    type Error = KpiError;

    fn try_from(raw: RawSegment) -> Result<Self> {
        Segment::new(raw.start, raw.end)
    }
}

impl From<Segment> for RawSegment {
    fn from(seg: Segment) -> Self {
        Self {
            start: seg.start(),
            end: seg.end(),
        }
    }
}

impl Segment {
    /// Build a segment. Fails on non-finite or coincident endpoints.
    pub fn new(start: Point2D, end: Point2D) -> Result<Self> {
        check_finite(&start)?;
        check_finite(&end)?;
        let len = (end - start).norm();
        if len < MIN_SEGMENT_LENGTH {
            return Err(KpiError::degenerate(format!(
                "zero-length segment at ({}, {})",
                start.x, start.y
            )));
        }
        Ok(Self {
            points: [start, end],
        })
    }

    /// Convenience constructor from raw coordinates.
    pub fn from_coords(x0: f64, y0: f64, x1: f64, y1: f64) -> Result<Self> {
        Self::new(Point2D::new(x0, y0), Point2D::new(x1, y1))
    }

    pub fn start(&self) -> Point2D {
        self.points[0]
    }

    pub fn end(&self) -> Point2D {
        self.points[1]
    }

    /// Both endpoints, start first.
    pub fn points(&self) -> &[Point2D] {
        &self.points
    }

    /// Direction vector `end - start` (never zero).
    pub fn direction(&self) -> Vec2 {
        self.end() - self.start()
    }

    pub fn length(&self) -> f64 {
        self.direction().norm()
    }

    pub fn midpoint(&self) -> Point2D {
        Point2D::from((self.start().coords + self.end().coords) * 0.5)
    }

    /// Heading of the segment in radians, `(-π, π]`.
    pub fn heading(&self) -> f64 {
        let d = self.direction();
        d.y.atan2(d.x)
    }

    /// Shift the segment by `offset`. Translation keeps the length, so the
    /// result is still valid.
    pub fn translated(&self, offset: &Vec2) -> Self {
        Self {
            points: [self.points[0] + offset, self.points[1] + offset],
        }
    }
}

// ---------------------------------------------------------------------------
// Polygon
// ---------------------------------------------------------------------------

/// Ordered polygon, typically a parking slot with 4 corners.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolygon", into = "RawPolygon")]
pub struct Polygon {
    vertices: Vec<Point2D>,
}

#[derive(Clone, Serialize, Deserialize)]
struct RawPolygon {
    vertices: Vec<Point2D>,
}

impl TryFrom<RawPolygon> for Polygon {
    type Error = KpiError;

    fn try_from(raw: RawPolygon) -> Result<Self> {
        Polygon::new(raw.vertices)
    }
}

impl From<Polygon> for RawPolygon {
    fn from(poly: Polygon) -> Self {
        Self {
            vertices: poly.vertices,
        }
    }
}

impl Polygon {
    /// Build a polygon from ordered vertices. At least 3 vertices, all
    /// finite, and no zero-length edge (closing edge included).
    pub fn new(vertices: Vec<Point2D>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(KpiError::degenerate(format!(
                "polygon needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        for v in &vertices {
            check_finite(v)?;
        }
        let n = vertices.len();
        for i in 0..n {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            if (b - a).norm() < MIN_SEGMENT_LENGTH {
                return Err(KpiError::degenerate(format!(
                    "polygon edge {i}->{} has zero length",
                    (i + 1) % n
                )));
            }
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[Point2D] {
        &self.vertices
    }

    /// Edge `i` runs from vertex `i` to vertex `i + 1` (wrapping).
    pub fn edge(&self, i: usize) -> Segment {
        let n = self.vertices.len();
        Segment {
            points: [self.vertices[i % n], self.vertices[(i + 1) % n]],
        }
    }

    /// All edges, closing edge last.
    pub fn edges(&self) -> impl Iterator<Item = Segment> + '_ {
        (0..self.vertices.len()).map(|i| self.edge(i))
    }

    /// The edge between vertex 0 and vertex 1.
    pub fn road_side_edge(&self) -> Segment {
        self.edge(0)
    }

    /// Vertex centroid (slot center).
    pub fn center(&self) -> Point2D {
        let sum = self
            .vertices
            .iter()
            .fold(Vec2::zeros(), |acc, v| acc + v.coords);
        Point2D::from(sum / self.vertices.len() as f64)
    }

    /// Orientation angle of the slot: heading of the road-side edge.
    pub fn orientation(&self) -> f64 {
        self.road_side_edge().heading()
    }

    /// Even-odd point-in-polygon test. Points on the boundary may fall on
    /// either side.
    pub fn contains(&self, p: &Point2D) -> bool {
        let mut inside = false;
        let n = self.vertices.len();
        let mut j = n - 1;
        for i in 0..n {
            let vi = self.vertices[i];
            let vj = self.vertices[j];
            if (vi.y > p.y) != (vj.y > p.y) {
                let x_cross = (vj.x - vi.x) * (p.y - vi.y) / (vj.y - vi.y) + vi.x;
                if p.x < x_cross {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    pub fn translated(&self, offset: &Vec2) -> Self {
        Self {
            vertices: self.vertices.iter().map(|v| v + offset).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry (tagged variant)
// ---------------------------------------------------------------------------

/// Any detected or ground-truth shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Segment(Segment),
    Polygon(Polygon),
}

impl Geometry {
    /// Segment midpoint or polygon center.
    pub fn representative_point(&self) -> Point2D {
        match self {
            Geometry::Segment(s) => s.midpoint(),
            Geometry::Polygon(p) => p.center(),
        }
    }

    /// Defining points: segment endpoints or polygon vertices.
    pub fn points(&self) -> &[Point2D] {
        match self {
            Geometry::Segment(s) => s.points(),
            Geometry::Polygon(p) => p.vertices(),
        }
    }

    /// The segment used for orientation comparisons.
    pub fn orientation_edge(&self) -> Segment {
        match self {
            Geometry::Segment(s) => *s,
            Geometry::Polygon(p) => p.road_side_edge(),
        }
    }

    /// Distance from `p` to the shape (polygon boundary, not area).
    pub fn distance_to(&self, p: &Point2D) -> f64 {
        match self {
            Geometry::Segment(s) => distance_point_to_segment(p, s),
            Geometry::Polygon(poly) => distance_point_to_polygon(p, poly),
        }
    }

    pub fn translated(&self, offset: &Vec2) -> Self {
        match self {
            Geometry::Segment(s) => Geometry::Segment(s.translated(offset)),
            Geometry::Polygon(p) => Geometry::Polygon(p.translated(offset)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Segment(_) => "segment",
            Geometry::Polygon(_) => "polygon",
        }
    }
}

impl From<Segment> for Geometry {
    fn from(s: Segment) -> Self {
        Geometry::Segment(s)
    }
}

impl From<Polygon> for Geometry {
    fn from(p: Polygon) -> Self {
        Geometry::Polygon(p)
    }
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Distance from `p` to the closest point of `seg`. When the perpendicular
/// projection falls outside the segment, the nearest endpoint is used.
pub fn distance_point_to_segment(p: &Point2D, seg: &Segment) -> f64 {
    let d = seg.direction();
    let t = ((p - seg.start()).dot(&d) / d.norm_squared()).clamp(0.0, 1.0);
    let proj = seg.start() + d * t;
    (p - proj).norm()
}

/// Minimum distance from `p` to any polygon edge.
pub fn distance_point_to_polygon(p: &Point2D, polygon: &Polygon) -> f64 {
    polygon
        .edges()
        .map(|e| distance_point_to_segment(p, &e))
        .fold(f64::INFINITY, f64::min)
}

/// Intersection point of two segments, or `None` when they are parallel
/// (collinear overlaps included) or do not meet.
pub fn segment_intersection(a: &Segment, b: &Segment) -> Option<Point2D> {
    let r = a.direction();
    let s = b.direction();
    let denom = cross(&r, &s);
    if denom.abs() <= INTERSECTION_EPS * r.norm() * s.norm() {
        return None;
    }
    let qp = b.start() - a.start();
    let t = cross(&qp, &s) / denom;
    let u = cross(&qp, &r) / denom;
    let eps = 1e-9;
    if (-eps..=1.0 + eps).contains(&t) && (-eps..=1.0 + eps).contains(&u) {
        Some(a.start() + r * t.clamp(0.0, 1.0))
    } else {
        None
    }
}

/// Unsigned angle between the direction vectors of two segments, `[0, π]`.
pub fn angle_between(a: &Segment, b: &Segment) -> f64 {
    let da = a.direction();
    let db = b.direction();
    let cos = (da.dot(&db) / (da.norm() * db.norm())).clamp(-1.0, 1.0);
    cos.acos()
}

/// Orientation difference between two undirected lines, `[0, π/2]`.
/// A delimiter drawn end-to-start is the same line as one drawn start-to-end.
pub fn line_angle(a: &Segment, b: &Segment) -> f64 {
    let angle = angle_between(a, b);
    angle.min(PI - angle)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
