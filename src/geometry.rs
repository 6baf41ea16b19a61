//! 2D geometry for the calibration pipeline.
//!
//! Camera space and display space use distinct point types. The only
//! camera-to-display conversion in the system is a `CalibrationMap` lookup;
//! nothing else may mix the two spaces.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Neg, Sub};

pub(crate) const EPS: f64 = 1e-9;

/// A point on the camera's pixel grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPoint {
    pub x: f64,
    pub y: f64,
}

impl CameraPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn to_vec(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }
}

/// A point on the projected display surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayPoint {
    pub x: f64,
    pub y: f64,
}

impl DisplayPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Plain 2D vector shared by the line-fitting math of both spaces.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn norm_sq(self) -> f64 {
        self.dot(self)
    }

    pub fn norm(self) -> f64 {
        self.norm_sq().sqrt()
    }

    pub fn scale(self, k: f64) -> Vec2 {
        Vec2::new(self.x * k, self.y * k)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, other: Vec2) -> Vec2 {
        Vec2::new(self.x - other.x, self.y - other.y)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;

    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// A line in parametric form: `origin + t * dir`.
#[derive(Debug, Clone, Copy)]
pub struct Line {
    pub origin: Vec2,
    pub dir: Vec2,
}

impl Line {
    pub fn new(origin: Vec2, dir: Vec2) -> Self {
        Self { origin, dir }
    }

    /// Line through two points, directed from `a` to `b`.
    pub fn through(a: Vec2, b: Vec2) -> Self {
        Self {
            origin: a,
            dir: b - a,
        }
    }

    /// Intersection with another line. `None` when the directions are
    /// parallel (including zero-length directions).
    pub fn intersect(self, other: Line) -> Option<Vec2> {
        let det = self.dir.x * other.dir.y - self.dir.y * other.dir.x;
        if det.abs() < EPS {
            return None;
        }
        let diff = other.origin - self.origin;
        let t = (diff.x * other.dir.y - diff.y * other.dir.x) / det;
        Some(self.origin + self.dir.scale(t))
    }

    /// Foot of the perpendicular from `p` onto this line. `None` for a
    /// degenerate (zero-length) direction.
    pub fn project(self, p: Vec2) -> Option<Vec2> {
        let len_sq = self.dir.norm_sq();
        if len_sq < EPS {
            return None;
        }
        let t = (p - self.origin).dot(self.dir) / len_sq;
        Some(self.origin + self.dir.scale(t))
    }
}

/// Axis-aligned bounding box (origin + size) in display space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Half-open containment: `[x, x + width) x [y, y + height)`.
    pub fn contains(&self, p: DisplayPoint) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }
}
