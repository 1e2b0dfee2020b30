//! World-space geometry primitives.
//!
//! Conventions follow the scene services the kernel talks to: Y is up, a
//! pose's forward axis is +Z, and yaw rotates +Z towards +X.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const ZERO: Point3 = Point3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const UP: Point3 = Point3 {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Point3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Point3) -> f32 {
        (self - other).length()
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    pub fn normalized(self) -> Point3 {
        let len = self.length();
        if len <= f32::EPSILON {
            Point3::ZERO
        } else {
            self * (1.0 / len)
        }
    }

    /// Linear interpolation with `t` clamped to `0..=1`.
    pub fn lerp(self, target: Point3, t: f32) -> Point3 {
        let t = t.clamp(0.0, 1.0);
        self + (target - self) * t
    }
}

impl Add for Point3 {
    type Output = Point3;

    fn add(self, rhs: Point3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Point3 {
    type Output = Point3;

    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Point3 {
    type Output = Point3;

    fn mul(self, rhs: f32) -> Point3 {
        Point3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Result of projecting a screen point into the world.
///
/// Missing a surface is an ordinary outcome, so it is carried as a variant
/// through decode and classification instead of an error.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WorldHit {
    Hit(Point3),
    Miss,
}

impl WorldHit {
    pub fn position(self) -> Option<Point3> {
        match self {
            WorldHit::Hit(point) => Some(point),
            WorldHit::Miss => None,
        }
    }

    pub fn is_hit(self) -> bool {
        matches!(self, WorldHit::Hit(_))
    }

    /// Distance to `origin`; a miss is infinitely far away.
    pub fn distance_from(self, origin: Point3) -> f32 {
        match self {
            WorldHit::Hit(point) => point.distance(origin),
            WorldHit::Miss => f32::INFINITY,
        }
    }
}

impl From<Option<Point3>> for WorldHit {
    fn from(value: Option<Point3>) -> Self {
        value.map_or(WorldHit::Miss, WorldHit::Hit)
    }
}

/// Position plus heading. Zones and anchors are treated as lying flat, so
/// only rotation about the vertical axis is kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point3,
    pub yaw_deg: f32,
}

impl Pose {
    pub fn new(position: Point3, yaw_deg: f32) -> Self {
        Self { position, yaw_deg }
    }

    pub fn transform_point(&self, local: Point3) -> Point3 {
        let (sin, cos) = self.yaw_deg.to_radians().sin_cos();
        let rotated = Point3::new(
            local.x * cos + local.z * sin,
            local.y,
            -local.x * sin + local.z * cos,
        );
        rotated + self.position
    }

    pub fn inverse_transform_point(&self, world: Point3) -> Point3 {
        let (sin, cos) = self.yaw_deg.to_radians().sin_cos();
        let d = world - self.position;
        Point3::new(d.x * cos - d.z * sin, d.y, d.x * sin + d.z * cos)
    }
}

/// Axis-aligned box described by centre and full size.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aabb {
    pub center: Point3,
    pub size: Point3,
}

impl Aabb {
    pub fn new(center: Point3, size: Point3) -> Self {
        Self { center, size }
    }

    pub fn extents(&self) -> Point3 {
        self.size * 0.5
    }

    pub fn has_zero_extent(&self) -> bool {
        let e = self.extents();
        e.x == 0.0 || e.y == 0.0 || e.z == 0.0
    }

    /// Inclusive containment test.
    pub fn contains(&self, point: Point3) -> bool {
        let e = self.extents();
        let d = point - self.center;
        d.x.abs() <= e.x && d.y.abs() <= e.y && d.z.abs() <= e.z
    }
}

/// 2D rectangle in a surface's local plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect2 {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

impl Rect2 {
    pub fn new(x_min: f32, x_max: f32, y_min: f32, y_max: f32) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    pub fn centered(width: f32, height: f32) -> Self {
        Self::new(-width / 2.0, width / 2.0, -height / 2.0, height / 2.0)
    }

    /// Top face of a volume. Volume anchors carry their depth axis flipped
    /// relative to plane anchors, hence the negated Y range.
    pub fn from_volume_top(min: Point3, max: Point3) -> Self {
        Self::new(min.x, max.x, -max.y, -min.y)
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min + self.x_max) * 0.5,
            (self.y_min + self.y_max) * 0.5,
        )
    }
}
