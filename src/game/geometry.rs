//! 2D vector and scalar helpers used by the physics step

use std::ops::{Add, AddAssign, Mul, Sub};

/// A 2D vector in field units
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Vec2) -> f32 {
        (self - other).length()
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Unit vector in the same direction, or `None` for the zero vector and
    /// non-finite input.
    ///
    /// Components are scaled by the larger magnitude first, so vectors near
    /// `f32::MAX` still normalize instead of overflowing the length.
    pub fn normalized(self) -> Option<Vec2> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return None;
        }
        let scale = self.x.abs().max(self.y.abs());
        if scale == 0.0 {
            return None;
        }
        let unit = Vec2::new(self.x / scale, self.y / scale);
        let len = unit.length();
        Some(Vec2::new(unit.x / len, unit.y / len))
    }

    /// Zero each component whose magnitude is below `epsilon`
    pub fn snap_small(self, epsilon: f32) -> Vec2 {
        Vec2::new(snap(self.x, epsilon), snap(self.y, epsilon))
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;

    fn mul(self, scalar: f32) -> Vec2 {
        Vec2::new(self.x * scalar, self.y * scalar)
    }
}

/// Clamp `value` into `[min, max]`
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    value.max(min).min(max)
}

fn snap(value: f32, epsilon: f32) -> f32 {
    if value.abs() < epsilon {
        0.0
    } else {
        value
    }
}

/// Round to `places` decimal digits for the wire
pub fn round_to(value: f32, places: i32) -> f32 {
    let factor = 10f32.powi(places);
    (value * factor).round() / factor
}
