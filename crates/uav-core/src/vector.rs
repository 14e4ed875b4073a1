//! Fixed-size 3D vector used for positions and velocities.
//!
//! Axes are local Cartesian meters: `x` east, `y` north, `z` altitude.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};

/// Below this length a vector is treated as zero when normalizing.
const NORMALIZE_EPSILON: f64 = 1e-9;

/// A 3-component vector (meters or meters/second).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Length of the horizontal (x, y) component.
    pub fn horizontal_norm(self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Unit vector in the same direction, or `None` for a (near) zero vector.
    pub fn normalized(self) -> Option<Vec3> {
        let n = self.norm();
        if n > NORMALIZE_EPSILON && n.is_finite() {
            Some(self / n)
        } else {
            None
        }
    }

    /// Rescale to the given length, or `None` for a (near) zero vector.
    pub fn with_length(self, length: f64) -> Option<Vec3> {
        self.normalized().map(|unit| unit * length)
    }

    /// Horizontal vector perpendicular to this one: `(-y, x, 0)`.
    pub fn horizontal_perpendicular(self) -> Vec3 {
        Vec3::new(-self.y, self.x, 0.0)
    }

    pub fn distance_to(self, other: Vec3) -> f64 {
        (self - other).norm()
    }

    pub fn midpoint(self, other: Vec3) -> Vec3 {
        (self + other) / 2.0
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Compass-free heading in degrees, `atan2(y, x)`.
    pub fn heading_deg(self) -> f64 {
        self.y.atan2(self.x).to_degrees()
    }

    /// Clamp the length to `max_len`, keeping direction.
    pub fn clamp_length(self, max_len: f64) -> Vec3 {
        let n = self.norm();
        if n > max_len && n > NORMALIZE_EPSILON {
            self * (max_len / n)
        } else {
            self
        }
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

impl From<(f64, f64, f64)> for Vec3 {
    fn from(v: (f64, f64, f64)) -> Self {
        Vec3::new(v.0, v.1, v.2)
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl SubAssign for Vec3 {
    fn sub_assign(&mut self, rhs: Vec3) {
        *self = *self - rhs;
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl MulAssign<f64> for Vec3 {
    fn mul_assign(&mut self, rhs: f64) {
        *self = *self * rhs;
    }
}

impl Div<f64> for Vec3 {
    type Output = Vec3;
    fn div(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_zero_vector_is_none() {
        assert!(Vec3::ZERO.normalized().is_none());
        assert!(Vec3::new(1e-12, 0.0, 0.0).normalized().is_none());
    }

    #[test]
    fn test_normalize_unit_length() {
        let unit = Vec3::new(3.0, 4.0, 0.0).normalized().unwrap();
        assert!((unit.norm() - 1.0).abs() < 1e-12);
        assert!((unit.x - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_horizontal_perpendicular_is_orthogonal() {
        let v = Vec3::new(2.0, -7.0, 5.0);
        let p = v.horizontal_perpendicular();
        assert_eq!(p.z, 0.0);
        assert!((p.x * v.x + p.y * v.y).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_length() {
        let v = Vec3::new(10.0, 0.0, 0.0).clamp_length(4.0);
        assert!((v.x - 4.0).abs() < 1e-12);
        let short = Vec3::new(1.0, 1.0, 0.0);
        assert_eq!(short.clamp_length(4.0), short);
    }

    #[test]
    fn test_serializes_as_array() {
        let json = serde_json::to_string(&Vec3::new(1.0, 2.5, -3.0)).unwrap();
        assert_eq!(json, "[1.0,2.5,-3.0]");
        let back: Vec3 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Vec3::new(1.0, 2.5, -3.0));
    }
}
