//! Orientation algebra
//!
//! Quaternions are stored as (r, i, j, k). The turtle reads its frame by
//! sandwiching a basis quaternion between the inverse `-q` and `q`:
//! `v = (-q) * basis * q`. Negation here is the inverse of the rotation
//! (imaginary part flipped), and every rotation quaternion the engine builds
//! carries a negated real part to match. Keep the two halves together:
//! switching to the textbook `q * v * q⁻¹` mirrors every heading.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// Below this length a tropism/alignment axis is treated as degenerate
const AXIS_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const X: Self = Self::new(1.0, 0.0, 0.0);
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }

    /// Unit vector, or `None` when too short to have a direction
    pub fn try_normalize(self) -> Option<Self> {
        let len = self.length();
        (len > AXIS_EPSILON).then(|| self / len)
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl Add for Vector3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vector3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vector3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f64> for Vector3 {
    type Output = Self;
    fn div(self, rhs: f64) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vector3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.4}, {:.4}, {:.4})", self.x, self.y, self.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub r: f64,
    pub i: f64,
    pub j: f64,
    pub k: f64,
}

/// Basis quaternions whose sandwiches give heading, up and side
const X_BASIS: Quaternion = Quaternion::new(0.0, 1.0, 0.0, 0.0);
const Y_BASIS: Quaternion = Quaternion::new(0.0, 0.0, 1.0, 0.0);
const Z_BASIS: Quaternion = Quaternion::new(0.0, 0.0, 0.0, 1.0);

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Self = Self::new(1.0, 0.0, 0.0, 0.0);

    /// Half turn about the local z axis, used by `|`
    pub const REVERSE: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(r: f64, i: f64, j: f64, k: f64) -> Self {
        Self { r, i, j, k }
    }

    /// Rotation by `angle` radians about a unit `axis`, in the negated-real
    /// form the rest of the engine expects.
    pub fn from_axis_angle(axis: Vector3, angle: f64) -> Self {
        let (s, c) = (angle / 2.0).sin_cos();
        Self::new(-c, axis.x * s, axis.y * s, axis.z * s)
    }

    /// Heading pointing up the screen: a quarter turn about z
    pub fn upright() -> Self {
        Self::from_axis_angle(Vector3::Z, std::f64::consts::FRAC_PI_2)
    }

    pub fn norm(&self) -> f64 {
        (self.r * self.r + self.i * self.i + self.j * self.j + self.k * self.k).sqrt()
    }

    pub fn normalize(self) -> Self {
        let n = self.norm();
        if n == 0.0 {
            return Self::IDENTITY;
        }
        Self::new(self.r / n, self.i / n, self.j / n, self.k / n)
    }

    pub fn is_unit(&self, tolerance: f64) -> bool {
        (self.norm() - 1.0).abs() <= tolerance
    }

    fn imaginary(self) -> Vector3 {
        Vector3::new(self.i, self.j, self.k)
    }

    fn sandwich(self, basis: Quaternion) -> Vector3 {
        ((-self) * basis * self).imaginary()
    }

    pub fn heading(self) -> Vector3 {
        self.sandwich(X_BASIS)
    }

    pub fn up(self) -> Vector3 {
        self.sandwich(Y_BASIS)
    }

    pub fn side(self) -> Vector3 {
        self.sandwich(Z_BASIS)
    }

    /// Turn about a world-space axis, leaving the turtle-local frame rigid.
    fn turn_global(self, axis: Vector3, angle: f64) -> Self {
        (self * Self::from_axis_angle(axis, angle)).normalize()
    }

    /// Bend the heading toward -y. The bend grows with `weight` and with how
    /// far the heading already leans away from vertical.
    pub fn apply_tropism(self, weight: f64) -> Self {
        if weight == 0.0 {
            return self;
        }
        let axis = Vector3::Y.cross(self.heading());
        let lean = axis.length();
        match axis.try_normalize() {
            Some(axis) => self.turn_global(axis, weight * lean),
            None => self,
        }
    }

    /// Roll about the heading until up is as close to +y as it can get.
    pub fn align_to_vertical(self) -> Self {
        let heading = self.heading();
        let target = match (Vector3::Y - heading * Vector3::Y.dot(heading)).try_normalize() {
            Some(t) => t,
            None => return self,
        };
        let up = self.up();
        let angle = heading.dot(up.cross(target)).atan2(up.dot(target));
        self.turn_global(heading, angle)
    }
}

impl Mul for Quaternion {
    type Output = Self;

    /// Hamilton product
    fn mul(self, q: Self) -> Self {
        Self::new(
            self.r * q.r - self.i * q.i - self.j * q.j - self.k * q.k,
            self.r * q.i + self.i * q.r + self.j * q.k - self.k * q.j,
            self.r * q.j - self.i * q.k + self.j * q.r + self.k * q.i,
            self.r * q.k + self.i * q.j - self.j * q.i + self.k * q.r,
        )
    }
}

impl Neg for Quaternion {
    type Output = Self;

    /// Rotation inverse under the engine's sign convention
    fn neg(self) -> Self {
        Self::new(self.r, -self.i, -self.j, -self.k)
    }
}

impl fmt::Display for Quaternion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = |v: f64| if v < 0.0 { '-' } else { '+' };
        write!(
            f,
            "{:.4} {} {:.4}i {} {:.4}j {} {:.4}k",
            self.r,
            sign(self.i),
            self.i.abs(),
            sign(self.j),
            self.j.abs(),
            sign(self.k),
            self.k.abs()
        )
    }
}
