//! Slot value types.
//!
//! A slot's value type is fixed when the slot is created. The supported
//! types are booleans, integers, floating-point scalars, the small
//! fixed-size numeric types defined here, and homogeneous arrays of any of
//! them. All numeric components are `f64`.

use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Runtime description of a slot's value type.
///
/// Used for type checks on type-erased handles and for error messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Vec2,
    Vec3,
    Vec4,
    Quat,
    Mat4,
    /// Homogeneous array of the inner kind.
    Array(Box<ValueKind>),
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => f.write_str("bool"),
            ValueKind::Int => f.write_str("int"),
            ValueKind::Float => f.write_str("float"),
            ValueKind::Vec2 => f.write_str("vec2"),
            ValueKind::Vec3 => f.write_str("vec3"),
            ValueKind::Vec4 => f.write_str("vec4"),
            ValueKind::Quat => f.write_str("quat"),
            ValueKind::Mat4 => f.write_str("mat4"),
            ValueKind::Array(inner) => write!(f, "[{inner}]"),
        }
    }
}

/// A type that can be stored in a slot.
///
/// `PartialEq` lets `set` skip notification when the value did not change
/// (see [`NotifyPolicy`](crate::config::NotifyPolicy)).
pub trait SlotValue: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// The runtime kind of this type.
    fn kind() -> ValueKind;
}

macro_rules! impl_slot_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl SlotValue for $ty {
                fn kind() -> ValueKind {
                    ValueKind::$kind
                }
            }
        )*
    };
}

impl_slot_value! {
    bool => Bool,
    i64 => Int,
    f64 => Float,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    Quat => Quat,
    Mat4 => Mat4,
}

impl<T: SlotValue> SlotValue for Vec<T> {
    fn kind() -> ValueKind {
        ValueKind::Array(Box::new(T::kind()))
    }
}

// ----------------------------------------------------------------------------
// Vectors
// ----------------------------------------------------------------------------

/// 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

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

    /// Component-wise comparison within `eps`.
    pub fn abs_diff_eq(self, other: Self, eps: f64) -> bool {
        (self.x - other.x).abs() <= eps
            && (self.y - other.y).abs() <= eps
            && (self.z - other.z).abs() <= eps
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// 4D vector (also used for colors).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec4 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Vec4 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }
}

// ----------------------------------------------------------------------------
// Quaternion
// ----------------------------------------------------------------------------

/// Rotation quaternion (x, y, z, w).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians about `axis` (normalized here).
    pub fn from_axis_angle(axis: Vec3, angle: f64) -> Self {
        let len = axis.length();
        if len == 0.0 {
            return Self::IDENTITY;
        }
        let (s, c) = (angle * 0.5).sin_cos();
        let a = axis * (s / len);
        Self::new(a.x, a.y, a.z, c)
    }

    pub fn normalize(self) -> Self {
        let len = (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt();
        if len == 0.0 {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Rotate a vector by this (unit) quaternion.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let q = Vec3::new(self.x, self.y, self.z);
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }

    /// Compare as rotations: `q` and `-q` are the same rotation.
    pub fn abs_diff_eq(self, other: Self, eps: f64) -> bool {
        let same = (self.x - other.x).abs() <= eps
            && (self.y - other.y).abs() <= eps
            && (self.z - other.z).abs() <= eps
            && (self.w - other.w).abs() <= eps;
        let flipped = (self.x + other.x).abs() <= eps
            && (self.y + other.y).abs() <= eps
            && (self.z + other.z).abs() <= eps
            && (self.w + other.w).abs() <= eps;
        same || flipped
    }

    /// Row-major 3x3 rotation matrix.
    fn to_rotation_rows(self) -> [[f64; 3]; 3] {
        let Self { x, y, z, w } = self;
        [
            [1.0 - 2.0 * (y * y + z * z), 2.0 * (x * y - z * w), 2.0 * (x * z + y * w)],
            [2.0 * (x * y + z * w), 1.0 - 2.0 * (x * x + z * z), 2.0 * (y * z - x * w)],
            [2.0 * (x * z - y * w), 2.0 * (y * z + x * w), 1.0 - 2.0 * (x * x + y * y)],
        ]
    }

    /// Inverse of [`to_rotation_rows`](Self::to_rotation_rows) for a pure
    /// rotation matrix.
    fn from_rotation_rows(m: [[f64; 3]; 3]) -> Self {
        let trace = m[0][0] + m[1][1] + m[2][2];
        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new(
                (m[2][1] - m[1][2]) / s,
                (m[0][2] - m[2][0]) / s,
                (m[1][0] - m[0][1]) / s,
                0.25 * s,
            )
        } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
            let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
            Self::new(
                0.25 * s,
                (m[0][1] + m[1][0]) / s,
                (m[0][2] + m[2][0]) / s,
                (m[2][1] - m[1][2]) / s,
            )
        } else if m[1][1] > m[2][2] {
            let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
            Self::new(
                (m[0][1] + m[1][0]) / s,
                0.25 * s,
                (m[1][2] + m[2][1]) / s,
                (m[0][2] - m[2][0]) / s,
            )
        } else {
            let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
            Self::new(
                (m[0][2] + m[2][0]) / s,
                (m[1][2] + m[2][1]) / s,
                0.25 * s,
                (m[1][0] - m[0][1]) / s,
            )
        };
        q.normalize()
    }
}

impl Mul for Quat {
    type Output = Self;

    /// Hamilton product: `self * rhs` applies `rhs` first.
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}

// ----------------------------------------------------------------------------
// Matrix
// ----------------------------------------------------------------------------

/// 4x4 affine transform, column-major: `cols[c][r]`.
///
/// The translation lives in column 3.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mat4 {
    pub cols: [[f64; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn from_translation(t: Vec3) -> Self {
        Self::IDENTITY.with_translation(t)
    }

    /// Build `T * R * S`.
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        let r = rotation.normalize().to_rotation_rows();
        let s = [scale.x, scale.y, scale.z];
        let mut cols = Self::IDENTITY.cols;
        for (c, col) in cols.iter_mut().take(3).enumerate() {
            for (row, cell) in col.iter_mut().take(3).enumerate() {
                *cell = r[row][c] * s[c];
            }
        }
        cols[3] = [translation.x, translation.y, translation.z, 1.0];
        Self { cols }
    }

    /// The translation column.
    pub fn translation(&self) -> Vec3 {
        let t = self.cols[3];
        Vec3::new(t[0], t[1], t[2])
    }

    /// Copy of this matrix with the translation column replaced.
    pub fn with_translation(mut self, t: Vec3) -> Self {
        self.cols[3][0] = t.x;
        self.cols[3][1] = t.y;
        self.cols[3][2] = t.z;
        self
    }

    /// Split into translation, rotation and scale.
    ///
    /// Shear is discarded. A negative determinant is folded into the x scale.
    pub fn to_trs(&self) -> (Vec3, Quat, Vec3) {
        let axis = |c: usize| Vec3::new(self.cols[c][0], self.cols[c][1], self.cols[c][2]);
        let (ax, ay, az) = (axis(0), axis(1), axis(2));
        let mut scale = Vec3::new(ax.length(), ay.length(), az.length());
        if ax.cross(ay).dot(az) < 0.0 {
            scale.x = -scale.x;
        }

        let unit = |v: Vec3, s: f64| if s == 0.0 { v } else { v * (1.0 / s) };
        let (ux, uy, uz) = (unit(ax, scale.x), unit(ay, scale.y), unit(az, scale.z));
        let rows = [
            [ux.x, uy.x, uz.x],
            [ux.y, uy.y, uz.y],
            [ux.z, uy.z, uz.z],
        ];
        (self.translation(), Quat::from_rotation_rows(rows), scale)
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let c = &self.cols;
        Vec3::new(
            c[0][0] * p.x + c[1][0] * p.y + c[2][0] * p.z + c[3][0],
            c[0][1] * p.x + c[1][1] * p.y + c[2][1] * p.z + c[3][1],
            c[0][2] * p.x + c[1][2] * p.y + c[2][2] * p.z + c[3][2],
        )
    }

    pub fn abs_diff_eq(&self, other: &Self, eps: f64) -> bool {
        self.cols
            .iter()
            .flatten()
            .zip(other.cols.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= eps)
    }
}

impl Mul for Mat4 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let mut cols = [[0.0; 4]; 4];
        for (c, col) in cols.iter_mut().enumerate() {
            for (r, cell) in col.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.cols[k][r] * rhs.cols[c][k]).sum();
            }
        }
        Self { cols }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
