#[macro_use]
pub mod macros;

pub mod accel;
pub mod bsdf;
pub mod camera;
pub mod config;
pub mod device;
pub mod engine;
pub mod err_float;
pub mod film;
pub mod geometry;
pub mod light;
pub mod material;
pub mod sampler;
pub mod sampling;
pub mod scene;
pub mod spectrum;
pub mod texture;
pub mod volume;

use cgmath::{InnerSpace, Point2, Point3, Vector2, Vector3};
use std::ops::{Deref, DerefMut, Neg};

pub use crate::geometry::{Ray, RayHit};
pub use crate::spectrum::Spectrum;

pub type Float = f32;

pub const INFINITY: Float = std::f32::INFINITY;

pub type Point2f = Point2<Float>;
pub type Point2i = Point2<i32>;
pub type Point3f = Point3<Float>;
pub type Vec2f = Vector2<Float>;
pub type Vec2i = Vector2<i32>;
pub type Vec3f = Vector3<Float>;

pub mod consts {
    use crate::Float;

    pub const PI: Float = std::f32::consts::PI;
    pub const TWO_PI: Float = 2.0 * std::f32::consts::PI;
    pub const FOUR_PI: Float = 4.0 * std::f32::consts::PI;
    pub const FRAC_1_PI: Float = std::f32::consts::FRAC_1_PI;
    pub const FRAC_1_2PI: Float = 0.159_154_94;
    pub const FRAC_1_4PI: Float = 0.079_577_47;
    pub const FRAC_PI_2: Float = std::f32::consts::FRAC_PI_2;
    pub const FRAC_PI_4: Float = std::f32::consts::FRAC_PI_4;
}

/// A surface normal. Distinct from `Vec3f` so that transforms can apply the
/// inverse-transpose and so `faceforward` reads unambiguously at call sites.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normal3(pub Vec3f);

impl Normal3 {
    pub fn new(x: Float, y: Float, z: Float) -> Self {
        Normal3(Vec3f::new(x, y, z))
    }

    pub fn faceforward(self, v: Vec3f) -> Self {
        if self.0.dot(v) < 0.0 { -self } else { self }
    }
}

impl Deref for Normal3 {
    type Target = Vec3f;

    fn deref(&self) -> &Vec3f {
        &self.0
    }
}

impl DerefMut for Normal3 {
    fn deref_mut(&mut self) -> &mut Vec3f {
        &mut self.0
    }
}

impl Neg for Normal3 {
    type Output = Self;

    fn neg(self) -> Self {
        Normal3(-self.0)
    }
}

impl From<Vec3f> for Normal3 {
    fn from(v: Vec3f) -> Self {
        Normal3(v)
    }
}

impl From<Normal3> for Vec3f {
    fn from(n: Normal3) -> Self {
        n.0
    }
}

pub fn abs_dot(v1: Vec3f, v2: Vec3f) -> Float {
    v1.dot(v2).abs()
}

pub fn faceforward(v: Vec3f, v2: Vec3f) -> Vec3f {
    if v.dot(v2) < 0.0 { -v } else { v }
}

pub fn lerp(t: Float, a: Float, b: Float) -> Float {
    (1.0 - t) * a + t * b
}

pub fn distance_squared(p1: Point3f, p2: Point3f) -> Float {
    (p2 - p1).magnitude2()
}

/// Builds an arbitrary orthonormal basis around `v1`, which must be normalized.
pub fn coordinate_system(v1: Vec3f) -> (Vec3f, Vec3f) {
    let v2 = if v1.x.abs() > v1.y.abs() {
        Vec3f::new(-v1.z, 0.0, v1.x) / (v1.x * v1.x + v1.z * v1.z).sqrt()
    } else {
        Vec3f::new(0.0, v1.z, -v1.y) / (v1.y * v1.y + v1.z * v1.z).sqrt()
    };
    (v2, v1.cross(v2))
}

pub fn spherical_direction(sin_theta: Float, cos_theta: Float, phi: Float) -> Vec3f {
    Vec3f::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

pub fn spherical_theta(v: Vec3f) -> Float {
    v.z.min(1.0).max(-1.0).acos()
}

pub fn spherical_phi(v: Vec3f) -> Float {
    let p = v.y.atan2(v.x);
    if p < 0.0 { p + consts::TWO_PI } else { p }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_system_orthonormal() {
        let v1 = Vec3f::new(0.3, -0.6, 0.2).normalize();
        let (v2, v3) = coordinate_system(v1);
        approx::assert_abs_diff_eq!(v1.dot(v2), 0.0, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(v1.dot(v3), 0.0, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(v2.magnitude(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_faceforward() {
        let n = Normal3::new(0.0, 0.0, 1.0);
        let flipped = n.faceforward(Vec3f::new(0.0, 0.0, -1.0));
        assert_eq!(flipped.0, Vec3f::new(0.0, 0.0, -1.0));
    }
}
