use crate::{Float, Normal3, Point3f, Vec3f};
use crate::geometry::{Bounds3f, Ray};
use cgmath::{InnerSpace, Matrix4, Rad, SquareMatrix, Transform as CgTransform};

/// A transform paired with its inverse so that inverting is free and normals
/// can go through the inverse-transpose without recomputing it.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    pub t: Matrix4<Float>,
    pub invt: Matrix4<Float>,
}

const IDENTITY_MAT4: Matrix4<Float> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
);

impl Transform {
    pub const IDENTITY: Self = Transform::new(IDENTITY_MAT4, IDENTITY_MAT4);

    pub const fn new(mat: Matrix4<Float>, mat_inv: Matrix4<Float>) -> Self {
        Self { t: mat, invt: mat_inv }
    }

    pub fn from_mat(mat: Matrix4<Float>) -> Self {
        let m_inv = mat.invert().expect("Could not invert matrix");
        Self::new(mat, m_inv)
    }

    pub fn look_at(pos: Point3f, look_at: Point3f, up: Vec3f) -> Self {
        let col3 = pos.to_homogeneous();
        let dir = (look_at - pos).normalize();
        let right = up.normalize().cross(dir).normalize();
        let new_up = dir.cross(right);

        let col0 = right.extend(0.0);
        let col1 = new_up.extend(0.0);
        let col2 = dir.extend(0.0);

        let mat = Matrix4::from_cols(col0, col1, col2, col3);
        let minv = mat.inverse_transform().unwrap();
        Self::new(minv, mat)
    }

    pub fn camera_look_at(pos: Point3f, look_at: Point3f, up: Vec3f) -> Self {
        Self::look_at(pos, look_at, up).inverse()
    }

    pub fn translate(delta: Vec3f) -> Self {
        let m = Matrix4::from_translation(delta);
        let m_inv = Matrix4::from_translation(-delta);
        Self::new(m, m_inv)
    }

    pub fn scale(sx: Float, sy: Float, sz: Float) -> Self {
        let m = Matrix4::from_nonuniform_scale(sx, sy, sz);
        let m_inv = Matrix4::from_nonuniform_scale(1.0 / sx, 1.0 / sy, 1.0 / sz);
        Self::new(m, m_inv)
    }

    pub fn rotate_x(theta: impl Into<Rad<Float>>) -> Self {
        let m = Matrix4::from_angle_x(theta);
        let m_inv = m.inverse_transform().unwrap();
        Self::new(m, m_inv)
    }

    pub fn rotate_y(theta: impl Into<Rad<Float>>) -> Self {
        let m = Matrix4::from_angle_y(theta);
        let m_inv = m.inverse_transform().unwrap();
        Self::new(m, m_inv)
    }

    pub fn rotate_z(theta: impl Into<Rad<Float>>) -> Self {
        let m = Matrix4::from_angle_z(theta);
        let m_inv = m.inverse_transform().unwrap();
        Self::new(m, m_inv)
    }

    pub fn perspective(fov: Float, near: Float, far: Float) -> Self {
        let mat = Matrix4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, far / (far - near), 1.0,
            0.0, 0.0, -far * near / (far - near), 0.0,
        );

        let inv_tan_ang = 1.0 / (fov.to_radians() / 2.0).tan();
        Transform::scale(inv_tan_ang, inv_tan_ang, 1.0) * Self::from_mat(mat)
    }

    pub fn inverse(&self) -> Self {
        Self::new(self.invt, self.t)
    }

    pub fn swaps_handedness(&self) -> bool {
        self.t.determinant() < 0.0
    }

    pub fn transform_point(&self, p: Point3f) -> Point3f {
        self.t.transform_point(p)
    }

    pub fn transform_vector(&self, v: Vec3f) -> Vec3f {
        self.t.transform_vector(v)
    }

    pub fn transform_normal(&self, n: Normal3) -> Normal3 {
        // transform by the transpose of the inverse
        let x = self.invt[0][0] * n.x + self.invt[1][0] * n.y + self.invt[2][0] * n.z;
        let y = self.invt[0][1] * n.x + self.invt[1][1] * n.y + self.invt[2][1] * n.z;
        let z = self.invt[0][2] * n.x + self.invt[1][2] * n.y + self.invt[2][2] * n.z;
        Normal3::new(x, y, z)
    }

    pub fn transform_ray(&self, ray: &Ray) -> Ray {
        Ray {
            o: self.transform_point(ray.o),
            d: self.transform_vector(ray.d),
            mint: ray.mint,
            maxt: ray.maxt,
        }
    }

    pub fn transform_bounds(&self, b: &Bounds3f) -> Bounds3f {
        let mut out = Bounds3f::empty();
        for i in 0..8 {
            let corner = Point3f::new(
                if i & 1 == 0 { b.min.x } else { b.max.x },
                if i & 2 == 0 { b.min.y } else { b.max.y },
                if i & 4 == 0 { b.min.z } else { b.max.z },
            );
            out = out.join_point(self.transform_point(corner));
        }
        out
    }
}

impl std::ops::Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Transform) -> Transform {
        Transform::new(self.t * rhs.t, rhs.invt * self.invt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverse_round_trip() {
        let t = Transform::translate(vec3f!(1, 2, 3)) * Transform::scale(2.0, 2.0, 2.0);
        let p = point3f!(1, 1, 1);
        let q = t.transform_point(p);
        let back = t.inverse().transform_point(q);
        approx::assert_abs_diff_eq!(back.x, p.x, epsilon = 1e-5);
        approx::assert_abs_diff_eq!(back.y, p.y, epsilon = 1e-5);
        approx::assert_abs_diff_eq!(back.z, p.z, epsilon = 1e-5);
    }

    #[test]
    fn test_normal_under_scale() {
        // a nonuniform scale must not scale normals with the points
        let t = Transform::scale(2.0, 1.0, 1.0);
        let n = t.transform_normal(Normal3::new(1.0, 0.0, 0.0));
        approx::assert_abs_diff_eq!(n.x, 0.5, epsilon = 1e-6);
    }
}
