use crate::geometry::Frame;
use crate::{Float, Normal3, Point3f, Spectrum, Vec2f, Vec3f};
use crate::volume::VolumeIndex;
use cgmath::InnerSpace;

/// The shading-space record built from a ray and a hit. Everything a
/// texture or BSDF needs to evaluate at the intersection lives here, so the
/// lower layers never reach back into mesh storage.
#[derive(Debug, Clone)]
pub struct HitPoint {
    /// Direction pointing back along the traced ray (world space).
    pub fixed_dir: Vec3f,
    pub p: Point3f,
    pub uv: Vec2f,
    /// Geometric normal, oriented toward `fixed_dir`'s side.
    pub ng: Normal3,
    /// Shading normal, after any bump/normal map perturbation.
    pub ns: Normal3,
    pub dpdu: Vec3f,
    pub dpdv: Vec3f,
    /// Interpolated vertex color/alpha, white/opaque when the mesh has none.
    pub color: Spectrum,
    pub alpha: Float,
    /// Random value reused across a pass-through chain so that one path
    /// vertex makes consistent stochastic choices across queries.
    pub pass_through_event: Float,
    pub from_light: bool,
    /// True when the ray crossed into the object (`dot(d, ng) < 0` with the
    /// original orientation of the geometric normal).
    pub into_object: bool,
    pub interior_volume: Option<VolumeIndex>,
    pub exterior_volume: Option<VolumeIndex>,
}

impl HitPoint {
    /// The shading frame, tangent-aligned so anisotropic lobes track the
    /// surface parameterization.
    pub fn shade_frame(&self) -> Frame {
        Frame::from_z_and_tangent(self.ns, self.dpdu)
    }

    pub fn cos_ray_ns(&self) -> Float {
        self.fixed_dir.dot(self.ns.0)
    }

    /// Applies a bump-map gradient: tilts the shading normal by the texture
    /// gradient along the tangent vectors.
    pub fn apply_bump_gradient(&mut self, grad: Vec2f) {
        let perturbed = (self.ns.0 + grad.x * self.dpdu.normalize() + grad.y * self.dpdv.normalize())
            .normalize();
        // never flip across the geometric surface
        self.ns = Normal3(perturbed).faceforward(self.ng.0);
    }

    /// Applies a tangent-space normal map sample (decoded to [-1, 1]).
    pub fn apply_normal_map(&mut self, sample: Spectrum) {
        let t = Vec3f::new(
            2.0 * sample.r() - 1.0,
            2.0 * sample.g() - 1.0,
            2.0 * sample.b() - 1.0,
        );
        if t.magnitude2() == 0.0 {
            return;
        }
        let frame = self.shade_frame();
        self.ns = Normal3(frame.to_world(t.normalize()).normalize()).faceforward(self.ng.0);
    }

    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            fixed_dir: Vec3f::new(0.0, 0.0, 1.0),
            p: Point3f::new(0.0, 0.0, 0.0),
            uv: Vec2f::new(0.0, 0.0),
            ng: Normal3::new(0.0, 0.0, 1.0),
            ns: Normal3::new(0.0, 0.0, 1.0),
            dpdu: Vec3f::new(1.0, 0.0, 0.0),
            dpdv: Vec3f::new(0.0, 1.0, 0.0),
            color: Spectrum::WHITE,
            alpha: 1.0,
            pass_through_event: 0.5,
            from_light: false,
            into_object: true,
            interior_volume: None,
            exterior_volume: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_keeps_hemisphere() {
        let mut hp = HitPoint::test_default();
        hp.apply_bump_gradient(Vec2f::new(5.0, -3.0));
        assert!(hp.ns.dot(hp.ng.0) > 0.0);
    }

    #[test]
    fn test_flat_normal_map_is_identity() {
        let mut hp = HitPoint::test_default();
        let before = hp.ns;
        hp.apply_normal_map(Spectrum::new(0.5, 0.5, 1.0));
        approx::assert_abs_diff_eq!(hp.ns.z, before.z, epsilon = 1e-5);
    }
}
