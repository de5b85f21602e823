use crate::geometry::Frame;
use crate::light::{EmitResult, IlluminateResult, LightQueryContext};
use crate::sampling::{concentric_sample_disk, uniform_cone_pdf, uniform_sample_cone};
use crate::{consts, Float, Normal3, Point2f, Point3f, Spectrum, Vec3f};
use cgmath::InnerSpace;

/// Directional light softened over a small cone (the sun-through-clouds
/// case). `theta` is the half-angle of the cone in degrees.
#[derive(Debug, Clone)]
pub struct DistantLight {
    pub direction: Vec3f,
    pub emitted: Spectrum,
    pub cos_theta_max: Float,
}

impl DistantLight {
    pub fn new(direction: Vec3f, emitted: Spectrum, theta_deg: Float) -> Self {
        Self {
            direction: direction.normalize(),
            emitted,
            cos_theta_max: theta_deg.to_radians().cos().min(1.0 - 1e-6),
        }
    }

    pub fn emit(
        &self,
        ctx: &LightQueryContext,
        u0: Float,
        u1: Float,
        u2: Float,
        u3: Float,
    ) -> Option<EmitResult> {
        let frame = Frame::from_normal(Normal3(self.direction));
        let dir = frame.to_world(uniform_sample_cone(Point2f::new(u0, u1), self.cos_theta_max));

        // launch from the world-bounding disk behind the scene
        let disk = concentric_sample_disk(Point2f::new(u2, u3)) * ctx.world_radius;
        let origin =
            ctx.world_center + (-dir * ctx.world_radius) + frame.to_world(Vec3f::new(disk.x, disk.y, 0.0));

        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);
        Some(EmitResult {
            origin,
            dir,
            radiance: self.emitted,
            emission_pdf_w: uniform_cone_pdf(self.cos_theta_max) * disk_pdf,
            direct_pdf_a: uniform_cone_pdf(self.cos_theta_max),
            cos_theta_at_light: 1.0,
        })
    }

    pub fn illuminate(
        &self,
        ctx: &LightQueryContext,
        _p: Point3f,
        u0: Float,
        u1: Float,
    ) -> Option<IlluminateResult> {
        let frame = Frame::from_normal(Normal3(-self.direction));
        let dir = frame.to_world(uniform_sample_cone(Point2f::new(u0, u1), self.cos_theta_max));
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);
        Some(IlluminateResult {
            dir,
            distance: 2.0 * ctx.world_radius,
            radiance: self.emitted,
            direct_pdf_w: uniform_cone_pdf(self.cos_theta_max),
            emission_pdf_w: uniform_cone_pdf(self.cos_theta_max) * disk_pdf,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn power(&self, ctx: &LightQueryContext) -> Float {
        self.emitted.y() * consts::PI * ctx.world_radius * ctx.world_radius
    }
}

/// Perfectly parallel directional light (a delta in direction).
#[derive(Debug, Clone)]
pub struct SharpDistantLight {
    pub direction: Vec3f,
    pub emitted: Spectrum,
}

impl SharpDistantLight {
    pub fn new(direction: Vec3f, emitted: Spectrum) -> Self {
        Self { direction: direction.normalize(), emitted }
    }

    pub fn emit(&self, ctx: &LightQueryContext, u0: Float, u1: Float) -> Option<EmitResult> {
        let frame = Frame::from_normal(Normal3(self.direction));
        let disk = concentric_sample_disk(Point2f::new(u0, u1)) * ctx.world_radius;
        let origin = ctx.world_center
            + (-self.direction * ctx.world_radius)
            + frame.to_world(Vec3f::new(disk.x, disk.y, 0.0));
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);
        Some(EmitResult {
            origin,
            dir: self.direction,
            radiance: self.emitted,
            emission_pdf_w: disk_pdf,
            direct_pdf_a: 1.0,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn illuminate(&self, ctx: &LightQueryContext, _p: Point3f) -> Option<IlluminateResult> {
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);
        Some(IlluminateResult {
            dir: -self.direction,
            distance: 2.0 * ctx.world_radius,
            radiance: self.emitted,
            direct_pdf_w: 1.0,
            emission_pdf_w: disk_pdf,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn power(&self, ctx: &LightQueryContext) -> Float {
        self.emitted.y() * consts::PI * ctx.world_radius * ctx.world_radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Materials;
    use crate::texture::Textures;

    #[test]
    fn test_sharp_distant_is_antiparallel() {
        let meshes = vec![];
        let mats = Materials::new();
        let texs = Textures::new();
        let ctx = LightQueryContext {
            meshes: &meshes,
            materials: &mats,
            textures: &texs,
            world_center: point3f!(0, 0, 0),
            world_radius: 5.0,
        };
        let light = SharpDistantLight::new(vec3f!(0, -1, 0), Spectrum::WHITE);
        let ill = light.illuminate(&ctx, point3f!(0, 0, 0)).unwrap();
        approx::assert_abs_diff_eq!(ill.dir.y, 1.0, epsilon = 1e-6);
        let emit = light.emit(&ctx, 0.5, 0.5).unwrap();
        approx::assert_abs_diff_eq!(emit.dir.y, -1.0, epsilon = 1e-6);
        // emitted rays start outside the scene
        assert!(emit.origin.y >= 4.9);
    }

    #[test]
    fn test_distant_cone_spread() {
        let meshes = vec![];
        let mats = Materials::new();
        let texs = Textures::new();
        let ctx = LightQueryContext {
            meshes: &meshes,
            materials: &mats,
            textures: &texs,
            world_center: point3f!(0, 0, 0),
            world_radius: 5.0,
        };
        let light = DistantLight::new(vec3f!(0, 0, -1), Spectrum::WHITE, 5.0);
        let ill = light.illuminate(&ctx, point3f!(0, 0, 0), 0.2, 0.8).unwrap();
        // direction stays within the 5 degree cone around +z
        assert!(ill.dir.z > (5.0f32.to_radians()).cos() - 1e-4);
    }
}
