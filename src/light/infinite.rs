use crate::geometry::Frame;
use crate::light::{EmitResult, IlluminateResult, LightQueryContext};
use crate::sampling::{concentric_sample_disk, uniform_sample_sphere, Distribution2D, UNIFORM_SPHERE_PDF};
use crate::texture::ImageMap;
use crate::{consts, Float, Normal3, Point2f, Point3f, Spectrum, Vec3f};
use cgmath::InnerSpace;
use std::sync::Arc;

/// Uniform environment dome.
#[derive(Debug, Clone)]
pub struct ConstantInfiniteLight {
    pub color: Spectrum,
    pub gain: Spectrum,
}

impl ConstantInfiniteLight {
    pub fn new(color: Spectrum, gain: Spectrum) -> Self {
        Self { color, gain }
    }

    fn radiance(&self) -> Spectrum {
        self.gain * self.color
    }

    pub fn radiance_along(&self, ctx: &LightQueryContext, _dir: Vec3f) -> (Spectrum, Float, Float) {
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);
        (
            self.radiance(),
            UNIFORM_SPHERE_PDF,
            UNIFORM_SPHERE_PDF * disk_pdf,
        )
    }

    pub fn emit(
        &self,
        ctx: &LightQueryContext,
        u0: Float,
        u1: Float,
        u2: Float,
        u3: Float,
    ) -> Option<EmitResult> {
        // choose a direction into the scene, then a starting point on the
        // bounding sphere behind it
        let dir = -uniform_sample_sphere(Point2f::new(u0, u1));
        let frame = Frame::from_normal(Normal3(dir));
        let disk = concentric_sample_disk(Point2f::new(u2, u3)) * ctx.world_radius;
        let origin = ctx.world_center - dir * ctx.world_radius
            + frame.to_world(Vec3f::new(disk.x, disk.y, 0.0));
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);

        Some(EmitResult {
            origin,
            dir,
            radiance: self.radiance(),
            emission_pdf_w: UNIFORM_SPHERE_PDF * disk_pdf,
            direct_pdf_a: UNIFORM_SPHERE_PDF,
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
        let dir = uniform_sample_sphere(Point2f::new(u0, u1));
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);
        Some(IlluminateResult {
            dir,
            distance: 2.0 * ctx.world_radius,
            radiance: self.radiance(),
            direct_pdf_w: UNIFORM_SPHERE_PDF,
            emission_pdf_w: UNIFORM_SPHERE_PDF * disk_pdf,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn power(&self, ctx: &LightQueryContext) -> Float {
        self.radiance().y() * 4.0 * consts::PI * consts::PI * ctx.world_radius * ctx.world_radius
    }
}

/// Image-map environment light with luminance-weighted importance
/// sampling over the latitude-longitude map.
#[derive(Debug, Clone)]
pub struct InfiniteLight {
    pub map: Arc<ImageMap>,
    pub gain: Spectrum,
    /// Rotates the map around the scene.
    pub shift_u: Float,
    pub shift_v: Float,
    distribution: Distribution2D,
}

impl InfiniteLight {
    pub fn new(map: Arc<ImageMap>, gain: Spectrum, shift_u: Float, shift_v: Float) -> Self {
        let lum = map.luminance_values();
        let distribution = Distribution2D::new(&lum, map.width, map.height);
        Self { map, gain, shift_u, shift_v, distribution }
    }

    fn dir_to_uv(&self, dir: Vec3f) -> Point2f {
        let theta = crate::spherical_theta(dir);
        let phi = crate::spherical_phi(dir);
        Point2f::new(
            phi * consts::FRAC_1_2PI + self.shift_u,
            theta * consts::FRAC_1_PI + self.shift_v,
        )
    }

    fn uv_to_dir(&self, uv: Point2f) -> Vec3f {
        let phi = (uv.x - self.shift_u) * consts::TWO_PI;
        let theta = (uv.y - self.shift_v) * consts::PI;
        let sin_theta = theta.sin();
        Vec3f::new(sin_theta * phi.cos(), sin_theta * phi.sin(), theta.cos())
    }

    fn lookup(&self, uv: Point2f) -> Spectrum {
        self.gain * self.map.lookup(uv.x, uv.y)
    }

    /// uv-pdf to solid-angle-pdf conversion factor at this latitude.
    fn uv_to_solid_angle_pdf(uv_pdf: Float, sin_theta: Float) -> Float {
        if sin_theta <= 1e-6 {
            0.0
        } else {
            uv_pdf / (2.0 * consts::PI * consts::PI * sin_theta)
        }
    }

    pub fn radiance_along(&self, ctx: &LightQueryContext, dir: Vec3f) -> (Spectrum, Float, Float) {
        // dir is the direction the escaped ray was traveling; the map is
        // indexed by where the ray came from on the dome
        let uv = self.dir_to_uv(dir);
        let uv_wrapped = Point2f::new(uv.x - uv.x.floor(), uv.y - uv.y.floor());
        let uv_pdf = self.distribution.pdf(uv_wrapped);
        let sin_theta = (uv_wrapped.y * consts::PI).sin();
        let direct_pdf_w = Self::uv_to_solid_angle_pdf(uv_pdf, sin_theta);
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);
        (
            self.lookup(uv),
            direct_pdf_w,
            direct_pdf_w * disk_pdf,
        )
    }

    pub fn emit(
        &self,
        ctx: &LightQueryContext,
        u0: Float,
        u1: Float,
        u2: Float,
        u3: Float,
    ) -> Option<EmitResult> {
        let (uv, uv_pdf) = self.distribution.sample_continuous(u0, u1);
        if uv_pdf <= 0.0 {
            return None;
        }
        let light_dir = self.uv_to_dir(uv);
        // emission travels opposite the illumination direction
        let dir = -light_dir;
        let sin_theta = (uv.y * consts::PI).sin();
        let pdf_w = Self::uv_to_solid_angle_pdf(uv_pdf, sin_theta);
        if pdf_w <= 0.0 {
            return None;
        }

        let frame = Frame::from_normal(Normal3(dir));
        let disk = concentric_sample_disk(Point2f::new(u2, u3)) * ctx.world_radius;
        let origin = ctx.world_center - dir * ctx.world_radius
            + frame.to_world(Vec3f::new(disk.x, disk.y, 0.0));
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);

        Some(EmitResult {
            origin,
            dir,
            radiance: self.lookup(uv),
            emission_pdf_w: pdf_w * disk_pdf,
            direct_pdf_a: pdf_w,
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
        let (uv, uv_pdf) = self.distribution.sample_continuous(u0, u1);
        if uv_pdf <= 0.0 {
            return None;
        }
        let dir = self.uv_to_dir(uv);
        let sin_theta = (uv.y * consts::PI).sin();
        let pdf_w = Self::uv_to_solid_angle_pdf(uv_pdf, sin_theta);
        if pdf_w <= 0.0 {
            return None;
        }
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);

        Some(IlluminateResult {
            dir,
            distance: 2.0 * ctx.world_radius,
            radiance: self.lookup(uv),
            direct_pdf_w: pdf_w,
            emission_pdf_w: pdf_w * disk_pdf,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn power(&self, ctx: &LightQueryContext) -> Float {
        self.gain.y()
            * self.map.mean_luminance()
            * 4.0
            * consts::PI
            * consts::PI
            * ctx.world_radius
            * ctx.world_radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Materials;
    use crate::texture::Textures;

    fn ctx<'a>(
        meshes: &'a [crate::scene::mesh::TriangleMesh],
        materials: &'a Materials,
        textures: &'a Textures,
    ) -> LightQueryContext<'a> {
        LightQueryContext {
            meshes,
            materials,
            textures,
            world_center: point3f!(0, 0, 0),
            world_radius: 10.0,
        }
    }

    #[test]
    fn test_constant_infinite_uniform() {
        let meshes = vec![];
        let mats = Materials::new();
        let texs = Textures::new();
        let c = ctx(&meshes, &mats, &texs);
        let light = ConstantInfiniteLight::new(Spectrum::uniform(2.0), Spectrum::WHITE);
        let (radiance, pdf, _) = light.radiance_along(&c, vec3f!(0, 0, 1));
        approx::assert_abs_diff_eq!(radiance.r(), 2.0, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(pdf, UNIFORM_SPHERE_PDF, epsilon = 1e-8);
    }

    #[test]
    fn test_infinite_importance_samples_bright_texel() {
        // map with one very bright texel: sampled direction should
        // concentrate there
        let mut data = vec![0u8; 4 * 4 * 4];
        // bright texel at (3, 1)
        let idx = (1 * 4 + 3) * 4;
        data[idx] = 255;
        data[idx + 1] = 255;
        data[idx + 2] = 255;
        data[idx + 3] = 255;
        for p in data.chunks_mut(4) {
            if p[3] == 0 {
                p[3] = 255;
            }
        }
        let map = Arc::new(ImageMap::from_rgba8(&data, 4, 4, 1.0));
        let light = InfiniteLight::new(map, Spectrum::WHITE, 0.0, 0.0);

        let meshes = vec![];
        let mats = Materials::new();
        let texs = Textures::new();
        let c = ctx(&meshes, &mats, &texs);

        let ill = light.illuminate(&c, point3f!(0, 0, 0), 0.5, 0.5).unwrap();
        assert!(ill.direct_pdf_w > UNIFORM_SPHERE_PDF);
        assert!(!ill.radiance.is_black());
    }

    #[test]
    fn test_uv_dir_round_trip() {
        let data = vec![255u8; 8 * 8 * 4];
        let map = Arc::new(ImageMap::from_rgba8(&data, 8, 8, 1.0));
        let light = InfiniteLight::new(map, Spectrum::WHITE, 0.0, 0.0);
        let uv = Point2f::new(0.3, 0.6);
        let dir = light.uv_to_dir(uv);
        let back = light.dir_to_uv(dir);
        approx::assert_abs_diff_eq!(back.x, uv.x, epsilon = 1e-4);
        approx::assert_abs_diff_eq!(back.y, uv.y, epsilon = 1e-4);
    }
}
