use crate::geometry::{Frame, Transform};
use crate::light::{EmitResult, IlluminateResult, LightQueryContext};
use crate::sampling::{uniform_cone_pdf, uniform_sample_cone, uniform_sample_sphere, UNIFORM_SPHERE_PDF};
use crate::texture::ImageMap;
use crate::{consts, Float, Normal3, Point2f, Point3f, Spectrum, Vec3f};
use cgmath::InnerSpace;
use std::sync::Arc;

/// Isotropic point emitter. Radiance values are the emitted intensity
/// (flux over the full sphere already folded into `emitted`).
#[derive(Debug, Clone)]
pub struct PointLight {
    pub position: Point3f,
    pub emitted: Spectrum,
}

impl PointLight {
    pub fn new(position: Point3f, emitted: Spectrum) -> Self {
        Self { position, emitted }
    }

    fn intensity(&self) -> Spectrum {
        self.emitted * consts::FRAC_1_4PI
    }

    pub fn emit(&self, _ctx: &LightQueryContext, u0: Float, u1: Float) -> Option<EmitResult> {
        let dir = uniform_sample_sphere(Point2f::new(u0, u1));
        Some(EmitResult {
            origin: self.position,
            dir,
            radiance: self.intensity(),
            emission_pdf_w: UNIFORM_SPHERE_PDF,
            direct_pdf_a: 1.0,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn illuminate(&self, _ctx: &LightQueryContext, p: Point3f) -> Option<IlluminateResult> {
        let to_light = self.position - p;
        let distance_squared = to_light.magnitude2();
        if distance_squared < 1e-12 {
            return None;
        }
        let distance = distance_squared.sqrt();
        Some(IlluminateResult {
            dir: to_light / distance,
            distance,
            radiance: self.intensity(),
            // delta position: the "solid angle" pdf deliberately carries
            // the squared distance so radiance / pdf gives intensity/d^2
            direct_pdf_w: distance_squared,
            emission_pdf_w: UNIFORM_SPHERE_PDF,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn power(&self) -> Float {
        self.emitted.y()
    }
}

/// Point light whose intensity varies with direction through an image map
/// (a goniometric/IES-style profile).
#[derive(Debug, Clone)]
pub struct MapPointLight {
    pub position: Point3f,
    pub emitted: Spectrum,
    pub map: Arc<ImageMap>,
    pub light_to_world: Transform,
}

impl MapPointLight {
    fn map_factor(&self, world_dir: Vec3f) -> Spectrum {
        // look up by the direction in light space
        let local = self.light_to_world.inverse().transform_vector(world_dir).normalize();
        let theta = crate::spherical_theta(local);
        let phi = crate::spherical_phi(local);
        self.map
            .lookup(phi * consts::FRAC_1_2PI, theta * consts::FRAC_1_PI)
    }

    pub fn emit(&self, _ctx: &LightQueryContext, u0: Float, u1: Float) -> Option<EmitResult> {
        let dir = uniform_sample_sphere(Point2f::new(u0, u1));
        Some(EmitResult {
            origin: self.position,
            dir,
            radiance: self.emitted * consts::FRAC_1_4PI * self.map_factor(dir),
            emission_pdf_w: UNIFORM_SPHERE_PDF,
            direct_pdf_a: 1.0,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn illuminate(&self, _ctx: &LightQueryContext, p: Point3f) -> Option<IlluminateResult> {
        let to_light = self.position - p;
        let distance_squared = to_light.magnitude2();
        if distance_squared < 1e-12 {
            return None;
        }
        let distance = distance_squared.sqrt();
        let dir = to_light / distance;
        Some(IlluminateResult {
            dir,
            distance,
            radiance: self.emitted * consts::FRAC_1_4PI * self.map_factor(-dir),
            direct_pdf_w: distance_squared,
            emission_pdf_w: UNIFORM_SPHERE_PDF,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn power(&self) -> Float {
        self.emitted.y() * self.map.mean_luminance()
    }
}

/// Cone spot with a smooth falloff band between the inner and outer
/// angles.
#[derive(Debug, Clone)]
pub struct SpotLight {
    pub position: Point3f,
    pub emitted: Spectrum,
    pub direction: Vec3f,
    pub cos_total_width: Float,
    pub cos_falloff_start: Float,
}

impl SpotLight {
    pub fn new(
        position: Point3f,
        target: Point3f,
        emitted: Spectrum,
        cone_angle_deg: Float,
        cone_delta_deg: Float,
    ) -> Self {
        Self {
            position,
            emitted,
            direction: (target - position).normalize(),
            cos_total_width: cone_angle_deg.to_radians().cos(),
            cos_falloff_start: (cone_angle_deg - cone_delta_deg).to_radians().cos(),
        }
    }

    fn falloff(&self, cos_angle: Float) -> Float {
        if cos_angle < self.cos_total_width {
            0.0
        } else if cos_angle > self.cos_falloff_start {
            1.0
        } else {
            let delta =
                (cos_angle - self.cos_total_width) / (self.cos_falloff_start - self.cos_total_width);
            delta * delta * delta * delta
        }
    }

    pub fn emit(&self, _ctx: &LightQueryContext, u0: Float, u1: Float) -> Option<EmitResult> {
        let frame = Frame::from_normal(Normal3(self.direction));
        let local = uniform_sample_cone(Point2f::new(u0, u1), self.cos_total_width);
        let dir = frame.to_world(local);
        let falloff = self.falloff(local.z);
        Some(EmitResult {
            origin: self.position,
            dir,
            radiance: self.emitted * falloff,
            emission_pdf_w: uniform_cone_pdf(self.cos_total_width),
            direct_pdf_a: 1.0,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn illuminate(&self, _ctx: &LightQueryContext, p: Point3f) -> Option<IlluminateResult> {
        let to_light = self.position - p;
        let distance_squared = to_light.magnitude2();
        if distance_squared < 1e-12 {
            return None;
        }
        let distance = distance_squared.sqrt();
        let dir = to_light / distance;
        let falloff = self.falloff(self.direction.dot(-dir));
        if falloff <= 0.0 {
            return None;
        }
        Some(IlluminateResult {
            dir,
            distance,
            radiance: self.emitted * falloff,
            direct_pdf_w: distance_squared,
            emission_pdf_w: uniform_cone_pdf(self.cos_total_width),
            cos_theta_at_light: 1.0,
        })
    }

    pub fn power(&self) -> Float {
        // flux of the cone with the falloff band approximated at half weight
        self.emitted.y()
            * consts::TWO_PI
            * ((1.0 - self.cos_falloff_start)
                + 0.5 * (self.cos_falloff_start - self.cos_total_width))
    }
}

/// Slide-projector light: emits an image map through a perspective
/// frustum.
#[derive(Debug, Clone)]
pub struct ProjectionLight {
    pub position: Point3f,
    pub emitted: Spectrum,
    pub map: Arc<ImageMap>,
    pub light_to_world: Transform,
    pub fov_deg: Float,
    cos_total_width: Float,
}

impl ProjectionLight {
    pub fn new(
        position: Point3f,
        emitted: Spectrum,
        map: Arc<ImageMap>,
        light_to_world: Transform,
        fov_deg: Float,
    ) -> Self {
        // the frustum's bounding cone
        let half_diag = (fov_deg.to_radians() / 2.0).tan() * std::f32::consts::SQRT_2;
        let cos_total_width = (1.0 / (1.0 + half_diag * half_diag).sqrt()).min(1.0);
        Self { position, emitted, map, light_to_world, fov_deg, cos_total_width }
    }

    /// Projects a light-space direction onto the slide; None outside the
    /// frustum.
    fn project(&self, local_dir: Vec3f) -> Option<Spectrum> {
        if local_dir.z <= 0.0 {
            return None;
        }
        let tan_half = (self.fov_deg.to_radians() / 2.0).tan();
        let x = local_dir.x / local_dir.z / tan_half;
        let y = local_dir.y / local_dir.z / tan_half;
        if x.abs() > 1.0 || y.abs() > 1.0 {
            return None;
        }
        Some(self.map.lookup(0.5 * (x + 1.0), 0.5 * (1.0 - y)))
    }

    pub fn emit(&self, _ctx: &LightQueryContext, u0: Float, u1: Float) -> Option<EmitResult> {
        // sample the slide uniformly and shoot through it
        let tan_half = (self.fov_deg.to_radians() / 2.0).tan();
        let x = (2.0 * u0 - 1.0) * tan_half;
        let y = (2.0 * u1 - 1.0) * tan_half;
        let local = Vec3f::new(x, y, 1.0).normalize();
        let dir = self.light_to_world.transform_vector(local).normalize();
        let slide = self.project(local)?;
        Some(EmitResult {
            origin: self.position,
            dir,
            radiance: self.emitted * slide,
            emission_pdf_w: uniform_cone_pdf(self.cos_total_width),
            direct_pdf_a: 1.0,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn illuminate(&self, _ctx: &LightQueryContext, p: Point3f) -> Option<IlluminateResult> {
        let to_light = self.position - p;
        let distance_squared = to_light.magnitude2();
        if distance_squared < 1e-12 {
            return None;
        }
        let distance = distance_squared.sqrt();
        let dir = to_light / distance;
        let local = self
            .light_to_world
            .inverse()
            .transform_vector(-dir)
            .normalize();
        let slide = self.project(local)?;
        Some(IlluminateResult {
            dir,
            distance,
            radiance: self.emitted * slide,
            direct_pdf_w: distance_squared,
            emission_pdf_w: uniform_cone_pdf(self.cos_total_width),
            cos_theta_at_light: 1.0,
        })
    }

    pub fn power(&self) -> Float {
        self.emitted.y()
            * self.map.mean_luminance()
            * consts::TWO_PI
            * (1.0 - self.cos_total_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Materials;
    use crate::scene::mesh::TriangleMesh;
    use crate::texture::Textures;

    fn ctx<'a>(
        meshes: &'a [TriangleMesh],
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
    fn test_point_light_inverse_square() {
        let meshes = vec![];
        let mats = Materials::new();
        let texs = Textures::new();
        let c = ctx(&meshes, &mats, &texs);
        let light = PointLight::new(point3f!(0, 2, 0), Spectrum::uniform(4.0 * consts::PI));

        let near = light.illuminate(&c, point3f!(0, 1, 0)).unwrap();
        let far = light.illuminate(&c, point3f!(0, 0, 0)).unwrap();
        // same radiance, but the pdf carries d^2, so contribution falls off
        let near_contrib = near.radiance.y() / near.direct_pdf_w;
        let far_contrib = far.radiance.y() / far.direct_pdf_w;
        approx::assert_relative_eq!(near_contrib / far_contrib, 4.0, max_relative = 1e-4);
    }

    #[test]
    fn test_spot_cone_cuts_off() {
        let meshes = vec![];
        let mats = Materials::new();
        let texs = Textures::new();
        let c = ctx(&meshes, &mats, &texs);
        let light = SpotLight::new(
            point3f!(0, 5, 0),
            point3f!(0, 0, 0),
            Spectrum::WHITE,
            20.0,
            5.0,
        );
        // straight below: inside the cone
        assert!(light.illuminate(&c, point3f!(0, 0, 0)).is_some());
        // far to the side: outside
        assert!(light.illuminate(&c, point3f!(10, 4.9, 0)).is_none());
    }

    #[test]
    fn test_point_emit_covers_sphere() {
        let meshes = vec![];
        let mats = Materials::new();
        let texs = Textures::new();
        let c = ctx(&meshes, &mats, &texs);
        let light = PointLight::new(point3f!(0, 0, 0), Spectrum::WHITE);
        let up = light.emit(&c, 0.0, 0.0).unwrap();
        let down = light.emit(&c, 0.999, 0.5).unwrap();
        assert!(up.dir.z * down.dir.z < 0.0);
        approx::assert_abs_diff_eq!(up.emission_pdf_w, UNIFORM_SPHERE_PDF, epsilon = 1e-7);
    }
}
