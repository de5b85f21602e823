use crate::geometry::Frame;
use crate::light::{EmitResult, IlluminateResult, LightQueryContext};
use crate::sampling::{
    concentric_sample_disk, uniform_cone_pdf, uniform_sample_cone, uniform_sample_sphere,
    UNIFORM_SPHERE_PDF,
};
use crate::spectrum::xyz_to_rgb;
use crate::{consts, Float, Normal3, Point2f, Point3f, Spectrum, Vec3f};
use cgmath::InnerSpace;
use cgmath::num_traits::real::Real;

/// Angular radius of the solar disk, in radians.
const SUN_RADIUS: Float = 0.004_65;

fn perez(lam: &[Float; 5], theta: Float, gamma: Float) -> Float {
    let cos_theta = theta.cos().max(1e-3);
    let cos_gamma = gamma.cos();
    (1.0 + lam[0] * (lam[1] / cos_theta).exp())
        * (1.0 + lam[2] * (lam[3] * gamma).exp() + lam[4] * cos_gamma * cos_gamma)
}

/// Preetham analytic daylight sky.
#[derive(Debug, Clone)]
pub struct SkyLight {
    pub sun_dir: Vec3f,
    pub turbidity: Float,
    pub gain: Spectrum,

    theta_s: Float,
    zenith_y: Float,
    zenith_x: Float,
    zenith_yy: Float,
    perez_y: [Float; 5],
    perez_x: [Float; 5],
    perez_yy: [Float; 5],
}

impl SkyLight {
    pub fn new(sun_dir: Vec3f, turbidity: Float, gain: Spectrum) -> Self {
        let sun_dir = sun_dir.normalize();
        let t = turbidity;
        let theta_s = crate::spherical_theta(sun_dir);

        let chi = (4.0 / 9.0 - t / 120.0) * (consts::PI - 2.0 * theta_s);
        // zenith luminance in kcd/m^2, used as the relative scale
        let zenith_y = ((4.0453 * t - 4.9710) * chi.tan() - 0.2155 * t + 2.4192).max(0.0);

        let t2 = t * t;
        let ts = theta_s;
        let ts2 = ts * ts;
        let ts3 = ts2 * ts;

        let zenith_x = (0.00166 * ts3 - 0.00375 * ts2 + 0.00209 * ts) * t2
            + (-0.02903 * ts3 + 0.06377 * ts2 - 0.03202 * ts + 0.00394) * t
            + (0.11693 * ts3 - 0.21196 * ts2 + 0.06052 * ts + 0.25886);
        let zenith_yy = (0.00275 * ts3 - 0.00610 * ts2 + 0.00317 * ts) * t2
            + (-0.04214 * ts3 + 0.08970 * ts2 - 0.04153 * ts + 0.00516) * t
            + (0.15346 * ts3 - 0.26756 * ts2 + 0.06670 * ts + 0.26688);

        let perez_y = [
            0.1787 * t - 1.4630,
            -0.3554 * t + 0.4275,
            -0.0227 * t + 5.3251,
            0.1206 * t - 2.5771,
            -0.0670 * t + 0.3703,
        ];
        let perez_x = [
            -0.0193 * t - 0.2592,
            -0.0665 * t + 0.0008,
            -0.0004 * t + 0.2125,
            -0.0641 * t - 0.8989,
            -0.0033 * t + 0.0452,
        ];
        let perez_yy = [
            -0.0167 * t - 0.2608,
            -0.0950 * t + 0.0092,
            -0.0079 * t + 0.2102,
            -0.0441 * t - 1.6537,
            -0.0109 * t + 0.0529,
        ];

        Self {
            sun_dir,
            turbidity,
            gain,
            theta_s,
            zenith_y,
            zenith_x,
            zenith_yy,
            perez_y,
            perez_x,
            perez_yy,
        }
    }

    fn sky_radiance(&self, dir: Vec3f) -> Spectrum {
        // the model is defined for the upper hemisphere; clamp below the
        // horizon to the horizon color
        let dir = if dir.z < 0.005 { Vec3f::new(dir.x, dir.y, 0.005).normalize() } else { dir };

        let theta = crate::spherical_theta(dir);
        let gamma = dir.dot(self.sun_dir).min(1.0).max(-1.0).acos();

        let denom_y = perez(&self.perez_y, 0.0, self.theta_s);
        let denom_x = perez(&self.perez_x, 0.0, self.theta_s);
        let denom_yy = perez(&self.perez_yy, 0.0, self.theta_s);

        let y_lum = self.zenith_y * perez(&self.perez_y, theta, gamma) / denom_y;
        let x_chroma = self.zenith_x * perez(&self.perez_x, theta, gamma) / denom_x;
        let y_chroma = self.zenith_yy * perez(&self.perez_yy, theta, gamma) / denom_yy;

        if y_chroma <= 0.0 || y_lum <= 0.0 {
            return Spectrum::BLACK;
        }
        // xyY to XYZ to RGB
        let big_x = x_chroma * (y_lum / y_chroma);
        let big_z = (1.0 - x_chroma - y_chroma) * (y_lum / y_chroma);
        let rgb = xyz_to_rgb([big_x, y_lum, big_z]);
        self.gain * Spectrum::from(rgb).clamp_positive()
    }

    pub fn radiance_along(&self, ctx: &LightQueryContext, dir: Vec3f) -> (Spectrum, Float, Float) {
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);
        (
            self.sky_radiance(dir),
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
        let dir = -uniform_sample_sphere(Point2f::new(u0, u1));
        let frame = Frame::from_normal(Normal3(dir));
        let disk = concentric_sample_disk(Point2f::new(u2, u3)) * ctx.world_radius;
        let origin = ctx.world_center - dir * ctx.world_radius
            + frame.to_world(Vec3f::new(disk.x, disk.y, 0.0));
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);
        Some(EmitResult {
            origin,
            dir,
            radiance: self.sky_radiance(-dir),
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
            radiance: self.sky_radiance(dir),
            direct_pdf_w: UNIFORM_SPHERE_PDF,
            emission_pdf_w: UNIFORM_SPHERE_PDF * disk_pdf,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn power(&self, ctx: &LightQueryContext) -> Float {
        // sample a few directions for a cheap mean radiance estimate
        let mut mean = 0.0;
        const N: usize = 8;
        for i in 0..N {
            let d = uniform_sample_sphere(Point2f::new(
                (i as Float + 0.5) / N as Float,
                ((i * 5 + 3) % N) as Float / N as Float,
            ));
            mean += self.sky_radiance(d).y();
        }
        mean / N as Float * 4.0 * consts::PI * consts::PI * ctx.world_radius * ctx.world_radius
    }
}

/// Ground-albedo-aware variant: the same analytic sky lifted by a diffuse
/// bounce term off the ground color.
#[derive(Debug, Clone)]
pub struct Sky2Light {
    pub inner: SkyLight,
    pub ground_albedo: Spectrum,
}

impl Sky2Light {
    pub fn new(sun_dir: Vec3f, turbidity: Float, gain: Spectrum, ground_albedo: Spectrum) -> Self {
        Self { inner: SkyLight::new(sun_dir, turbidity, gain), ground_albedo }
    }

    fn radiance(&self, dir: Vec3f) -> Spectrum {
        let sky = self.inner.sky_radiance(dir);
        // single diffuse ground bounce approximated against the zenith term
        let ambient = self.ground_albedo * self.inner.sky_radiance(Vec3f::new(0.0, 0.0, 1.0))
            * (0.5 * (1.0 - dir.z.max(0.0)));
        sky + ambient
    }

    pub fn radiance_along(&self, ctx: &LightQueryContext, dir: Vec3f) -> (Spectrum, Float, Float) {
        let (_, direct, emission) = self.inner.radiance_along(ctx, dir);
        (self.radiance(dir), direct, emission)
    }

    pub fn emit(
        &self,
        ctx: &LightQueryContext,
        u0: Float,
        u1: Float,
        u2: Float,
        u3: Float,
    ) -> Option<EmitResult> {
        let mut result = self.inner.emit(ctx, u0, u1, u2, u3)?;
        result.radiance = self.radiance(-result.dir);
        Some(result)
    }

    pub fn illuminate(
        &self,
        ctx: &LightQueryContext,
        p: Point3f,
        u0: Float,
        u1: Float,
    ) -> Option<IlluminateResult> {
        let mut result = self.inner.illuminate(ctx, p, u0, u1)?;
        result.radiance = self.radiance(result.dir);
        Some(result)
    }

    pub fn power(&self, ctx: &LightQueryContext) -> Float {
        self.inner.power(ctx) * (1.0 + self.ground_albedo.y() * 0.5)
    }
}

/// The solar disk, attenuated through the atmosphere by turbidity.
#[derive(Debug, Clone)]
pub struct SunLight {
    pub sun_dir: Vec3f,
    pub turbidity: Float,
    pub gain: Spectrum,
    /// Multiplier on the apparent solar radius.
    pub relative_size: Float,
    cos_theta_max: Float,
    radiance: Spectrum,
}

impl SunLight {
    pub fn new(sun_dir: Vec3f, turbidity: Float, relative_size: Float, gain: Spectrum) -> Self {
        let sun_dir = sun_dir.normalize();
        let cos_theta_max = (SUN_RADIUS * relative_size).cos();

        // relative optical air mass for the sun elevation
        let theta_s = crate::spherical_theta(sun_dir);
        let m = 1.0
            / (theta_s.cos() + 0.15 * (93.885 - theta_s.to_degrees()).max(0.01).powf(-1.253))
                .max(1e-3);

        // Rayleigh and aerosol attenuation per RGB band (wavelengths in um)
        let lambdas = [0.62, 0.555, 0.465];
        let beta = 0.046_08 * turbidity - 0.045_86;
        let mut rgb = [0.0; 3];
        for (i, lambda) in lambdas.iter().enumerate() {
            let tau_r = (-m * 0.008_735 * lambda.powf(-4.08)).exp();
            let tau_a = (-m * beta * lambda.powf(-1.3)).exp();
            rgb[i] = tau_r * tau_a;
        }

        // the disk subtends a tiny solid angle, so the radiance is huge
        let solid_angle = consts::TWO_PI * (1.0 - cos_theta_max);
        const SUN_SCALE: Float = 1000.0;
        let radiance = gain
            * Spectrum::from(rgb)
            * (SUN_SCALE * theta_s.cos().max(0.0) / solid_angle.max(1e-9));

        Self { sun_dir, turbidity, gain, relative_size, cos_theta_max, radiance }
    }

    pub fn radiance_along(&self, ctx: &LightQueryContext, dir: Vec3f) -> (Spectrum, Float, Float) {
        if dir.dot(self.sun_dir) < self.cos_theta_max {
            return (Spectrum::BLACK, 0.0, 0.0);
        }
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);
        let pdf_w = uniform_cone_pdf(self.cos_theta_max);
        (self.radiance, pdf_w, pdf_w * disk_pdf)
    }

    pub fn emit(
        &self,
        ctx: &LightQueryContext,
        u0: Float,
        u1: Float,
        u2: Float,
        u3: Float,
    ) -> Option<EmitResult> {
        let frame = Frame::from_normal(Normal3(-self.sun_dir));
        let dir = frame.to_world(uniform_sample_cone(Point2f::new(u0, u1), self.cos_theta_max));
        let disk = concentric_sample_disk(Point2f::new(u2, u3)) * ctx.world_radius;
        let origin = ctx.world_center - dir * ctx.world_radius
            + frame.to_world(Vec3f::new(disk.x, disk.y, 0.0));
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);
        Some(EmitResult {
            origin,
            dir,
            radiance: self.radiance,
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
        let frame = Frame::from_normal(Normal3(self.sun_dir));
        let dir = frame.to_world(uniform_sample_cone(Point2f::new(u0, u1), self.cos_theta_max));
        let disk_pdf = 1.0 / (consts::PI * ctx.world_radius * ctx.world_radius);
        Some(IlluminateResult {
            dir,
            distance: 2.0 * ctx.world_radius,
            radiance: self.radiance,
            direct_pdf_w: uniform_cone_pdf(self.cos_theta_max),
            emission_pdf_w: uniform_cone_pdf(self.cos_theta_max) * disk_pdf,
            cos_theta_at_light: 1.0,
        })
    }

    pub fn power(&self, ctx: &LightQueryContext) -> Float {
        self.radiance.y()
            * consts::TWO_PI
            * (1.0 - self.cos_theta_max)
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
    fn test_sky_brighter_toward_sun() {
        let sun = vec3f!(0.3, 0.2, 0.93).normalize();
        let sky = SkyLight::new(sun, 2.5, Spectrum::WHITE);
        let toward = sky.sky_radiance(sun).y();
        let away = sky.sky_radiance(vec3f!(-0.3, -0.2, 0.93).normalize()).y();
        assert!(toward > away);
    }

    #[test]
    fn test_sun_only_inside_disk() {
        let meshes = vec![];
        let mats = Materials::new();
        let texs = Textures::new();
        let c = ctx(&meshes, &mats, &texs);
        let sun_dir = vec3f!(0, 0.4, 0.9).normalize();
        let sun = SunLight::new(sun_dir, 2.5, 1.0, Spectrum::WHITE);
        let (hit, _, _) = sun.radiance_along(&c, sun_dir);
        assert!(!hit.is_black());
        let (miss, _, _) = sun.radiance_along(&c, vec3f!(0, 0, 1));
        assert!(miss.is_black());
    }

    #[test]
    fn test_sun_illuminate_within_cone() {
        let meshes = vec![];
        let mats = Materials::new();
        let texs = Textures::new();
        let c = ctx(&meshes, &mats, &texs);
        let sun_dir = vec3f!(0, 0, 1);
        let sun = SunLight::new(sun_dir, 2.5, 1.0, Spectrum::WHITE);
        let ill = sun.illuminate(&c, point3f!(0, 0, 0), 0.4, 0.8).unwrap();
        assert!(ill.dir.dot(sun_dir) >= sun.cos_theta_max - 1e-6);
    }

    #[test]
    fn test_sky2_adds_ground_bounce() {
        let sun = vec3f!(0, 0.3, 0.95).normalize();
        let sky = SkyLight::new(sun, 2.5, Spectrum::WHITE);
        let sky2 = Sky2Light::new(sun, 2.5, Spectrum::WHITE, Spectrum::uniform(0.8));
        let down = vec3f!(0.2, 0.0, -0.98).normalize();
        assert!(sky2.radiance(down).y() >= sky.sky_radiance(down).y());
    }
}
