use crate::bsdf::hitpoint::HitPoint;
use crate::material::fresnel::fresnel_dielectric;
use crate::material::matte::DEFAULT_COS_EPSILON;
use crate::material::{BSDFEvent, BsdfSample, MaterialBase};
use crate::texture::{TextureIndex, Textures};
use crate::{Float, Spectrum, Vec3f};

/// Perfect specular reflector.
#[derive(Debug, Clone)]
pub struct MirrorMaterial {
    pub base: MaterialBase,
    pub kr: TextureIndex,
}

impl MirrorMaterial {
    pub fn new(base: MaterialBase, kr: TextureIndex) -> Self {
        Self { base, kr }
    }

    pub fn sample(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_fixed_dir: Vec3f,
    ) -> Option<BsdfSample> {
        if local_fixed_dir.z.abs() < DEFAULT_COS_EPSILON {
            return None;
        }
        let sampled_dir = Vec3f::new(-local_fixed_dir.x, -local_fixed_dir.y, local_fixed_dir.z);
        Some(BsdfSample {
            sampled_dir,
            f_over_pdf: textures.spectrum_value(self.kr, hp).clamp(0.0, 1.0),
            pdf_w: 1.0,
            abs_cos_sampled: sampled_dir.z.abs(),
            event: BSDFEvent::SPECULAR | BSDFEvent::REFLECT,
        })
    }
}

/// Refraction state shared by the glass variants.
struct FresnelSplit {
    /// Probability of taking the reflection branch.
    threshold: Float,
    /// Relative IOR for the refracted direction (incident over transmitted).
    eta: Float,
    cos_theta_t: Float,
}

fn fresnel_split(local_fixed_dir: Vec3f, nc: Float, nt: Float) -> FresnelSplit {
    let entering = local_fixed_dir.z > 0.0;
    let (eta_i, eta_t) = if entering { (nc, nt) } else { (nt, nc) };
    let eta = eta_i / eta_t;

    let cos_i = local_fixed_dir.z.abs();
    let sin2_t = eta * eta * (1.0 - cos_i * cos_i);
    if sin2_t >= 1.0 {
        // total internal reflection
        return FresnelSplit { threshold: 1.0, eta, cos_theta_t: 0.0 };
    }
    let cos_theta_t = (1.0 - sin2_t).sqrt();
    FresnelSplit {
        threshold: fresnel_dielectric(cos_i, eta_i, eta_t),
        eta,
        cos_theta_t,
    }
}

/// Smooth dielectric with specular reflection and refraction.
#[derive(Debug, Clone)]
pub struct GlassMaterial {
    pub base: MaterialBase,
    pub kr: TextureIndex,
    pub kt: TextureIndex,
    pub exterior_ior: TextureIndex,
    pub interior_ior: TextureIndex,
}

impl GlassMaterial {
    pub fn new(
        base: MaterialBase,
        kr: TextureIndex,
        kt: TextureIndex,
        exterior_ior: TextureIndex,
        interior_ior: TextureIndex,
    ) -> Self {
        Self { base, kr, kt, exterior_ior, interior_ior }
    }

    pub fn sample(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_fixed_dir: Vec3f,
        pass_through_event: Float,
    ) -> Option<BsdfSample> {
        if local_fixed_dir.z.abs() < DEFAULT_COS_EPSILON {
            return None;
        }
        let nc = textures.float_value(self.exterior_ior, hp);
        let nt = textures.float_value(self.interior_ior, hp);
        let split = fresnel_split(local_fixed_dir, nc, nt);

        if pass_through_event < split.threshold {
            // reflect
            let sampled_dir = Vec3f::new(-local_fixed_dir.x, -local_fixed_dir.y, local_fixed_dir.z);
            Some(BsdfSample {
                sampled_dir,
                f_over_pdf: textures.spectrum_value(self.kr, hp).clamp(0.0, 1.0),
                pdf_w: split.threshold,
                abs_cos_sampled: sampled_dir.z.abs(),
                event: BSDFEvent::SPECULAR | BSDFEvent::REFLECT,
            })
        } else {
            // refract
            let z_sign = if local_fixed_dir.z > 0.0 { 1.0 } else { -1.0 };
            let sampled_dir = Vec3f::new(
                -split.eta * local_fixed_dir.x,
                -split.eta * local_fixed_dir.y,
                -z_sign * split.cos_theta_t,
            );
            // radiance transport squeezes by the squared relative IOR
            let radiance_factor = if hp.from_light { 1.0 } else { split.eta * split.eta };
            Some(BsdfSample {
                sampled_dir,
                f_over_pdf: textures.spectrum_value(self.kt, hp).clamp(0.0, 1.0) * radiance_factor,
                pdf_w: 1.0 - split.threshold,
                abs_cos_sampled: sampled_dir.z.abs(),
                event: BSDFEvent::SPECULAR | BSDFEvent::TRANSMIT,
            })
        }
    }
}

/// Architectural glass: specular reflection, but transmission leaves the ray
/// direction unchanged so thin windows neither bend nor doubly-refract.
#[derive(Debug, Clone)]
pub struct ArchGlassMaterial {
    pub base: MaterialBase,
    pub kr: TextureIndex,
    pub kt: TextureIndex,
    pub exterior_ior: TextureIndex,
    pub interior_ior: TextureIndex,
}

impl ArchGlassMaterial {
    pub fn new(
        base: MaterialBase,
        kr: TextureIndex,
        kt: TextureIndex,
        exterior_ior: TextureIndex,
        interior_ior: TextureIndex,
    ) -> Self {
        Self { base, kr, kt, exterior_ior, interior_ior }
    }

    fn split(&self, textures: &Textures, hp: &HitPoint, local_fixed_dir: Vec3f) -> FresnelSplit {
        let nc = textures.float_value(self.exterior_ior, hp);
        let nt = textures.float_value(self.interior_ior, hp);
        fresnel_split(local_fixed_dir, nc, nt)
    }

    pub fn sample(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_fixed_dir: Vec3f,
        pass_through_event: Float,
    ) -> Option<BsdfSample> {
        if local_fixed_dir.z.abs() < DEFAULT_COS_EPSILON {
            return None;
        }
        let split = self.split(textures, hp, local_fixed_dir);

        if pass_through_event < split.threshold {
            let sampled_dir = Vec3f::new(-local_fixed_dir.x, -local_fixed_dir.y, local_fixed_dir.z);
            Some(BsdfSample {
                sampled_dir,
                f_over_pdf: textures.spectrum_value(self.kr, hp).clamp(0.0, 1.0),
                pdf_w: split.threshold,
                abs_cos_sampled: sampled_dir.z.abs(),
                event: BSDFEvent::SPECULAR | BSDFEvent::REFLECT,
            })
        } else {
            let sampled_dir = -local_fixed_dir;
            Some(BsdfSample {
                sampled_dir,
                f_over_pdf: textures.spectrum_value(self.kt, hp).clamp(0.0, 1.0),
                pdf_w: 1.0 - split.threshold,
                abs_cos_sampled: sampled_dir.z.abs(),
                event: BSDFEvent::SPECULAR | BSDFEvent::TRANSMIT,
            })
        }
    }

    /// Non-black exactly when the pass-through event lands in the
    /// transmission branch, so the same vertex answers consistently across
    /// queries.
    pub fn pass_through_transparency(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_fixed_dir: Vec3f,
    ) -> Spectrum {
        let split = self.split(textures, hp, local_fixed_dir);
        if hp.pass_through_event < split.threshold {
            Spectrum::BLACK
        } else {
            textures.spectrum_value(self.kt, hp).clamp(0.0, 1.0)
        }
    }
}

/// Invisible surface: used for cut-outs and as volume boundaries.
#[derive(Debug, Clone)]
pub struct NullMaterial {
    pub base: MaterialBase,
    pub transparency: Option<TextureIndex>,
}

impl NullMaterial {
    pub fn new(base: MaterialBase) -> Self {
        Self { base, transparency: None }
    }

    pub fn transparency(&self, textures: &Textures, hp: &HitPoint) -> Spectrum {
        match self.transparency {
            Some(tex) => textures.spectrum_value(tex, hp).clamp(0.0, 1.0),
            None => Spectrum::WHITE,
        }
    }
}
