use crate::bsdf::hitpoint::HitPoint;
use crate::material::{BSDFEvent, BsdfEval, BsdfSample, MaterialBase};
use crate::sampling::cosine_sample_hemisphere;
use crate::texture::{TextureIndex, Textures};
use crate::{consts, Float, Point2f, Spectrum, Vec3f};
use cgmath::InnerSpace;

pub const DEFAULT_COS_EPSILON: Float = 1e-4;

fn signed_cosine_hemisphere(fixed_z: Float, u0: Float, u1: Float) -> Vec3f {
    let mut dir = cosine_sample_hemisphere(Point2f::new(u0, u1));
    if fixed_z < 0.0 {
        dir.z = -dir.z;
    }
    dir
}

/// Lambertian diffuse reflector.
#[derive(Debug, Clone)]
pub struct MatteMaterial {
    pub base: MaterialBase,
    pub kd: TextureIndex,
}

impl MatteMaterial {
    pub fn new(base: MaterialBase, kd: TextureIndex) -> Self {
        Self { base, kd }
    }

    pub fn evaluate(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_light_dir: Vec3f,
        local_eye_dir: Vec3f,
    ) -> Option<BsdfEval> {
        if local_light_dir.z * local_eye_dir.z <= 0.0 {
            return None;
        }
        Some(BsdfEval {
            f: textures.spectrum_value(self.kd, hp).clamp(0.0, 1.0) * consts::FRAC_1_PI,
            event: BSDFEvent::DIFFUSE | BSDFEvent::REFLECT,
            direct_pdf_w: local_light_dir.z.abs() * consts::FRAC_1_PI,
            reverse_pdf_w: local_eye_dir.z.abs() * consts::FRAC_1_PI,
        })
    }

    pub fn sample(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_fixed_dir: Vec3f,
        u0: Float,
        u1: Float,
    ) -> Option<BsdfSample> {
        if local_fixed_dir.z.abs() < DEFAULT_COS_EPSILON {
            return None;
        }
        let sampled_dir = signed_cosine_hemisphere(local_fixed_dir.z, u0, u1);
        let abs_cos_sampled = sampled_dir.z.abs();
        if abs_cos_sampled < DEFAULT_COS_EPSILON {
            return None;
        }
        let pdf_w = abs_cos_sampled * consts::FRAC_1_PI;

        // f·cos/pdf collapses to the albedo for a cosine-sampled lambertian
        Some(BsdfSample {
            sampled_dir,
            f_over_pdf: textures.spectrum_value(self.kd, hp).clamp(0.0, 1.0),
            pdf_w,
            abs_cos_sampled,
            event: BSDFEvent::DIFFUSE | BSDFEvent::REFLECT,
        })
    }

    pub fn pdf(&self, local_light_dir: Vec3f, local_eye_dir: Vec3f) -> (Float, Float) {
        if local_light_dir.z * local_eye_dir.z <= 0.0 {
            return (0.0, 0.0);
        }
        (
            local_light_dir.z.abs() * consts::FRAC_1_PI,
            local_eye_dir.z.abs() * consts::FRAC_1_PI,
        )
    }
}

/// Diffuse reflection plus diffuse transmission, split by the Kr/Kt
/// textures with energy conservation between the two.
#[derive(Debug, Clone)]
pub struct MatteTranslucentMaterial {
    pub base: MaterialBase,
    pub kr: TextureIndex,
    pub kt: TextureIndex,
}

impl MatteTranslucentMaterial {
    pub fn new(base: MaterialBase, kr: TextureIndex, kt: TextureIndex) -> Self {
        Self { base, kr, kt }
    }

    fn reflectances(&self, textures: &Textures, hp: &HitPoint) -> (Spectrum, Spectrum) {
        let r = textures.spectrum_value(self.kr, hp).clamp(0.0, 1.0);
        let t = textures.spectrum_value(self.kt, hp).clamp(0.0, 1.0);
        // transmission may only use energy reflection leaves over
        (r, t * (Spectrum::WHITE - r))
    }

    pub fn evaluate(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_light_dir: Vec3f,
        local_eye_dir: Vec3f,
    ) -> Option<BsdfEval> {
        let (kr, kt) = self.reflectances(textures, hp);
        let is_reflect = local_light_dir.z * local_eye_dir.z > 0.0;

        let f = if is_reflect { kr } else { kt };
        if f.is_black() {
            return None;
        }
        Some(BsdfEval {
            f: f * consts::FRAC_1_PI,
            event: if is_reflect {
                BSDFEvent::DIFFUSE | BSDFEvent::REFLECT
            } else {
                BSDFEvent::DIFFUSE | BSDFEvent::TRANSMIT
            },
            direct_pdf_w: 0.5 * local_light_dir.z.abs() * consts::FRAC_1_PI,
            reverse_pdf_w: 0.5 * local_eye_dir.z.abs() * consts::FRAC_1_PI,
        })
    }

    pub fn sample(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_fixed_dir: Vec3f,
        u0: Float,
        u1: Float,
        pass_through_event: Float,
    ) -> Option<BsdfSample> {
        if local_fixed_dir.z.abs() < DEFAULT_COS_EPSILON {
            return None;
        }
        let (kr, kt) = self.reflectances(textures, hp);

        let mut sampled_dir = signed_cosine_hemisphere(local_fixed_dir.z, u0, u1);
        let reflect = pass_through_event < 0.5;
        if !reflect {
            sampled_dir.z = -sampled_dir.z;
        }
        let abs_cos_sampled = sampled_dir.z.abs();
        if abs_cos_sampled < DEFAULT_COS_EPSILON {
            return None;
        }
        let pdf_w = 0.5 * abs_cos_sampled * consts::FRAC_1_PI;

        let (f, event) = if reflect {
            (kr, BSDFEvent::DIFFUSE | BSDFEvent::REFLECT)
        } else {
            (kt, BSDFEvent::DIFFUSE | BSDFEvent::TRANSMIT)
        };
        if f.is_black() {
            return None;
        }

        Some(BsdfSample {
            sampled_dir,
            f_over_pdf: f * 2.0,
            pdf_w,
            abs_cos_sampled,
            event,
        })
    }

    pub fn pdf(
        &self,
        _textures: &Textures,
        _hp: &HitPoint,
        local_light_dir: Vec3f,
        local_eye_dir: Vec3f,
    ) -> (Float, Float) {
        (
            0.5 * local_light_dir.z.abs() * consts::FRAC_1_PI,
            0.5 * local_eye_dir.z.abs() * consts::FRAC_1_PI,
        )
    }
}

/// Koenderink-style velvet: a thin scattering layer over a dark base,
/// with a clamped polynomial phase function.
#[derive(Debug, Clone)]
pub struct VelvetMaterial {
    pub base: MaterialBase,
    pub kd: TextureIndex,
    pub p1: TextureIndex,
    pub p2: TextureIndex,
    pub p3: TextureIndex,
    pub thickness: TextureIndex,
}

impl VelvetMaterial {
    fn phase(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        dir1: Vec3f,
        dir2: Vec3f,
        cos_out: Float,
    ) -> Float {
        let a1 = textures.float_value(self.p1, hp);
        let a2 = textures.float_value(self.p2, hp);
        let a3 = textures.float_value(self.p3, hp);
        let delta = textures.float_value(self.thickness, hp);

        let cosv = -dir1.dot(dir2);
        let b = 3.0 * cosv;
        let mut p = 1.0 + a1 * cosv + a2 * 0.5 * (b * cosv - 1.0) + a3 * 0.5 * (5.0 * cosv * cosv * cosv - b);
        p /= 4.0 * consts::PI;
        p = (p * delta) / cos_out.abs();
        p.min(1.0).max(0.0)
    }

    pub fn evaluate(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_light_dir: Vec3f,
        local_eye_dir: Vec3f,
    ) -> Option<BsdfEval> {
        if local_light_dir.z * local_eye_dir.z <= 0.0 {
            return None;
        }
        let p = self.phase(textures, hp, local_light_dir, local_eye_dir, local_eye_dir.z);
        Some(BsdfEval {
            f: textures.spectrum_value(self.kd, hp).clamp(0.0, 1.0) * (p / local_light_dir.z.abs()),
            event: BSDFEvent::DIFFUSE | BSDFEvent::REFLECT,
            direct_pdf_w: local_light_dir.z.abs() * consts::FRAC_1_PI,
            reverse_pdf_w: local_eye_dir.z.abs() * consts::FRAC_1_PI,
        })
    }

    pub fn sample(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_fixed_dir: Vec3f,
        u0: Float,
        u1: Float,
    ) -> Option<BsdfSample> {
        if local_fixed_dir.z.abs() < DEFAULT_COS_EPSILON {
            return None;
        }
        let sampled_dir = signed_cosine_hemisphere(local_fixed_dir.z, u0, u1);
        let abs_cos_sampled = sampled_dir.z.abs();
        if abs_cos_sampled < DEFAULT_COS_EPSILON {
            return None;
        }
        let pdf_w = abs_cos_sampled * consts::FRAC_1_PI;
        let p = self.phase(textures, hp, local_fixed_dir, sampled_dir, abs_cos_sampled);

        Some(BsdfSample {
            sampled_dir,
            f_over_pdf: textures.spectrum_value(self.kd, hp).clamp(0.0, 1.0) * (p / pdf_w),
            pdf_w,
            abs_cos_sampled,
            event: BSDFEvent::DIFFUSE | BSDFEvent::REFLECT,
        })
    }

    pub fn pdf(&self, local_light_dir: Vec3f, local_eye_dir: Vec3f) -> (Float, Float) {
        if local_light_dir.z * local_eye_dir.z <= 0.0 {
            return (0.0, 0.0);
        }
        (
            local_light_dir.z.abs() * consts::FRAC_1_PI,
            local_eye_dir.z.abs() * consts::FRAC_1_PI,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::Texture;
    use cgmath::InnerSpace;

    fn setup() -> (Textures, MatteMaterial) {
        let mut texs = Textures::new();
        let kd = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.6)));
        (texs, MatteMaterial::new(MaterialBase::default(), kd))
    }

    #[test]
    fn test_matte_eval_reciprocal() {
        let (texs, matte) = setup();
        let hp = HitPoint::test_default();
        let wi = vec3f!(0.3, 0.1, 0.9).normalize();
        let wo = vec3f!(-0.2, 0.4, 0.7).normalize();
        let a = matte.evaluate(&texs, &hp, wi, wo).unwrap();
        let b = matte.evaluate(&texs, &hp, wo, wi).unwrap();
        approx::assert_abs_diff_eq!(a.f.r(), b.f.r(), epsilon = 1e-6);
        approx::assert_abs_diff_eq!(a.direct_pdf_w, b.reverse_pdf_w, epsilon = 1e-6);
    }

    #[test]
    fn test_matte_eval_rejects_opposite_hemispheres() {
        let (texs, matte) = setup();
        let hp = HitPoint::test_default();
        assert!(matte
            .evaluate(&texs, &hp, vec3f!(0, 0, 1), vec3f!(0, 0, -1))
            .is_none());
    }

    #[test]
    fn test_matte_sample_pdf_agrees_with_pdf_query() {
        let (texs, matte) = setup();
        let hp = HitPoint::test_default();
        let fixed = vec3f!(0.1, -0.3, 0.95).normalize();
        let s = matte.sample(&texs, &hp, fixed, 0.42, 0.77).unwrap();
        let (direct, _) = matte.pdf(s.sampled_dir, fixed);
        approx::assert_abs_diff_eq!(s.pdf_w, direct, epsilon = 1e-6);
    }

    #[test]
    fn test_matte_sample_weight_is_albedo() {
        let (texs, matte) = setup();
        let hp = HitPoint::test_default();
        let s = matte.sample(&texs, &hp, vec3f!(0, 0, 1), 0.3, 0.6).unwrap();
        approx::assert_abs_diff_eq!(s.f_over_pdf.r(), 0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_translucent_transmits_into_other_hemisphere() {
        let mut texs = Textures::new();
        let kr = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.3)));
        let kt = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.7)));
        let mat = MatteTranslucentMaterial::new(MaterialBase::default(), kr, kt);
        let hp = HitPoint::test_default();
        let s = mat.sample(&texs, &hp, vec3f!(0, 0, 1), 0.5, 0.5, 0.9).unwrap();
        assert!(s.sampled_dir.z < 0.0);
        assert!(s.event.contains(BSDFEvent::TRANSMIT));
    }
}
