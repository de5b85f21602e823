use crate::bsdf::hitpoint::HitPoint;
use crate::material::fresnel::fresnel_conductor;
use crate::material::matte::DEFAULT_COS_EPSILON;
use crate::material::microfacet;
use crate::material::{BSDFEvent, BsdfEval, BsdfSample, MaterialBase};
use crate::texture::{TextureIndex, Textures};
use crate::{Float, Vec3f};
use cgmath::InnerSpace;

/// Microfacet conductor driven by a full complex IOR `(eta, k)`.
#[derive(Debug, Clone)]
pub struct Metal2Material {
    pub base: MaterialBase,
    pub eta: TextureIndex,
    pub k: TextureIndex,
    pub nu: TextureIndex,
    pub nv: TextureIndex,
}

impl Metal2Material {
    pub fn new(base: MaterialBase, eta: TextureIndex, k: TextureIndex, nu: TextureIndex, nv: TextureIndex) -> Self {
        Self { base, eta, k, nu, nv }
    }

    fn roughness(&self, textures: &Textures, hp: &HitPoint) -> (Float, Float) {
        microfacet::roughness_anisotropy(
            textures.float_value(self.nu, hp),
            textures.float_value(self.nv, hp),
        )
    }

    pub fn evaluate(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_light_dir: Vec3f,
        local_eye_dir: Vec3f,
    ) -> Option<BsdfEval> {
        let cos_i = local_light_dir.z;
        let cos_o = local_eye_dir.z;
        if cos_i * cos_o <= 0.0 || cos_i.abs() < DEFAULT_COS_EPSILON || cos_o.abs() < DEFAULT_COS_EPSILON {
            return None;
        }

        let wh = local_light_dir + local_eye_dir;
        if wh.magnitude2() < 1e-12 {
            return None;
        }
        let wh = wh.normalize();
        let wh = if wh.z < 0.0 { -wh } else { wh };

        let (roughness, anisotropy) = self.roughness(textures, hp);
        let d = microfacet::distribution_d(roughness, wh, anisotropy);
        let g = microfacet::distribution_g(roughness, local_eye_dir, local_light_dir);
        let fr = fresnel_conductor(
            local_eye_dir.dot(wh),
            textures.spectrum_value(self.eta, hp),
            textures.spectrum_value(self.k, hp),
        );

        let pdf_h = microfacet::distribution_pdf(roughness, wh, anisotropy);
        Some(BsdfEval {
            f: fr * (d * g / (4.0 * (cos_i * cos_o).abs())),
            event: BSDFEvent::GLOSSY | BSDFEvent::REFLECT,
            direct_pdf_w: pdf_h / (4.0 * local_light_dir.dot(wh).abs().max(1e-6)),
            reverse_pdf_w: pdf_h / (4.0 * local_eye_dir.dot(wh).abs().max(1e-6)),
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
        let (roughness, anisotropy) = self.roughness(textures, hp);
        let (wh, _, pdf_h) = microfacet::sample_h(roughness, anisotropy, u0, u1);
        if pdf_h <= 0.0 {
            return None;
        }
        let wh = if wh.z * local_fixed_dir.z < 0.0 { -wh } else { wh };
        let cos_wh = local_fixed_dir.dot(wh);
        if cos_wh <= 0.0 {
            return None;
        }

        let sampled_dir = 2.0 * cos_wh * wh - local_fixed_dir;
        if sampled_dir.z * local_fixed_dir.z <= 0.0 {
            return None;
        }

        let eval = self.evaluate(textures, hp, sampled_dir, local_fixed_dir)?;
        let pdf_w = eval.direct_pdf_w;
        if pdf_w <= 0.0 {
            return None;
        }
        let abs_cos_sampled = sampled_dir.z.abs();
        Some(BsdfSample {
            sampled_dir,
            f_over_pdf: eval.f * (abs_cos_sampled / pdf_w),
            pdf_w,
            abs_cos_sampled,
            event: BSDFEvent::GLOSSY | BSDFEvent::REFLECT,
        })
    }

    pub fn pdf(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_light_dir: Vec3f,
        local_eye_dir: Vec3f,
    ) -> (Float, Float) {
        match self.evaluate(textures, hp, local_light_dir, local_eye_dir) {
            Some(eval) => (eval.direct_pdf_w, eval.reverse_pdf_w),
            None => (0.0, 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::Texture;
    use crate::Spectrum;

    fn gold() -> (Textures, Metal2Material) {
        let mut texs = Textures::new();
        let eta = texs.add(Texture::ConstSpectrum(Spectrum::new(0.143, 0.375, 1.442)));
        let k = texs.add(Texture::ConstSpectrum(Spectrum::new(3.983, 2.386, 1.603)));
        let rough = texs.add(Texture::ConstFloat(0.1));
        (texs, Metal2Material::new(MaterialBase::default(), eta, k, rough, rough))
    }

    #[test]
    fn test_metal_never_transmits() {
        let (texs, metal) = gold();
        let hp = HitPoint::test_default();
        assert!(metal
            .evaluate(&texs, &hp, vec3f!(0, 0, 1), vec3f!(0, 0, -1))
            .is_none());
    }

    #[test]
    fn test_metal_sample_reflects_into_same_hemisphere() {
        let (texs, metal) = gold();
        let hp = HitPoint::test_default();
        let fixed = vec3f!(0.3, 0.2, 0.93).normalize();
        if let Some(s) = metal.sample(&texs, &hp, fixed, 0.4, 0.9) {
            assert!(s.sampled_dir.z > 0.0);
            assert!(s.event.contains(BSDFEvent::REFLECT));
        }
    }
}
