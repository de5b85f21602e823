use crate::bsdf::hitpoint::HitPoint;
use crate::material::fresnel::fresnel_dielectric;
use crate::material::matte::DEFAULT_COS_EPSILON;
use crate::material::microfacet;
use crate::material::{BSDFEvent, BsdfEval, BsdfSample, MaterialBase};
use crate::texture::{TextureIndex, Textures};
use crate::{Float, Vec3f};
use cgmath::InnerSpace;

/// Dielectric with a Schlick microfacet distribution on both sides of the
/// boundary; anisotropy comes from the `(nu, nv)` roughness pair.
#[derive(Debug, Clone)]
pub struct RoughGlassMaterial {
    pub base: MaterialBase,
    pub kr: TextureIndex,
    pub kt: TextureIndex,
    pub exterior_ior: TextureIndex,
    pub interior_ior: TextureIndex,
    pub nu: TextureIndex,
    pub nv: TextureIndex,
}

impl RoughGlassMaterial {
    pub fn new(
        base: MaterialBase,
        kr: TextureIndex,
        kt: TextureIndex,
        exterior_ior: TextureIndex,
        interior_ior: TextureIndex,
        nu: TextureIndex,
        nv: TextureIndex,
    ) -> Self {
        Self { base, kr, kt, exterior_ior, interior_ior, nu, nv }
    }

    fn roughness(&self, textures: &Textures, hp: &HitPoint) -> (Float, Float) {
        microfacet::roughness_anisotropy(
            textures.float_value(self.nu, hp),
            textures.float_value(self.nv, hp),
        )
    }

    fn iors(&self, textures: &Textures, hp: &HitPoint) -> (Float, Float) {
        (
            textures.float_value(self.exterior_ior, hp),
            textures.float_value(self.interior_ior, hp),
        )
    }

    pub fn evaluate(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_light_dir: Vec3f,
        local_eye_dir: Vec3f,
    ) -> Option<BsdfEval> {
        let (roughness, anisotropy) = self.roughness(textures, hp);
        let (nc, nt) = self.iors(textures, hp);

        let cos_i = local_light_dir.z;
        let cos_o = local_eye_dir.z;
        if cos_i.abs() < DEFAULT_COS_EPSILON || cos_o.abs() < DEFAULT_COS_EPSILON {
            return None;
        }

        if cos_i * cos_o < 0.0 {
            // transmission through the boundary
            let entering = cos_i > 0.0;
            let eta = if entering { nc / nt } else { nt / nc };

            let wh = (local_light_dir * eta + local_eye_dir).normalize();
            let wh = if wh.z < 0.0 { -wh } else { wh };

            let light_dot_h = local_light_dir.dot(wh);
            let eye_dot_h = local_eye_dir.dot(wh);
            let sqrt_denom = light_dot_h * eta + eye_dot_h;
            if sqrt_denom.abs() < 1e-6 {
                return None;
            }

            let d = microfacet::distribution_d(roughness, wh, anisotropy);
            let g = microfacet::distribution_g(roughness, local_eye_dir, local_light_dir);
            let fr = fresnel_dielectric(eye_dot_h, nc, nt);

            let f = (1.0 - fr)
                * (d * g / (cos_i * cos_o).abs()
                    * (light_dot_h * eye_dot_h / (sqrt_denom * sqrt_denom)).abs());
            if f <= 0.0 {
                return None;
            }

            let dwh_dwi = (eta * eta * light_dot_h / (sqrt_denom * sqrt_denom)).abs();
            let dwh_dwo = (eye_dot_h / (sqrt_denom * sqrt_denom)).abs();
            let pdf_h = microfacet::distribution_pdf(roughness, wh, anisotropy);

            Some(BsdfEval {
                f: textures.spectrum_value(self.kt, hp).clamp(0.0, 1.0) * f,
                event: BSDFEvent::GLOSSY | BSDFEvent::TRANSMIT,
                direct_pdf_w: pdf_h * dwh_dwi,
                reverse_pdf_w: pdf_h * dwh_dwo,
            })
        } else {
            // reflection on either side
            let wh = local_light_dir + local_eye_dir;
            if wh.magnitude2() < 1e-12 {
                return None;
            }
            let wh = wh.normalize();
            let wh = if wh.z < 0.0 { -wh } else { wh };

            let d = microfacet::distribution_d(roughness, wh, anisotropy);
            let g = microfacet::distribution_g(roughness, local_eye_dir, local_light_dir);
            let fr = fresnel_dielectric(local_eye_dir.dot(wh), nc, nt);
            let f = d * g * fr / (4.0 * (cos_i * cos_o).abs());

            let pdf_h = microfacet::distribution_pdf(roughness, wh, anisotropy);
            let direct = pdf_h / (4.0 * local_light_dir.dot(wh).abs().max(1e-6));
            let reverse = pdf_h / (4.0 * local_eye_dir.dot(wh).abs().max(1e-6));

            Some(BsdfEval {
                f: textures.spectrum_value(self.kr, hp).clamp(0.0, 1.0) * f,
                event: BSDFEvent::GLOSSY | BSDFEvent::REFLECT,
                direct_pdf_w: direct,
                reverse_pdf_w: reverse,
            })
        }
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
        let (roughness, anisotropy) = self.roughness(textures, hp);
        let (nc, nt) = self.iors(textures, hp);

        let (wh, _, pdf_h) = microfacet::sample_h(roughness, anisotropy, u0, u1);
        if pdf_h <= 0.0 {
            return None;
        }
        let wh = if wh.z * local_fixed_dir.z < 0.0 { -wh } else { wh };
        let cos_wh = local_fixed_dir.dot(wh);
        if cos_wh <= 0.0 {
            return None;
        }

        let threshold = fresnel_dielectric(cos_wh, nc, nt);

        if pass_through_event < threshold {
            // reflect about the sampled half vector
            let sampled_dir = 2.0 * cos_wh * wh - local_fixed_dir;
            if sampled_dir.z * local_fixed_dir.z <= 0.0 {
                return None;
            }
            let eval = self.evaluate(textures, hp, sampled_dir, local_fixed_dir)?;
            let pdf_w = eval.direct_pdf_w * threshold;
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
        } else {
            // refract through the sampled half vector
            let entering = local_fixed_dir.z > 0.0;
            let eta = if entering { nc / nt } else { nt / nc };
            let sin2_t = eta * eta * (1.0 - cos_wh * cos_wh);
            if sin2_t >= 1.0 {
                return None;
            }
            let cos_t = (1.0 - sin2_t).sqrt();
            let sampled_dir = (eta * cos_wh - cos_t) * wh - eta * local_fixed_dir;
            if sampled_dir.z * local_fixed_dir.z >= 0.0 {
                return None;
            }

            let eval = self.evaluate(textures, hp, sampled_dir, local_fixed_dir)?;
            let pdf_w = eval.direct_pdf_w * (1.0 - threshold);
            if pdf_w <= 0.0 {
                return None;
            }
            let abs_cos_sampled = sampled_dir.z.abs();
            let radiance_factor = if hp.from_light { 1.0 } else { eta * eta };
            Some(BsdfSample {
                sampled_dir,
                f_over_pdf: eval.f * (radiance_factor * abs_cos_sampled / pdf_w),
                pdf_w,
                abs_cos_sampled,
                event: BSDFEvent::GLOSSY | BSDFEvent::TRANSMIT,
            })
        }
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

    fn setup() -> (Textures, RoughGlassMaterial) {
        let mut texs = Textures::new();
        let white = texs.add(Texture::ConstSpectrum(Spectrum::WHITE));
        let nc = texs.add(Texture::ConstFloat(1.0));
        let nt = texs.add(Texture::ConstFloat(1.5));
        let rough = texs.add(Texture::ConstFloat(0.2));
        let mat = RoughGlassMaterial::new(MaterialBase::default(), white, white, nc, nt, rough, rough);
        (texs, mat)
    }

    #[test]
    fn test_sample_stays_consistent_with_pdf() {
        let (texs, mat) = setup();
        let hp = HitPoint::test_default();
        let fixed = vec3f!(0.2, -0.1, 0.97).normalize();
        if let Some(s) = mat.sample(&texs, &hp, fixed, 0.6, 0.3, 0.01) {
            let (direct, _) = mat.pdf(&texs, &hp, s.sampled_dir, fixed);
            // sampled pdf carries the branch probability on top of the
            // half-vector density
            assert!(s.pdf_w <= direct + 1e-4);
            assert!(s.pdf_w > 0.0);
        }
    }

    #[test]
    fn test_transmission_flips_hemisphere() {
        let (texs, mat) = setup();
        let hp = HitPoint::test_default();
        let fixed = vec3f!(0.1, 0.0, 0.995).normalize();
        if let Some(s) = mat.sample(&texs, &hp, fixed, 0.5, 0.5, 0.97) {
            assert!(s.event.contains(BSDFEvent::TRANSMIT));
            assert!(s.sampled_dir.z < 0.0);
        }
    }
}
