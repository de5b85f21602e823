use crate::bsdf::hitpoint::HitPoint;
use crate::material::fresnel::schlick_fresnel;
use crate::material::matte::DEFAULT_COS_EPSILON;
use crate::material::microfacet;
use crate::material::{BSDFEvent, BsdfEval, BsdfSample, MaterialBase};
use crate::sampling::cosine_sample_hemisphere;
use crate::texture::{TextureIndex, Textures};
use crate::{consts, Float, Point2f, Spectrum, Vec3f};
use cgmath::InnerSpace;

/// Energy balance between a Schlick-fresnel coating lobe and the lobe
/// underneath it, shared by the glossy and car-paint materials.
pub(crate) fn coating_weight(ks: Spectrum, fixed_dir: Vec3f) -> Float {
    // importance-sample the coating proportionally to its reflectance
    let s = schlick_fresnel(ks, fixed_dir.z.abs());
    (0.5 * (1.0 + s.filter())).min(0.9999).max(0.0001)
}

pub(crate) fn coating_f(
    ks: Spectrum,
    roughness: Float,
    anisotropy: Float,
    multibounce: bool,
    fixed_dir: Vec3f,
    sampled_dir: Vec3f,
) -> Spectrum {
    let cos_o = fixed_dir.z.abs();
    let cos_i = sampled_dir.z.abs();
    let wh = (fixed_dir + sampled_dir).normalize();
    let s = schlick_fresnel(ks, sampled_dir.dot(wh).abs());

    let d = microfacet::distribution_d(roughness, wh, anisotropy);
    let g = microfacet::distribution_g(roughness, fixed_dir, sampled_dir);

    // the coupled model divides by 4·cosOut only; the optional term models
    // light that bounces between microfacets before escaping
    let factor = d * g / (4.0 * cos_o)
        + if multibounce {
            cos_i * ((1.0 - g) / (4.0 * cos_o * cos_i)).min(1.0).max(0.0)
        } else {
            0.0
        };
    s * factor
}

pub(crate) fn coating_pdf(roughness: Float, anisotropy: Float, fixed_dir: Vec3f, sampled_dir: Vec3f) -> Float {
    let wh = (fixed_dir + sampled_dir).normalize();
    microfacet::distribution_pdf(roughness, wh, anisotropy)
        / (4.0 * fixed_dir.dot(wh).abs().max(1e-6))
}

pub(crate) fn coating_absorption(cos_i: Float, cos_o: Float, alpha: Spectrum, depth: Float) -> Spectrum {
    if depth > 0.0 {
        // Beer's law through the coating layer, both ways
        let depth_factor = depth * (cos_i + cos_o) / (cos_i * cos_o);
        (alpha * -depth_factor).exp()
    } else {
        Spectrum::WHITE
    }
}

/// Diffuse base coated by a Schlick microfacet layer with optional
/// absorption in between.
#[derive(Debug, Clone)]
pub struct Glossy2Material {
    pub base: MaterialBase,
    pub kd: TextureIndex,
    pub ks: TextureIndex,
    pub nu: TextureIndex,
    pub nv: TextureIndex,
    pub ka: TextureIndex,
    pub depth: TextureIndex,
    pub multibounce: bool,
}

impl Glossy2Material {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base: MaterialBase,
        kd: TextureIndex,
        ks: TextureIndex,
        nu: TextureIndex,
        nv: TextureIndex,
        ka: TextureIndex,
        depth: TextureIndex,
        multibounce: bool,
    ) -> Self {
        Self { base, kd, ks, nu, nv, ka, depth, multibounce }
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
        if local_light_dir.z * local_eye_dir.z <= 0.0 {
            return None;
        }
        let (fixed_dir, sampled_dir) = if hp.from_light {
            (local_light_dir, local_eye_dir)
        } else {
            (local_eye_dir, local_light_dir)
        };

        let base_f = textures.spectrum_value(self.kd, hp).clamp(0.0, 1.0) * consts::FRAC_1_PI;

        if fixed_dir.z < 0.0 {
            // back face: no coating below the substrate
            return Some(BsdfEval {
                f: base_f,
                event: BSDFEvent::DIFFUSE | BSDFEvent::REFLECT,
                direct_pdf_w: sampled_dir.z.abs() * consts::FRAC_1_PI,
                reverse_pdf_w: fixed_dir.z.abs() * consts::FRAC_1_PI,
            });
        }

        let ks = textures.spectrum_value(self.ks, hp).clamp(0.0, 1.0);
        let (roughness, anisotropy) = self.roughness(textures, hp);

        let w_coating = coating_weight(ks, fixed_dir);
        let w_base = 1.0 - w_coating;

        let direct_pdf_w = w_base * sampled_dir.z.abs() * consts::FRAC_1_PI
            + w_coating * coating_pdf(roughness, anisotropy, fixed_dir, sampled_dir);
        let reverse_pdf_w = w_base * fixed_dir.z.abs() * consts::FRAC_1_PI
            + w_coating * coating_pdf(roughness, anisotropy, sampled_dir, fixed_dir);

        let wh = (fixed_dir + sampled_dir).normalize();
        let s = schlick_fresnel(ks, sampled_dir.dot(wh).abs());

        let alpha = textures.spectrum_value(self.ka, hp).clamp_positive();
        let depth = textures.float_value(self.depth, hp);
        let absorption = coating_absorption(sampled_dir.z.abs(), fixed_dir.z.abs(), alpha, depth);

        let coating = coating_f(ks, roughness, anisotropy, self.multibounce, fixed_dir, sampled_dir);

        Some(BsdfEval {
            f: coating + absorption * (Spectrum::WHITE - s) * base_f,
            event: BSDFEvent::GLOSSY | BSDFEvent::REFLECT,
            direct_pdf_w,
            reverse_pdf_w,
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
        let ks = textures.spectrum_value(self.ks, hp).clamp(0.0, 1.0);
        let (roughness, anisotropy) = self.roughness(textures, hp);
        let w_coating = if local_fixed_dir.z < 0.0 { 0.0 } else { coating_weight(ks, local_fixed_dir) };
        let w_base = 1.0 - w_coating;

        let sampled_dir = if pass_through_event < w_base {
            // sample the base lobe
            let mut dir = cosine_sample_hemisphere(Point2f::new(u0, u1));
            if local_fixed_dir.z < 0.0 {
                dir.z = -dir.z;
            }
            dir
        } else {
            // sample the coating lobe
            let (wh, _, pdf_h) = microfacet::sample_h(roughness, anisotropy, u0, u1);
            if pdf_h <= 0.0 {
                return None;
            }
            let cos_wh = local_fixed_dir.dot(wh);
            if cos_wh <= 0.0 {
                return None;
            }
            2.0 * cos_wh * wh - local_fixed_dir
        };
        if sampled_dir.z * local_fixed_dir.z <= 0.0 || sampled_dir.z.abs() < DEFAULT_COS_EPSILON {
            return None;
        }

        let (light_dir, eye_dir) = if hp.from_light {
            (local_fixed_dir, sampled_dir)
        } else {
            (sampled_dir, local_fixed_dir)
        };
        let eval = self.evaluate(textures, hp, light_dir, eye_dir)?;
        if eval.direct_pdf_w <= 0.0 {
            return None;
        }
        let abs_cos_sampled = sampled_dir.z.abs();
        Some(BsdfSample {
            sampled_dir,
            f_over_pdf: eval.f * (abs_cos_sampled / eval.direct_pdf_w),
            pdf_w: eval.direct_pdf_w,
            abs_cos_sampled,
            event: eval.event,
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
