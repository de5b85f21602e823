use crate::bsdf::hitpoint::HitPoint;
use crate::material::matte::DEFAULT_COS_EPSILON;
use crate::material::{BSDFEvent, BsdfEval, BsdfSample, MaterialBase};
use crate::sampling::cosine_sample_hemisphere;
use crate::texture::{TextureIndex, Textures};
use crate::{consts, Float, Point2f, Spectrum, Vec3f};
use cgmath::InnerSpace;

/// The six tabulated weaves of the Irawan–Marschner cloth model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClothPreset {
    Denim,
    SilkCharmeuse,
    SilkShantung,
    CottonTwill,
    WoolGabardine,
    Polyester,
}

impl ClothPreset {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "denim" => Some(ClothPreset::Denim),
            "silk_charmeuse" => Some(ClothPreset::SilkCharmeuse),
            "silk_shantung" => Some(ClothPreset::SilkShantung),
            "cotton_twill" => Some(ClothPreset::CottonTwill),
            "wool_gabardine" => Some(ClothPreset::WoolGabardine),
            "polyester_lining_cloth" => Some(ClothPreset::Polyester),
            _ => None,
        }
    }
}

/// Weave tile: `pattern` indexes row-major into warp (1) / weft (0) cells.
struct WeaveParams {
    tile_width: usize,
    tile_height: usize,
    pattern: &'static [u8],
    /// Maximum inclination of the yarn arc.
    umax: Float,
    /// Gaussian width of the specular lobe along the yarn.
    kappa: Float,
    /// Diffuse/specular balance of the weave.
    alpha: Float,
    beta: Float,
    repeat_u: Float,
    repeat_v: Float,
}

// 2x2 plain weave
static PLAIN: [u8; 4] = [1, 0, 0, 1];
// 4x4 twill (the diagonal rib of denim and gabardine)
static TWILL: [u8; 16] = [
    1, 1, 0, 0,
    0, 1, 1, 0,
    0, 0, 1, 1,
    1, 0, 0, 1,
];
// 8x2 satin (charmeuse's long floats)
static SATIN: [u8; 16] = [
    1, 1, 1, 1, 0, 1, 1, 1,
    1, 0, 1, 1, 1, 1, 1, 1,
];

fn weave_params(preset: ClothPreset) -> WeaveParams {
    match preset {
        ClothPreset::Denim => WeaveParams {
            tile_width: 4,
            tile_height: 4,
            pattern: &TWILL,
            umax: 0.67,
            kappa: 18.0,
            alpha: 0.55,
            beta: 2.3,
            repeat_u: 90.0,
            repeat_v: 90.0,
        },
        ClothPreset::SilkCharmeuse => WeaveParams {
            tile_width: 8,
            tile_height: 2,
            pattern: &SATIN,
            umax: 0.42,
            kappa: 45.0,
            alpha: 0.25,
            beta: 6.0,
            repeat_u: 140.0,
            repeat_v: 140.0,
        },
        ClothPreset::SilkShantung => WeaveParams {
            tile_width: 2,
            tile_height: 2,
            pattern: &PLAIN,
            umax: 0.85,
            kappa: 30.0,
            alpha: 0.3,
            beta: 4.5,
            repeat_u: 130.0,
            repeat_v: 60.0,
        },
        ClothPreset::CottonTwill => WeaveParams {
            tile_width: 4,
            tile_height: 4,
            pattern: &TWILL,
            umax: 0.75,
            kappa: 16.0,
            alpha: 0.65,
            beta: 2.0,
            repeat_u: 100.0,
            repeat_v: 100.0,
        },
        ClothPreset::WoolGabardine => WeaveParams {
            tile_width: 4,
            tile_height: 4,
            pattern: &TWILL,
            umax: 0.9,
            kappa: 12.0,
            alpha: 0.75,
            beta: 1.6,
            repeat_u: 80.0,
            repeat_v: 80.0,
        },
        ClothPreset::Polyester => WeaveParams {
            tile_width: 2,
            tile_height: 2,
            pattern: &PLAIN,
            umax: 0.5,
            kappa: 35.0,
            alpha: 0.35,
            beta: 5.0,
            repeat_u: 120.0,
            repeat_v: 120.0,
        },
    }
}

/// Thread repeats per unit uv when the scene does not override them.
pub fn preset_default_repeats(preset: ClothPreset) -> (Float, Float) {
    let p = weave_params(preset);
    (p.repeat_u, p.repeat_v)
}

/// Woven cloth with warp/weft yarns alternating by the weave pattern.
#[derive(Debug, Clone)]
pub struct ClothMaterial {
    pub base: MaterialBase,
    pub preset: ClothPreset,
    pub warp_kd: TextureIndex,
    pub warp_ks: TextureIndex,
    pub weft_kd: TextureIndex,
    pub weft_ks: TextureIndex,
    pub repeat_u: Float,
    pub repeat_v: Float,
}

impl ClothMaterial {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base: MaterialBase,
        preset: ClothPreset,
        warp_kd: TextureIndex,
        warp_ks: TextureIndex,
        weft_kd: TextureIndex,
        weft_ks: TextureIndex,
        repeat_u: Float,
        repeat_v: Float,
    ) -> Self {
        Self { base, preset, warp_kd, warp_ks, weft_kd, weft_ks, repeat_u, repeat_v }
    }

    /// Which yarn covers this uv: true for warp. Also returns the in-cell
    /// offset along the yarn used to tilt its tangent.
    fn yarn_at(&self, params: &WeaveParams, hp: &HitPoint) -> (bool, Float) {
        let u = hp.uv.x * self.repeat_u;
        let v = hp.uv.y * self.repeat_v;

        let cell_u = (u * params.tile_width as Float).floor();
        let cell_v = (v * params.tile_height as Float).floor();
        let iu = (cell_u as i64).rem_euclid(params.tile_width as i64) as usize;
        let iv = (cell_v as i64).rem_euclid(params.tile_height as i64) as usize;
        let warp = params.pattern[iv * params.tile_width + iu] != 0;

        // fractional position across the cell, mapped to [-1, 1]
        let frac = if warp {
            2.0 * (v * params.tile_height as Float - cell_v) - 1.0
        } else {
            2.0 * (u * params.tile_width as Float - cell_u) - 1.0
        };
        (warp, frac)
    }

    /// Gaussian specular lobe around the bent yarn tangent.
    fn yarn_specular(params: &WeaveParams, warp: bool, frac: Float, wi: Vec3f, wo: Vec3f) -> Float {
        let h = wi + wo;
        if h.magnitude2() < 1e-12 {
            return 0.0;
        }
        let h = h.normalize();

        // the yarn arc tilts the tangent by up to umax across the cell
        let inclination = params.umax * frac;
        let (sin_i, cos_i) = inclination.sin_cos();
        let tangent = if warp {
            Vec3f::new(0.0, cos_i, sin_i)
        } else {
            Vec3f::new(cos_i, 0.0, sin_i)
        };

        let dot_ht = h.dot(tangent);
        (-params.kappa * dot_ht * dot_ht).exp()
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
        let params = weave_params(self.preset);
        let (warp, frac) = self.yarn_at(&params, hp);

        let (kd, ks) = if warp {
            (
                textures.spectrum_value(self.warp_kd, hp).clamp(0.0, 1.0),
                textures.spectrum_value(self.warp_ks, hp).clamp(0.0, 1.0),
            )
        } else {
            (
                textures.spectrum_value(self.weft_kd, hp).clamp(0.0, 1.0),
                textures.spectrum_value(self.weft_ks, hp).clamp(0.0, 1.0),
            )
        };

        let spec = Self::yarn_specular(&params, warp, frac, local_light_dir, local_eye_dir);
        let f = (kd * params.alpha + ks * (spec * params.beta)) * consts::FRAC_1_PI;

        Some(BsdfEval {
            f,
            event: BSDFEvent::GLOSSY | BSDFEvent::REFLECT,
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
        let mut sampled_dir = cosine_sample_hemisphere(Point2f::new(u0, u1));
        if local_fixed_dir.z < 0.0 {
            sampled_dir.z = -sampled_dir.z;
        }
        let abs_cos_sampled = sampled_dir.z.abs();
        if abs_cos_sampled < DEFAULT_COS_EPSILON {
            return None;
        }
        let pdf_w = abs_cos_sampled * consts::FRAC_1_PI;

        let eval = self.evaluate(textures, hp, sampled_dir, local_fixed_dir)?;
        Some(BsdfSample {
            sampled_dir,
            f_over_pdf: eval.f * (abs_cos_sampled / pdf_w),
            pdf_w,
            abs_cos_sampled,
            event: eval.event,
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
    use crate::Vec2f;

    fn setup() -> (Textures, ClothMaterial) {
        let mut texs = Textures::new();
        let warp_kd = texs.add(Texture::ConstSpectrum(Spectrum::new(0.5, 0.05, 0.05)));
        let warp_ks = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.2)));
        let weft_kd = texs.add(Texture::ConstSpectrum(Spectrum::new(0.05, 0.05, 0.5)));
        let weft_ks = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.2)));
        let mat = ClothMaterial::new(
            MaterialBase::default(),
            ClothPreset::Denim,
            warp_kd,
            warp_ks,
            weft_kd,
            weft_ks,
            10.0,
            10.0,
        );
        (texs, mat)
    }

    #[test]
    fn test_preset_names() {
        assert_eq!(ClothPreset::from_name("denim"), Some(ClothPreset::Denim));
        assert_eq!(ClothPreset::from_name("tweed"), None);
    }

    #[test]
    fn test_warp_and_weft_differ() {
        let (texs, cloth) = setup();
        let mut hp = HitPoint::test_default();
        let wi = vec3f!(0.1, 0.2, 0.97).normalize();
        let wo = vec3f!(0, 0, 1);

        // scan along u until the yarn flips; the two cells must evaluate to
        // different tints
        let mut seen_red = false;
        let mut seen_blue = false;
        for i in 0..16 {
            hp.uv = Vec2f::new(i as Float / 64.0, 0.01);
            let f = cloth.evaluate(&texs, &hp, wi, wo).unwrap().f;
            if f.r() > f.b() {
                seen_red = true;
            } else {
                seen_blue = true;
            }
        }
        assert!(seen_red && seen_blue);
    }

    #[test]
    fn test_cloth_reflection_only() {
        let (texs, cloth) = setup();
        let hp = HitPoint::test_default();
        assert!(cloth
            .evaluate(&texs, &hp, vec3f!(0, 0, 1), vec3f!(0, 0, -1))
            .is_none());
    }
}
