use crate::bsdf::hitpoint::HitPoint;
use crate::material::glossy::{coating_absorption, coating_f, coating_pdf};
use crate::material::matte::DEFAULT_COS_EPSILON;
use crate::material::microfacet;
use crate::material::{BSDFEvent, BsdfEval, BsdfSample, MaterialBase};
use crate::sampling::cosine_sample_hemisphere;
use crate::texture::{TextureIndex, Textures};
use crate::{consts, Float, Point2f, Spectrum, Vec3f};
use cgmath::InnerSpace;

/// Measured car-paint preset: a diffuse pigment plus three Schlick lobes.
#[derive(Debug, Clone, Copy)]
pub struct CarPaintPreset {
    pub name: &'static str,
    pub kd: [Float; 3],
    pub ks1: [Float; 3],
    pub ks2: [Float; 3],
    pub ks3: [Float; 3],
    pub r1: Float,
    pub r2: Float,
    pub r3: Float,
    pub m1: Float,
    pub m2: Float,
    pub m3: Float,
}

pub const CAR_PAINT_PRESETS: &[CarPaintPreset] = &[
    CarPaintPreset {
        name: "ford f8",
        kd: [0.0012, 0.0015, 0.0018],
        ks1: [0.0049, 0.0076, 0.0120],
        ks2: [0.0100, 0.0130, 0.0180],
        ks3: [0.0070, 0.0065, 0.0077],
        r1: 0.1500, r2: 0.0870, r3: 0.9000,
        m1: 0.3200, m2: 0.1100, m3: 0.0130,
    },
    CarPaintPreset {
        name: "polaris silber",
        kd: [0.0550, 0.0630, 0.0710],
        ks1: [0.0650, 0.0820, 0.0880],
        ks2: [0.1100, 0.1100, 0.1300],
        ks3: [0.0080, 0.0130, 0.0150],
        r1: 1.0000, r2: 0.0920, r3: 0.9000,
        m1: 0.3800, m2: 0.1700, m3: 0.0130,
    },
    CarPaintPreset {
        name: "bmw339",
        kd: [0.0120, 0.0150, 0.0180],
        ks1: [0.0620, 0.0760, 0.0800],
        ks2: [0.1100, 0.1200, 0.1200],
        ks3: [0.0083, 0.0150, 0.0160],
        r1: 0.9200, r2: 0.8700, r3: 0.9000,
        m1: 0.3900, m2: 0.1700, m3: 0.0130,
    },
    CarPaintPreset {
        name: "white",
        kd: [0.6100, 0.6300, 0.5500],
        ks1: [2.6e-6, 3.1e-6, 2.5e-6],
        ks2: [0.0130, 0.0110, 0.0083],
        ks3: [0.0490, 0.0420, 0.0370],
        r1: 0.0490, r2: 0.4500, r3: 0.1700,
        m1: 0.4500, m2: 0.1500, m3: 0.0150,
    },
];

pub fn car_paint_preset(name: &str) -> Option<&'static CarPaintPreset> {
    CAR_PAINT_PRESETS.iter().find(|p| p.name == name)
}

/// Günther-style measured car paint: diffuse pigment, three glossy flake
/// lobes, and an absorbing clear coat.
#[derive(Debug, Clone)]
pub struct CarPaintMaterial {
    pub base: MaterialBase,
    pub kd: TextureIndex,
    pub ks1: TextureIndex,
    pub ks2: TextureIndex,
    pub ks3: TextureIndex,
    pub r1: TextureIndex,
    pub r2: TextureIndex,
    pub r3: TextureIndex,
    pub m1: TextureIndex,
    pub m2: TextureIndex,
    pub m3: TextureIndex,
    pub ka: TextureIndex,
    pub depth: TextureIndex,
}

struct Lobes {
    kd: Spectrum,
    ks: [Spectrum; 3],
    roughness: [Float; 3],
}

impl CarPaintMaterial {
    fn lobes(&self, textures: &Textures, hp: &HitPoint) -> Lobes {
        let m1 = textures.float_value(self.m1, hp);
        let m2 = textures.float_value(self.m2, hp);
        let m3 = textures.float_value(self.m3, hp);
        Lobes {
            kd: textures.spectrum_value(self.kd, hp).clamp(0.0, 1.0),
            ks: [
                textures.spectrum_value(self.ks1, hp).clamp(0.0, 1.0)
                    * textures.float_value(self.r1, hp),
                textures.spectrum_value(self.ks2, hp).clamp(0.0, 1.0)
                    * textures.float_value(self.r2, hp),
                textures.spectrum_value(self.ks3, hp).clamp(0.0, 1.0)
                    * textures.float_value(self.r3, hp),
            ],
            roughness: [m1 * m1, m2 * m2, m3 * m3],
        }
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
        if fixed_dir.z < 0.0 {
            return None;
        }

        let lobes = self.lobes(textures, hp);

        let alpha = textures.spectrum_value(self.ka, hp).clamp_positive();
        let depth = textures.float_value(self.depth, hp);
        let absorption =
            coating_absorption(sampled_dir.z.abs(), fixed_dir.z.abs(), alpha, depth);

        let mut f = absorption * lobes.kd * consts::FRAC_1_PI;
        let mut direct_pdf_w = sampled_dir.z.abs() * consts::FRAC_1_PI;
        let mut reverse_pdf_w = fixed_dir.z.abs() * consts::FRAC_1_PI;
        for i in 0..3 {
            f += coating_f(lobes.ks[i], lobes.roughness[i], 0.0, false, fixed_dir, sampled_dir);
            direct_pdf_w += coating_pdf(lobes.roughness[i], 0.0, fixed_dir, sampled_dir);
            reverse_pdf_w += coating_pdf(lobes.roughness[i], 0.0, sampled_dir, fixed_dir);
        }
        // lobes are selected with equal probability
        direct_pdf_w /= 4.0;
        reverse_pdf_w /= 4.0;

        Some(BsdfEval {
            f,
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
        if local_fixed_dir.z < DEFAULT_COS_EPSILON {
            return None;
        }
        let lobes = self.lobes(textures, hp);

        // pick one of the four lobes uniformly
        let lobe = (pass_through_event * 4.0) as usize;
        let sampled_dir = if lobe == 0 {
            cosine_sample_hemisphere(Point2f::new(u0, u1))
        } else {
            let roughness = lobes.roughness[lobe - 1];
            let (wh, _, pdf_h) = microfacet::sample_h(roughness, 0.0, u0, u1);
            if pdf_h <= 0.0 {
                return None;
            }
            let cos_wh = local_fixed_dir.dot(wh);
            if cos_wh <= 0.0 {
                return None;
            }
            2.0 * cos_wh * wh - local_fixed_dir
        };
        if sampled_dir.z <= DEFAULT_COS_EPSILON {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::Texture;
    use cgmath::InnerSpace;

    fn from_preset(preset: &CarPaintPreset) -> (Textures, CarPaintMaterial) {
        let mut t = Textures::new();
        let kd = t.add(Texture::ConstSpectrum(Spectrum::from(preset.kd)));
        let ks1 = t.add(Texture::ConstSpectrum(Spectrum::from(preset.ks1)));
        let ks2 = t.add(Texture::ConstSpectrum(Spectrum::from(preset.ks2)));
        let ks3 = t.add(Texture::ConstSpectrum(Spectrum::from(preset.ks3)));
        let r1 = t.add(Texture::ConstFloat(preset.r1));
        let r2 = t.add(Texture::ConstFloat(preset.r2));
        let r3 = t.add(Texture::ConstFloat(preset.r3));
        let m1 = t.add(Texture::ConstFloat(preset.m1));
        let m2 = t.add(Texture::ConstFloat(preset.m2));
        let m3 = t.add(Texture::ConstFloat(preset.m3));
        let ka = t.add(Texture::ConstSpectrum(Spectrum::BLACK));
        let depth = t.add(Texture::ConstFloat(0.0));
        let mat = CarPaintMaterial {
            base: MaterialBase::default(),
            kd, ks1, ks2, ks3, r1, r2, r3, m1, m2, m3, ka, depth,
        };
        (t, mat)
    }

    #[test]
    fn test_preset_lookup() {
        assert!(car_paint_preset("ford f8").is_some());
        assert!(car_paint_preset("no such paint").is_none());
    }

    #[test]
    fn test_eval_and_sample_agree() {
        let (texs, mat) = from_preset(car_paint_preset("ford f8").unwrap());
        let hp = HitPoint::test_default();
        let fixed = vec3f!(0.3, 0.1, 0.95).normalize();
        if let Some(s) = mat.sample(&texs, &hp, fixed, 0.4, 0.6, 0.1) {
            let eval = mat.evaluate(&texs, &hp, s.sampled_dir, fixed).unwrap();
            approx::assert_relative_eq!(eval.direct_pdf_w, s.pdf_w, max_relative = 1e-3);
        }
    }
}
