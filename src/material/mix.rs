use crate::bsdf::hitpoint::HitPoint;
use crate::material::{BsdfEval, BsdfSample, MaterialBase, MaterialIndex, Materials};
use crate::texture::{TextureIndex, Textures};
use crate::{Float, Spectrum, Vec3f};

/// Texture-weighted blend of two other materials. Children are arena
/// indices; the same `passThroughEvent` value drives every stochastic
/// sub-choice at a vertex so repeated queries stay consistent.
#[derive(Debug, Clone)]
pub struct MixMaterial {
    pub base: MaterialBase,
    pub amount: TextureIndex,
    pub material_a: MaterialIndex,
    pub material_b: MaterialIndex,
}

impl MixMaterial {
    pub fn new(
        base: MaterialBase,
        amount: TextureIndex,
        material_a: MaterialIndex,
        material_b: MaterialIndex,
    ) -> Self {
        Self { base, amount, material_a, material_b }
    }

    fn weights(&self, materials: &Materials, textures: &Textures, hp: &HitPoint) -> (Float, Float) {
        let _ = materials;
        let weight_b = textures.float_value(self.amount, hp).min(1.0).max(0.0);
        (1.0 - weight_b, weight_b)
    }

    pub fn is_delta(&self, materials: &Materials, hp: &HitPoint) -> bool {
        materials.is_delta(self.material_a, hp) && materials.is_delta(self.material_b, hp)
    }

    pub fn evaluate(
        &self,
        materials: &Materials,
        textures: &Textures,
        hp: &HitPoint,
        local_light_dir: Vec3f,
        local_eye_dir: Vec3f,
    ) -> Option<BsdfEval> {
        let (weight_a, weight_b) = self.weights(materials, textures, hp);

        let eval_a = if weight_a > 0.0 {
            materials.evaluate(self.material_a, textures, hp, local_light_dir, local_eye_dir)
        } else {
            None
        };
        let eval_b = if weight_b > 0.0 {
            materials.evaluate(self.material_b, textures, hp, local_light_dir, local_eye_dir)
        } else {
            None
        };
        if eval_a.is_none() && eval_b.is_none() {
            return None;
        }

        let mut f = Spectrum::BLACK;
        let mut direct_pdf_w = 0.0;
        let mut reverse_pdf_w = 0.0;
        let mut event = crate::material::BSDFEvent::NONE;
        if let Some(a) = eval_a {
            f += a.f * weight_a;
            direct_pdf_w += weight_a * a.direct_pdf_w;
            reverse_pdf_w += weight_a * a.reverse_pdf_w;
            event |= a.event;
        }
        if let Some(b) = eval_b {
            f += b.f * weight_b;
            direct_pdf_w += weight_b * b.direct_pdf_w;
            reverse_pdf_w += weight_b * b.reverse_pdf_w;
            event |= b.event;
        }
        if f.is_black() || direct_pdf_w <= 0.0 {
            return None;
        }

        Some(BsdfEval { f, event, direct_pdf_w, reverse_pdf_w })
    }

    pub fn sample(
        &self,
        materials: &Materials,
        textures: &Textures,
        hp: &HitPoint,
        local_fixed_dir: Vec3f,
        u0: Float,
        u1: Float,
        pass_through_event: Float,
    ) -> Option<BsdfSample> {
        let (weight_a, weight_b) = self.weights(materials, textures, hp);

        let pick_a = pass_through_event < weight_a;
        let (chosen, chosen_weight, remapped_event) = if pick_a {
            (self.material_a, weight_a, pass_through_event / weight_a)
        } else {
            (self.material_b, weight_b, (pass_through_event - weight_a) / weight_b)
        };
        if chosen_weight <= 0.0 {
            return None;
        }

        let mut sample = materials.sample(
            chosen,
            textures,
            hp,
            local_fixed_dir,
            u0,
            u1,
            remapped_event,
        )?;

        if sample.event.is_specular() {
            // picking probability cancels against the branch pdf
            sample.pdf_w *= chosen_weight;
            return Some(sample);
        }

        // blend in the sibling's lobe for the sampled direction
        let (light_dir, eye_dir) = if hp.from_light {
            (local_fixed_dir, sample.sampled_dir)
        } else {
            (sample.sampled_dir, local_fixed_dir)
        };
        let eval = self.evaluate(materials, textures, hp, light_dir, eye_dir)?;
        sample.f_over_pdf = eval.f * (sample.abs_cos_sampled / eval.direct_pdf_w);
        sample.pdf_w = eval.direct_pdf_w;
        sample.event = eval.event;
        Some(sample)
    }

    pub fn pdf(
        &self,
        materials: &Materials,
        textures: &Textures,
        hp: &HitPoint,
        local_light_dir: Vec3f,
        local_eye_dir: Vec3f,
    ) -> (Float, Float) {
        let (weight_a, weight_b) = self.weights(materials, textures, hp);
        let (da, ra) = materials.pdf(self.material_a, textures, hp, local_light_dir, local_eye_dir);
        let (db, rb) = materials.pdf(self.material_b, textures, hp, local_light_dir, local_eye_dir);
        (weight_a * da + weight_b * db, weight_a * ra + weight_b * rb)
    }

    pub fn pass_through_transparency(
        &self,
        materials: &Materials,
        textures: &Textures,
        hp: &HitPoint,
        local_fixed_dir: Vec3f,
    ) -> Spectrum {
        let (weight_a, weight_b) = self.weights(materials, textures, hp);
        let pick_a = hp.pass_through_event < weight_a;
        let (chosen, weight) = if pick_a { (self.material_a, weight_a) } else { (self.material_b, weight_b) };
        if weight <= 0.0 {
            return Spectrum::BLACK;
        }
        let mut child_hp = hp.clone();
        child_hp.pass_through_event = if pick_a {
            hp.pass_through_event / weight_a
        } else {
            (hp.pass_through_event - weight_a) / weight_b
        };
        materials.pass_through_transparency(chosen, textures, &child_hp, local_fixed_dir)
    }
}
