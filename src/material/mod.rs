use crate::bsdf::hitpoint::HitPoint;
use crate::texture::{TextureIndex, Textures};
use crate::volume::VolumeIndex;
use crate::{Float, Spectrum, Vec3f};
use bitflags::bitflags;

pub mod carpaint;
pub mod cloth;
pub mod fresnel;
pub mod glass;
pub mod glossy;
pub mod matte;
pub mod metal;
pub mod microfacet;
pub mod mix;
pub mod roughglass;

pub use carpaint::CarPaintMaterial;
pub use cloth::ClothMaterial;
pub use glass::{ArchGlassMaterial, GlassMaterial, MirrorMaterial, NullMaterial};
pub use glossy::Glossy2Material;
pub use matte::{MatteMaterial, MatteTranslucentMaterial, VelvetMaterial};
pub use metal::Metal2Material;
pub use mix::MixMaterial;
pub use roughglass::RoughGlassMaterial;

bitflags! {
    /// What kind of scattering a BSDF query produced. Lobe class and
    /// hemisphere are independent axes.
    pub struct BSDFEvent: u8 {
        const NONE     = 0;
        const DIFFUSE  = 1;
        const GLOSSY   = 1 << 1;
        const SPECULAR = 1 << 2;
        const REFLECT  = 1 << 3;
        const TRANSMIT = 1 << 4;
        const ALL_COMPONENTS = Self::DIFFUSE.bits | Self::GLOSSY.bits | Self::SPECULAR.bits;
        const ALL_SIDES = Self::REFLECT.bits | Self::TRANSMIT.bits;
    }
}

impl BSDFEvent {
    pub fn is_specular(self) -> bool {
        self.contains(BSDFEvent::SPECULAR)
    }
}

pub type MaterialIndex = usize;

/// Which indirect path classes may see this material's emission.
#[derive(Debug, Clone, Copy)]
pub struct IndirectVisibility {
    pub diffuse: bool,
    pub glossy: bool,
    pub specular: bool,
}

impl Default for IndirectVisibility {
    fn default() -> Self {
        Self { diffuse: true, glossy: true, specular: true }
    }
}

/// Attributes shared by every material variant.
#[derive(Debug, Clone)]
pub struct MaterialBase {
    pub id: u32,
    pub emission: Option<TextureIndex>,
    pub emission_gain: Spectrum,
    pub emitted_power: Float,
    /// Hint for samples-per-direct-light at vertices on this material.
    pub emitted_samples: i32,
    pub bump: Option<TextureIndex>,
    pub normal_map: Option<TextureIndex>,
    pub bump_sample_distance: Float,
    pub interior_volume: Option<VolumeIndex>,
    pub exterior_volume: Option<VolumeIndex>,
    pub visibility: IndirectVisibility,
}

impl Default for MaterialBase {
    fn default() -> Self {
        Self {
            id: 0,
            emission: None,
            emission_gain: Spectrum::WHITE,
            emitted_power: 0.0,
            emitted_samples: -1,
            bump: None,
            normal_map: None,
            bump_sample_distance: 0.001,
            interior_volume: None,
            exterior_volume: None,
            visibility: IndirectVisibility::default(),
        }
    }
}

/// Result of sampling a scattering direction. `f_over_pdf` already carries
/// `f · |cosθ| / pdfW`, so integrators multiply it straight into the path
/// throughput; `pdf_w` and `abs_cos_sampled` stay available for MIS.
#[derive(Debug, Clone, Copy)]
pub struct BsdfSample {
    pub sampled_dir: Vec3f,
    pub f_over_pdf: Spectrum,
    pub pdf_w: Float,
    pub abs_cos_sampled: Float,
    pub event: BSDFEvent,
}

/// Result of evaluating a fixed pair of directions. `f` is the raw BSDF
/// value; pdfs are densities for sampling the generated direction
/// (`direct_pdf_w`) and the fixed one (`reverse_pdf_w`).
#[derive(Debug, Clone, Copy)]
pub struct BsdfEval {
    pub f: Spectrum,
    pub event: BSDFEvent,
    pub direct_pdf_w: Float,
    pub reverse_pdf_w: Float,
}

/// The closed material set. Variants are plain data; the hot-path queries
/// dispatch through inlined matches rather than vtables.
#[derive(Debug, Clone)]
pub enum Material {
    Matte(MatteMaterial),
    Mirror(MirrorMaterial),
    Glass(GlassMaterial),
    ArchGlass(ArchGlassMaterial),
    RoughGlass(RoughGlassMaterial),
    MatteTranslucent(MatteTranslucentMaterial),
    Glossy2(Glossy2Material),
    Metal2(Metal2Material),
    Velvet(VelvetMaterial),
    Cloth(ClothMaterial),
    CarPaint(CarPaintMaterial),
    Mix(MixMaterial),
    Null(NullMaterial),
}

impl Material {
    pub fn base(&self) -> &MaterialBase {
        match self {
            Material::Matte(m) => &m.base,
            Material::Mirror(m) => &m.base,
            Material::Glass(m) => &m.base,
            Material::ArchGlass(m) => &m.base,
            Material::RoughGlass(m) => &m.base,
            Material::MatteTranslucent(m) => &m.base,
            Material::Glossy2(m) => &m.base,
            Material::Metal2(m) => &m.base,
            Material::Velvet(m) => &m.base,
            Material::Cloth(m) => &m.base,
            Material::CarPaint(m) => &m.base,
            Material::Mix(m) => &m.base,
            Material::Null(m) => &m.base,
        }
    }

    pub fn base_mut(&mut self) -> &mut MaterialBase {
        match self {
            Material::Matte(m) => &mut m.base,
            Material::Mirror(m) => &mut m.base,
            Material::Glass(m) => &mut m.base,
            Material::ArchGlass(m) => &mut m.base,
            Material::RoughGlass(m) => &mut m.base,
            Material::MatteTranslucent(m) => &mut m.base,
            Material::Glossy2(m) => &mut m.base,
            Material::Metal2(m) => &mut m.base,
            Material::Velvet(m) => &mut m.base,
            Material::Cloth(m) => &mut m.base,
            Material::CarPaint(m) => &mut m.base,
            Material::Mix(m) => &mut m.base,
            Material::Null(m) => &mut m.base,
        }
    }
}

/// Scene-owned material arena. Mix materials reference children by index
/// through this table, so edits are index-level swaps and the recursive
/// queries below never chase pointers.
#[derive(Debug, Clone, Default)]
pub struct Materials {
    mats: Vec<Material>,
}

impl Materials {
    pub fn new() -> Self {
        Self { mats: Vec::new() }
    }

    pub fn add(&mut self, mat: Material) -> MaterialIndex {
        self.mats.push(mat);
        self.mats.len() - 1
    }

    pub fn get(&self, index: MaterialIndex) -> &Material {
        &self.mats[index]
    }

    pub fn replace(&mut self, index: MaterialIndex, mat: Material) {
        self.mats[index] = mat;
    }

    pub fn len(&self) -> usize {
        self.mats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mats.is_empty()
    }

    pub fn is_delta(&self, index: MaterialIndex, hp: &HitPoint) -> bool {
        match self.get(index) {
            Material::Mirror(_) | Material::Glass(_) | Material::ArchGlass(_) | Material::Null(_) => true,
            Material::Mix(m) => m.is_delta(self, hp),
            _ => false,
        }
    }

    pub fn is_pass_through(&self, index: MaterialIndex) -> bool {
        match self.get(index) {
            Material::Null(_) | Material::ArchGlass(_) => true,
            Material::Mix(m) => {
                self.is_pass_through(m.material_a) || self.is_pass_through(m.material_b)
            }
            _ => false,
        }
    }

    /// Transparency along the unchanged ray direction. Zero means the
    /// surface is opaque for this query (e.g. the reflective branch of an
    /// architectural glass).
    pub fn pass_through_transparency(
        &self,
        index: MaterialIndex,
        textures: &Textures,
        hp: &HitPoint,
        local_fixed_dir: Vec3f,
    ) -> Spectrum {
        match self.get(index) {
            Material::Null(m) => m.transparency(textures, hp),
            Material::ArchGlass(m) => m.pass_through_transparency(textures, hp, local_fixed_dir),
            Material::Mix(m) => m.pass_through_transparency(self, textures, hp, local_fixed_dir),
            _ => Spectrum::BLACK,
        }
    }

    /// Evaluates the BSDF for a fixed direction pair in the shading frame.
    /// `local_light_dir`/`local_eye_dir` follow the transport direction
    /// recorded on the hit point.
    pub fn evaluate(
        &self,
        index: MaterialIndex,
        textures: &Textures,
        hp: &HitPoint,
        local_light_dir: Vec3f,
        local_eye_dir: Vec3f,
    ) -> Option<BsdfEval> {
        match self.get(index) {
            Material::Matte(m) => m.evaluate(textures, hp, local_light_dir, local_eye_dir),
            Material::Mirror(_) | Material::Glass(_) | Material::ArchGlass(_) | Material::Null(_) => None,
            Material::RoughGlass(m) => m.evaluate(textures, hp, local_light_dir, local_eye_dir),
            Material::MatteTranslucent(m) => m.evaluate(textures, hp, local_light_dir, local_eye_dir),
            Material::Glossy2(m) => m.evaluate(textures, hp, local_light_dir, local_eye_dir),
            Material::Metal2(m) => m.evaluate(textures, hp, local_light_dir, local_eye_dir),
            Material::Velvet(m) => m.evaluate(textures, hp, local_light_dir, local_eye_dir),
            Material::Cloth(m) => m.evaluate(textures, hp, local_light_dir, local_eye_dir),
            Material::CarPaint(m) => m.evaluate(textures, hp, local_light_dir, local_eye_dir),
            Material::Mix(m) => m.evaluate(self, textures, hp, local_light_dir, local_eye_dir),
        }
    }

    /// Samples a scattered direction given the fixed one.
    pub fn sample(
        &self,
        index: MaterialIndex,
        textures: &Textures,
        hp: &HitPoint,
        local_fixed_dir: Vec3f,
        u0: Float,
        u1: Float,
        pass_through_event: Float,
    ) -> Option<BsdfSample> {
        match self.get(index) {
            Material::Matte(m) => m.sample(textures, hp, local_fixed_dir, u0, u1),
            Material::Mirror(m) => m.sample(textures, hp, local_fixed_dir),
            Material::Glass(m) => m.sample(textures, hp, local_fixed_dir, pass_through_event),
            Material::ArchGlass(m) => m.sample(textures, hp, local_fixed_dir, pass_through_event),
            Material::RoughGlass(m) => m.sample(textures, hp, local_fixed_dir, u0, u1, pass_through_event),
            Material::MatteTranslucent(m) => m.sample(textures, hp, local_fixed_dir, u0, u1, pass_through_event),
            Material::Glossy2(m) => m.sample(textures, hp, local_fixed_dir, u0, u1, pass_through_event),
            Material::Metal2(m) => m.sample(textures, hp, local_fixed_dir, u0, u1),
            Material::Velvet(m) => m.sample(textures, hp, local_fixed_dir, u0, u1),
            Material::Cloth(m) => m.sample(textures, hp, local_fixed_dir, u0, u1),
            Material::CarPaint(m) => m.sample(textures, hp, local_fixed_dir, u0, u1, pass_through_event),
            Material::Mix(m) => {
                m.sample(self, textures, hp, local_fixed_dir, u0, u1, pass_through_event)
            }
            Material::Null(_) => None,
        }
    }

    /// Forward and reverse solid-angle pdfs for the direction pair; both
    /// zero for delta materials.
    pub fn pdf(
        &self,
        index: MaterialIndex,
        textures: &Textures,
        hp: &HitPoint,
        local_light_dir: Vec3f,
        local_eye_dir: Vec3f,
    ) -> (Float, Float) {
        match self.get(index) {
            Material::Matte(m) => m.pdf(local_light_dir, local_eye_dir),
            Material::Mirror(_) | Material::Glass(_) | Material::ArchGlass(_) | Material::Null(_) => (0.0, 0.0),
            Material::RoughGlass(m) => m.pdf(textures, hp, local_light_dir, local_eye_dir),
            Material::MatteTranslucent(m) => m.pdf(textures, hp, local_light_dir, local_eye_dir),
            Material::Glossy2(m) => m.pdf(textures, hp, local_light_dir, local_eye_dir),
            Material::Metal2(m) => m.pdf(textures, hp, local_light_dir, local_eye_dir),
            Material::Velvet(m) => m.pdf(local_light_dir, local_eye_dir),
            Material::Cloth(m) => m.pdf(local_light_dir, local_eye_dir),
            Material::CarPaint(m) => m.pdf(textures, hp, local_light_dir, local_eye_dir),
            Material::Mix(m) => m.pdf(self, textures, hp, local_light_dir, local_eye_dir),
        }
    }

    /// Emitted radiance toward `local_dir`, already scaled by gain. Mix
    /// blends children; everything else reads its emission texture.
    pub fn emitted_radiance(
        &self,
        index: MaterialIndex,
        textures: &Textures,
        hp: &HitPoint,
    ) -> Spectrum {
        match self.get(index) {
            Material::Mix(m) => {
                let amt = textures.float_value(m.amount, hp).min(1.0).max(0.0);
                let a = self.emitted_radiance(m.material_a, textures, hp);
                let b = self.emitted_radiance(m.material_b, textures, hp);
                Spectrum::lerp(amt, a, b)
            }
            mat => match mat.base().emission {
                Some(tex) => mat.base().emission_gain * textures.spectrum_value(tex, hp),
                None => Spectrum::BLACK,
            },
        }
    }

    pub fn is_light_source(&self, index: MaterialIndex) -> bool {
        match self.get(index) {
            Material::Mix(m) => self.is_light_source(m.material_a) || self.is_light_source(m.material_b),
            mat => mat.base().emission.is_some(),
        }
    }

    /// Depth-first walk detecting reference cycles through mix materials.
    /// Called at scene build and after material edits.
    pub fn find_mix_cycle(&self) -> Option<MaterialIndex> {
        fn visit(mats: &Materials, index: MaterialIndex, stack: &mut Vec<MaterialIndex>) -> bool {
            if stack.contains(&index) {
                return true;
            }
            if let Material::Mix(m) = mats.get(index) {
                stack.push(index);
                let cyclic = visit(mats, m.material_a, stack) || visit(mats, m.material_b, stack);
                stack.pop();
                cyclic
            } else {
                false
            }
        }

        let mut stack = Vec::new();
        (0..self.mats.len()).find(|&i| visit(self, i, &mut stack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::Texture;

    fn arena_with_matte() -> (Materials, Textures) {
        let mut texs = Textures::new();
        let kd = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.5)));
        let mut mats = Materials::new();
        mats.add(Material::Matte(MatteMaterial::new(MaterialBase::default(), kd)));
        (mats, texs)
    }

    #[test]
    fn test_matte_is_not_delta() {
        let (mats, _) = arena_with_matte();
        let hp = HitPoint::test_default();
        assert!(!mats.is_delta(0, &hp));
    }

    #[test]
    fn test_mix_cycle_detected() {
        let (mut mats, mut texs) = arena_with_matte();
        let amt = texs.add(Texture::ConstFloat(0.5));
        // mix at index 1 referencing itself through index 2
        let m1 = mats.add(Material::Mix(MixMaterial::new(MaterialBase::default(), amt, 0, 0)));
        let m2 = mats.add(Material::Mix(MixMaterial::new(MaterialBase::default(), amt, m1, m1)));
        if let Material::Mix(m) = &mut mats.mats[m1] {
            m.material_b = m2;
        }
        assert!(mats.find_mix_cycle().is_some());
    }

    #[test]
    fn test_mix_without_cycle_passes() {
        let (mut mats, mut texs) = arena_with_matte();
        let amt = texs.add(Texture::ConstFloat(0.5));
        mats.add(Material::Mix(MixMaterial::new(MaterialBase::default(), amt, 0, 0)));
        assert!(mats.find_mix_cycle().is_none());
    }
}
