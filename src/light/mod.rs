use crate::material::Materials;
use crate::sampling::Distribution1D;
use crate::scene::mesh::TriangleMesh;
use crate::texture::Textures;
use crate::{Float, Point3f, Spectrum, Vec3f};
use std::collections::HashMap;

pub mod distant;
pub mod infinite;
pub mod point;
pub mod sky;
pub mod triangle;

pub use distant::{DistantLight, SharpDistantLight};
pub use infinite::{ConstantInfiniteLight, InfiniteLight};
pub use point::{MapPointLight, PointLight, ProjectionLight, SpotLight};
pub use sky::{Sky2Light, SkyLight, SunLight};
pub use triangle::TriangleLight;

/// Read-only scene data the light queries need: mesh storage for area
/// lights and the bounding sphere that stands in as the "surface" of
/// environmental lights.
#[derive(Clone, Copy)]
pub struct LightQueryContext<'a> {
    pub meshes: &'a [TriangleMesh],
    pub materials: &'a Materials,
    pub textures: &'a Textures,
    pub world_center: Point3f,
    pub world_radius: Float,
}

/// A particle leaving the light: the emitted ray, its radiance, and the
/// pdfs every BDPT strategy needs to weight it.
#[derive(Debug, Clone, Copy)]
pub struct EmitResult {
    pub origin: Point3f,
    pub dir: Vec3f,
    pub radiance: Spectrum,
    pub emission_pdf_w: Float,
    pub direct_pdf_a: Float,
    pub cos_theta_at_light: Float,
}

/// A shadow-ray sample from a surface point toward the light.
#[derive(Debug, Clone, Copy)]
pub struct IlluminateResult {
    /// Direction from the surface point toward the light.
    pub dir: Vec3f,
    pub distance: Float,
    pub radiance: Spectrum,
    pub direct_pdf_w: Float,
    pub emission_pdf_w: Float,
    pub cos_theta_at_light: Float,
}

/// The closed set of light variants.
#[derive(Debug, Clone)]
pub enum LightSource {
    Triangle(TriangleLight),
    Point(PointLight),
    MapPoint(MapPointLight),
    Spot(SpotLight),
    Projection(ProjectionLight),
    Distant(DistantLight),
    SharpDistant(SharpDistantLight),
    Infinite(InfiniteLight),
    ConstantInfinite(ConstantInfiniteLight),
    Sky(SkyLight),
    Sky2(Sky2Light),
    Sun(SunLight),
}

impl LightSource {
    pub fn is_environmental(&self) -> bool {
        matches!(
            self,
            LightSource::Infinite(_)
                | LightSource::ConstantInfinite(_)
                | LightSource::Sky(_)
                | LightSource::Sky2(_)
                | LightSource::Sun(_)
                | LightSource::Distant(_)
                | LightSource::SharpDistant(_)
        )
    }

    pub fn is_intersectable(&self) -> bool {
        matches!(self, LightSource::Triangle(_))
    }

    /// Delta lights cannot be importance-sampled from the BSDF side.
    pub fn is_delta(&self) -> bool {
        matches!(
            self,
            LightSource::Point(_)
                | LightSource::MapPoint(_)
                | LightSource::Spot(_)
                | LightSource::Projection(_)
                | LightSource::SharpDistant(_)
        )
    }

    pub fn emit(&self, ctx: &LightQueryContext, u0: Float, u1: Float, u2: Float, u3: Float) -> Option<EmitResult> {
        match self {
            LightSource::Triangle(l) => l.emit(ctx, u0, u1, u2, u3),
            LightSource::Point(l) => l.emit(ctx, u0, u1),
            LightSource::MapPoint(l) => l.emit(ctx, u0, u1),
            LightSource::Spot(l) => l.emit(ctx, u0, u1),
            LightSource::Projection(l) => l.emit(ctx, u0, u1),
            LightSource::Distant(l) => l.emit(ctx, u0, u1, u2, u3),
            LightSource::SharpDistant(l) => l.emit(ctx, u0, u1),
            LightSource::Infinite(l) => l.emit(ctx, u0, u1, u2, u3),
            LightSource::ConstantInfinite(l) => l.emit(ctx, u0, u1, u2, u3),
            LightSource::Sky(l) => l.emit(ctx, u0, u1, u2, u3),
            LightSource::Sky2(l) => l.emit(ctx, u0, u1, u2, u3),
            LightSource::Sun(l) => l.emit(ctx, u0, u1, u2, u3),
        }
    }

    pub fn illuminate(&self, ctx: &LightQueryContext, p: Point3f, u0: Float, u1: Float) -> Option<IlluminateResult> {
        match self {
            LightSource::Triangle(l) => l.illuminate(ctx, p, u0, u1),
            LightSource::Point(l) => l.illuminate(ctx, p),
            LightSource::MapPoint(l) => l.illuminate(ctx, p),
            LightSource::Spot(l) => l.illuminate(ctx, p),
            LightSource::Projection(l) => l.illuminate(ctx, p),
            LightSource::Distant(l) => l.illuminate(ctx, p, u0, u1),
            LightSource::SharpDistant(l) => l.illuminate(ctx, p),
            LightSource::Infinite(l) => l.illuminate(ctx, p, u0, u1),
            LightSource::ConstantInfinite(l) => l.illuminate(ctx, p, u0, u1),
            LightSource::Sky(l) => l.illuminate(ctx, p, u0, u1),
            LightSource::Sky2(l) => l.illuminate(ctx, p, u0, u1),
            LightSource::Sun(l) => l.illuminate(ctx, p, u0, u1),
        }
    }

    /// Radiance arriving from an environmental light along `dir`, with the
    /// pdfs of having sampled that direction. Zero for finite lights.
    pub fn environment_radiance(
        &self,
        ctx: &LightQueryContext,
        dir: Vec3f,
    ) -> (Spectrum, Float, Float) {
        match self {
            LightSource::Infinite(l) => l.radiance_along(ctx, dir),
            LightSource::ConstantInfinite(l) => l.radiance_along(ctx, dir),
            LightSource::Sky(l) => l.radiance_along(ctx, dir),
            LightSource::Sky2(l) => l.radiance_along(ctx, dir),
            LightSource::Sun(l) => l.radiance_along(ctx, dir),
            _ => (Spectrum::BLACK, 0.0, 0.0),
        }
    }

    pub fn power(&self, ctx: &LightQueryContext) -> Float {
        match self {
            LightSource::Triangle(l) => l.power(ctx),
            LightSource::Point(l) => l.power(),
            LightSource::MapPoint(l) => l.power(),
            LightSource::Spot(l) => l.power(),
            LightSource::Projection(l) => l.power(),
            LightSource::Distant(l) => l.power(ctx),
            LightSource::SharpDistant(l) => l.power(ctx),
            LightSource::Infinite(l) => l.power(ctx),
            LightSource::ConstantInfinite(l) => l.power(ctx),
            LightSource::Sky(l) => l.power(ctx),
            LightSource::Sky2(l) => l.power(ctx),
            LightSource::Sun(l) => l.power(ctx),
        }
    }
}

/// All lights of a scene plus the acceleration tables over them: the env
/// subset, the mesh-triangle-to-light map for O(1) emissive-hit lookup,
/// and the power-weighted picking distribution.
#[derive(Debug, Clone, Default)]
pub struct LightDefinitions {
    lights: Vec<LightSource>,
    env_light_indices: Vec<usize>,
    /// (mesh index, triangle index) -> light index for emissive meshes.
    tri_to_light: HashMap<(usize, usize), usize>,
    distribution: Option<Distribution1D>,
}

impl LightDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, light: LightSource) -> usize {
        let index = self.lights.len();
        if light.is_environmental() {
            self.env_light_indices.push(index);
        }
        if let LightSource::Triangle(tri) = &light {
            self.tri_to_light
                .insert((tri.mesh_index, tri.tri_index), index);
        }
        self.lights.push(light);
        index
    }

    pub fn get(&self, index: usize) -> &LightSource {
        &self.lights[index]
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn lights(&self) -> &[LightSource] {
        &self.lights
    }

    pub fn env_lights(&self) -> impl Iterator<Item = &LightSource> {
        self.env_light_indices.iter().map(move |&i| &self.lights[i])
    }

    pub fn has_env_lights(&self) -> bool {
        !self.env_light_indices.is_empty()
    }

    pub fn triangle_light_for(&self, mesh_index: usize, tri_index: usize) -> Option<usize> {
        self.tri_to_light.get(&(mesh_index, tri_index)).copied()
    }

    /// Rebuilds the power distribution; called at scene build and after
    /// any light edit.
    pub fn build_distribution(&mut self, ctx: &LightQueryContext) {
        if self.lights.is_empty() {
            self.distribution = None;
            return;
        }
        let powers: Vec<Float> = self
            .lights
            .iter()
            .map(|l| l.power(ctx).max(1e-9))
            .collect();
        self.distribution = Some(Distribution1D::new(&powers));
    }

    /// Power-proportional light pick; returns the light, its index and the
    /// pick pdf.
    pub fn sample_all_lights(&self, u: Float) -> Option<(&LightSource, usize, Float)> {
        let dist = self.distribution.as_ref()?;
        let (index, pdf) = dist.sample_discrete(u);
        Some((&self.lights[index], index, pdf))
    }

    pub fn light_pick_pdf(&self, index: usize) -> Float {
        match &self.distribution {
            Some(dist) => dist.discrete_pdf(index),
            None => 0.0,
        }
    }

    /// Summed environment radiance along an escaped ray, with combined
    /// (power-weighted) pdfs for MIS.
    pub fn env_radiance(
        &self,
        ctx: &LightQueryContext,
        dir: Vec3f,
    ) -> (Spectrum, Float, Float) {
        let mut radiance = Spectrum::BLACK;
        let mut direct_pdf_a = 0.0;
        let mut emission_pdf_w = 0.0;
        for &i in &self.env_light_indices {
            let (r, dp, ep) = self.lights[i].environment_radiance(ctx, dir);
            let pick = self.light_pick_pdf(i);
            radiance += r;
            direct_pdf_a += dp * pick;
            emission_pdf_w += ep * pick;
        }
        (radiance, direct_pdf_a, emission_pdf_w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Materials;
    use crate::texture::Textures;

    fn empty_ctx<'a>(
        meshes: &'a [TriangleMesh],
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
    fn test_power_weighted_pick() {
        let meshes = vec![];
        let materials = Materials::new();
        let textures = Textures::new();
        let ctx = empty_ctx(&meshes, &materials, &textures);

        let mut defs = LightDefinitions::new();
        defs.add(LightSource::Point(PointLight::new(
            point3f!(0, 5, 0),
            Spectrum::uniform(1.0),
        )));
        defs.add(LightSource::Point(PointLight::new(
            point3f!(0, 5, 0),
            Spectrum::uniform(100.0),
        )));
        defs.build_distribution(&ctx);

        let (_, index, pdf) = defs.sample_all_lights(0.5).unwrap();
        assert_eq!(index, 1);
        assert!(pdf > 0.9);
    }

    #[test]
    fn test_env_subset_tracking() {
        let mut defs = LightDefinitions::new();
        defs.add(LightSource::ConstantInfinite(ConstantInfiniteLight::new(
            Spectrum::WHITE,
            Spectrum::WHITE,
        )));
        defs.add(LightSource::Point(PointLight::new(
            point3f!(0, 0, 0),
            Spectrum::WHITE,
        )));
        assert!(defs.has_env_lights());
        assert_eq!(defs.env_lights().count(), 1);
    }
}
