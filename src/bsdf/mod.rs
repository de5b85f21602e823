use crate::geometry::{Frame, Ray};
use crate::material::{BSDFEvent, BsdfEval, BsdfSample, MaterialIndex};
use crate::scene::Scene;
use crate::volume::VolumeIndex;
use crate::{Float, Normal3, Point3f, Spectrum, Vec3f};
use cgmath::InnerSpace;

pub mod hitpoint;

pub use hitpoint::HitPoint;

#[derive(Debug, Clone, Copy)]
enum BsdfSource {
    Surface(MaterialIndex),
    Volume(VolumeIndex),
}

/// A hit point paired with the scattering model at it: either the surface
/// material or, for a scatter event inside a participating medium, the
/// volume's phase function. All directions at this interface are world
/// space; the local frame stays private.
#[derive(Debug, Clone)]
pub struct Bsdf {
    pub hit_point: HitPoint,
    frame: Frame,
    source: BsdfSource,
    /// Index into the light table when the hit triangle belongs to an
    /// emissive mesh.
    pub triangle_light_index: Option<usize>,
}

impl Bsdf {
    /// Builds the shading record for a surface hit: interpolates mesh
    /// attributes, orients normals toward the incoming ray, and applies
    /// bump/normal maps.
    pub fn from_surface_hit(
        scene: &Scene,
        ray: &Ray,
        hit: crate::RayHit,
        pass_through_event: Float,
        from_light: bool,
    ) -> Self {
        let mesh = &scene.meshes[hit.mesh_index as usize];
        let material_index = mesh.material;
        let base = scene.materials.get(material_index).base();

        let mut hp = mesh.hit_point(hit, ray, pass_through_event, from_light);
        hp.interior_volume = base.interior_volume.or(scene.default_interior_volume);
        hp.exterior_volume = base.exterior_volume.or(scene.default_exterior_volume);

        // bump/normal perturbation before the frame is built
        if let Some(normal_tex) = base.normal_map {
            let sample = scene.textures.spectrum_value(normal_tex, &hp);
            hp.apply_normal_map(sample);
        } else if let Some(bump_tex) = base.bump {
            let grad = scene
                .textures
                .uv_gradient(bump_tex, &hp, base.bump_sample_distance);
            hp.apply_bump_gradient(grad);
        }

        let frame = hp.shade_frame();
        let triangle_light_index = scene
            .light_defs
            .triangle_light_for(hit.mesh_index as usize, hit.tri_index as usize);

        Self {
            hit_point: hp,
            frame,
            source: BsdfSource::Surface(material_index),
            triangle_light_index,
        }
    }

    /// Builds the record for a scatter event inside a volume, with the
    /// frame aligned to the ray so the phase function sees sensible local
    /// coordinates.
    pub fn from_volume_scatter(
        ray: &Ray,
        t: Float,
        volume: VolumeIndex,
        pass_through_event: Float,
        from_light: bool,
    ) -> Self {
        let p = ray.at(t);
        let n = Normal3((-ray.d).normalize());
        let (dpdu, dpdv) = crate::coordinate_system(n.0);
        let hp = HitPoint {
            fixed_dir: -ray.d,
            p,
            uv: crate::Vec2f::new(0.0, 0.0),
            ng: n,
            ns: n,
            dpdu,
            dpdv,
            color: Spectrum::WHITE,
            alpha: 1.0,
            pass_through_event,
            from_light,
            into_object: true,
            interior_volume: Some(volume),
            exterior_volume: Some(volume),
        };
        let frame = hp.shade_frame();
        Self {
            hit_point: hp,
            frame,
            source: BsdfSource::Volume(volume),
            triangle_light_index: None,
        }
    }

    pub fn is_volume_scatter(&self) -> bool {
        matches!(self.source, BsdfSource::Volume(_))
    }

    pub fn material_index(&self) -> Option<MaterialIndex> {
        match self.source {
            BsdfSource::Surface(m) => Some(m),
            BsdfSource::Volume(_) => None,
        }
    }

    pub fn p(&self) -> Point3f {
        self.hit_point.p
    }

    pub fn shade_n(&self) -> Normal3 {
        self.hit_point.ns
    }

    pub fn geometry_n(&self) -> Normal3 {
        self.hit_point.ng
    }

    pub fn fixed_dir(&self) -> Vec3f {
        self.hit_point.fixed_dir
    }

    pub fn is_delta(&self, scene: &Scene) -> bool {
        match self.source {
            BsdfSource::Surface(m) => scene.materials.is_delta(m, &self.hit_point),
            BsdfSource::Volume(_) => false,
        }
    }

    pub fn is_pass_through(&self, scene: &Scene) -> bool {
        match self.source {
            BsdfSource::Surface(m) => scene.materials.is_pass_through(m),
            BsdfSource::Volume(_) => false,
        }
    }

    pub fn pass_through_transparency(&self, scene: &Scene) -> Spectrum {
        match self.source {
            BsdfSource::Surface(m) => {
                let local_fixed = self.frame.to_local(self.hit_point.fixed_dir);
                scene.materials.pass_through_transparency(
                    m,
                    &scene.textures,
                    &self.hit_point,
                    local_fixed,
                )
            }
            BsdfSource::Volume(_) => Spectrum::BLACK,
        }
    }

    pub fn is_light_source(&self) -> bool {
        self.triangle_light_index.is_some()
    }

    /// Can this surface transmit at all? Feeds the volume-priority rule.
    pub fn can_transmit(&self, scene: &Scene) -> bool {
        match self.source {
            BsdfSource::Surface(m) => match scene.materials.get(m) {
                crate::material::Material::Glass(_)
                | crate::material::Material::ArchGlass(_)
                | crate::material::Material::RoughGlass(_)
                | crate::material::Material::MatteTranslucent(_)
                | crate::material::Material::Null(_) => true,
                crate::material::Material::Mix(mix) => {
                    // conservative: any transmitting child makes the mix
                    // transmissive for the priority test
                    fn transmits(scene: &Scene, idx: MaterialIndex) -> bool {
                        match scene.materials.get(idx) {
                            crate::material::Material::Glass(_)
                            | crate::material::Material::ArchGlass(_)
                            | crate::material::Material::RoughGlass(_)
                            | crate::material::Material::MatteTranslucent(_)
                            | crate::material::Material::Null(_) => true,
                            crate::material::Material::Mix(m) => {
                                transmits(scene, m.material_a) || transmits(scene, m.material_b)
                            }
                            _ => false,
                        }
                    }
                    transmits(scene, mix.material_a) || transmits(scene, mix.material_b)
                }
                _ => false,
            },
            BsdfSource::Volume(_) => false,
        }
    }

    /// Evaluates toward `generated_dir` (the direction being connected or
    /// light-sampled), returning the raw BSDF value and both pdfs.
    pub fn evaluate(&self, scene: &Scene, generated_dir: Vec3f) -> Option<BsdfEval> {
        let fixed_dir = self.hit_point.fixed_dir;
        let (light_dir_world, eye_dir_world) = if self.hit_point.from_light {
            (fixed_dir, generated_dir)
        } else {
            (generated_dir, fixed_dir)
        };

        if let BsdfSource::Surface(_) = self.source {
            // reject sideways grazing configurations against the geometric
            // normal: shading-normal-only tests let light leak through
            let dot_light_ng = light_dir_world.dot(self.hit_point.ng.0);
            let dot_eye_ng = eye_dir_world.dot(self.hit_point.ng.0);
            let side_test = dot_light_ng * dot_eye_ng;
            if side_test == 0.0 {
                return None;
            }
        }

        let local_light = self.frame.to_local(light_dir_world);
        let local_eye = self.frame.to_local(eye_dir_world);

        match self.source {
            BsdfSource::Surface(m) => {
                scene
                    .materials
                    .evaluate(m, &scene.textures, &self.hit_point, local_light, local_eye)
                    .filter(|eval| {
                        // the event must agree with which side the
                        // geometric normal puts the directions on
                        let reflected = light_dir_world.dot(self.hit_point.ng.0)
                            * eye_dir_world.dot(self.hit_point.ng.0)
                            > 0.0;
                        reflected == eval.event.contains(BSDFEvent::REFLECT)
                    })
            }
            BsdfSource::Volume(v) => scene.volumes.get(v).phase_evaluate(
                &scene.textures,
                &self.hit_point,
                local_light,
                local_eye,
            ),
        }
    }

    /// Samples a new world-space direction from the fixed one.
    pub fn sample(&self, scene: &Scene, u0: Float, u1: Float) -> Option<BsdfSample> {
        let local_fixed = self.frame.to_local(self.hit_point.fixed_dir);
        let result = match self.source {
            BsdfSource::Surface(m) => scene.materials.sample(
                m,
                &scene.textures,
                &self.hit_point,
                local_fixed,
                u0,
                u1,
                self.hit_point.pass_through_event,
            ),
            BsdfSource::Volume(v) => scene.volumes.get(v).phase_sample(
                &scene.textures,
                &self.hit_point,
                local_fixed,
                u0,
                u1,
            ),
        }?;

        let mut world = result;
        world.sampled_dir = self.frame.to_world(result.sampled_dir);
        Some(world)
    }

    pub fn pdf(&self, scene: &Scene, generated_dir: Vec3f) -> (Float, Float) {
        let fixed_dir = self.hit_point.fixed_dir;
        let (light_dir_world, eye_dir_world) = if self.hit_point.from_light {
            (fixed_dir, generated_dir)
        } else {
            (generated_dir, fixed_dir)
        };
        let local_light = self.frame.to_local(light_dir_world);
        let local_eye = self.frame.to_local(eye_dir_world);

        match self.source {
            BsdfSource::Surface(m) => {
                scene
                    .materials
                    .pdf(m, &scene.textures, &self.hit_point, local_light, local_eye)
            }
            BsdfSource::Volume(v) => {
                match scene.volumes.get(v).phase_evaluate(
                    &scene.textures,
                    &self.hit_point,
                    local_light,
                    local_eye,
                ) {
                    Some(eval) => (eval.direct_pdf_w, eval.reverse_pdf_w),
                    None => (0.0, 0.0),
                }
            }
        }
    }

    /// Emission of the hit surface toward the fixed direction, with the
    /// area/emission pdfs the BDPT weighting needs.
    pub fn emitted_radiance(&self, scene: &Scene) -> (Spectrum, Float, Float) {
        match self.triangle_light_index {
            Some(light_index) => match scene.light_defs.get(light_index) {
                crate::light::LightSource::Triangle(tri) => tri.emitted_radiance_at(scene, self),
                _ => (Spectrum::BLACK, 0.0, 0.0),
            },
            None => (Spectrum::BLACK, 0.0, 0.0),
        }
    }
}
