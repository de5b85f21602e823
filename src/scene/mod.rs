use crate::accel::Accelerator;
use crate::bsdf::Bsdf;
use crate::camera::PerspectiveCamera;
use crate::engine::EditAction;
use crate::err_float::machine_epsilon;
use crate::geometry::Ray;
use crate::light::{LightDefinitions, LightQueryContext, LightSource, TriangleLight};
use crate::material::{BSDFEvent, Materials};
use crate::texture::Textures;
use crate::volume::{PathVolumeInfo, VolumeIndex, Volumes};
use crate::{Float, Point3f, RayHit, Spectrum};
use anyhow::bail;

pub mod mesh;

use mesh::TriangleMesh;

/// Anything that can resolve a ray to its closest hit: the in-process
/// accelerator, or a handle that routes through the intersection dispatch
/// layer.
pub trait RayTracer {
    fn trace_ray(&self, ray: &Ray) -> RayHit;
}

/// Result of the scene-intersect walk: the BSDF at the first "real"
/// vertex (surface or volume scatter), the transparency/transmittance
/// accumulated along the way, and any volume emission picked up.
pub struct SceneIntersection {
    pub bsdf: Option<Bsdf>,
    pub throughput: Spectrum,
    pub emission: Spectrum,
}

impl SceneIntersection {
    pub fn hit(&self) -> bool {
        self.bsdf.is_some()
    }
}

/// The complete render-ready scene: geometry, shading tables, lights and
/// the accelerator handle. Read-only while workers run; edits go through
/// `apply_edit_actions` between engine stop/start.
pub struct Scene {
    pub camera: PerspectiveCamera,
    pub meshes: Vec<TriangleMesh>,
    pub textures: Textures,
    pub materials: Materials,
    pub volumes: Volumes,
    pub light_defs: LightDefinitions,
    pub accel: Accelerator,
    pub default_interior_volume: Option<VolumeIndex>,
    pub default_exterior_volume: Option<VolumeIndex>,
    pub epsilon: Float,
    pub world_center: Point3f,
    pub world_radius: Float,
}

impl RayTracer for Scene {
    fn trace_ray(&self, ray: &Ray) -> RayHit {
        self.accel.trace(ray, &self.meshes)
    }
}

impl Scene {
    /// Assembles the derived tables (accelerator, bounding sphere,
    /// triangle lights, light distribution) from the raw scene content.
    pub fn build(
        camera: PerspectiveCamera,
        meshes: Vec<TriangleMesh>,
        textures: Textures,
        materials: Materials,
        volumes: Volumes,
        mut extra_lights: Vec<LightSource>,
    ) -> anyhow::Result<Scene> {
        if let Some(cycle) = materials.find_mix_cycle() {
            bail!("mix material cycle detected at material index {}", cycle);
        }

        let accel = Accelerator::build(&meshes);
        let bounds = accel.world_bounds();
        let (world_center, world_radius) = if meshes.is_empty() {
            (Point3f::new(0.0, 0.0, 0.0), 100.0)
        } else {
            let (c, r) = bounds.bounding_sphere();
            (c, (r * 1.01).max(1e-3))
        };

        let mut scene = Scene {
            camera,
            meshes,
            textures,
            materials,
            volumes,
            light_defs: LightDefinitions::new(),
            accel,
            default_interior_volume: None,
            default_exterior_volume: None,
            epsilon: machine_epsilon(0.0),
            world_center,
            world_radius,
        };

        // every triangle of an emissive mesh becomes its own light
        let mut defs = LightDefinitions::new();
        {
            let ctx = scene.light_ctx();
            for (mesh_index, mesh) in scene.meshes.iter().enumerate() {
                if !scene.materials.is_light_source(mesh.material) {
                    continue;
                }
                for tri_index in 0..mesh.triangles.len() {
                    defs.add(LightSource::Triangle(TriangleLight::new(
                        &ctx, mesh_index, tri_index,
                    )));
                }
            }
        }
        for light in extra_lights.drain(..) {
            defs.add(light);
        }
        scene.light_defs = defs;
        scene.rebuild_light_distribution();

        if scene.light_defs.is_empty() {
            bail!("scene defines no light source");
        }
        Ok(scene)
    }

    pub fn light_ctx(&self) -> LightQueryContext {
        LightQueryContext {
            meshes: &self.meshes,
            materials: &self.materials,
            textures: &self.textures,
            world_center: self.world_center,
            world_radius: self.world_radius,
        }
    }

    fn rebuild_light_distribution(&mut self) {
        let mut defs = std::mem::take(&mut self.light_defs);
        defs.build_distribution(&self.light_ctx());
        self.light_defs = defs;
    }

    /// Re-derives whatever the edit touched: accelerator for geometry,
    /// light tables for lights/materials, projection chain for the camera.
    pub fn apply_edit_actions(&mut self, actions: EditAction) -> anyhow::Result<()> {
        if let Some(cycle) = self.materials.find_mix_cycle() {
            bail!("mix material cycle detected at material index {}", cycle);
        }

        if actions.contains(EditAction::CAMERA_EDIT) {
            self.camera.update();
        }
        if actions.intersects(EditAction::GEOMETRY_EDIT | EditAction::INSTANCE_TRANS_EDIT) {
            self.accel = Accelerator::build(&self.meshes);
            let (c, r) = self.accel.world_bounds().bounding_sphere();
            self.world_center = c;
            self.world_radius = (r * 1.01).max(1e-3);
        }
        if actions.intersects(
            EditAction::AREALIGHTS_EDIT
                | EditAction::MATERIALS_EDIT
                | EditAction::MATERIAL_TYPES_EDIT
                | EditAction::GEOMETRY_EDIT
                | EditAction::INFINITELIGHT_EDIT
                | EditAction::SUNLIGHT_EDIT
                | EditAction::SKYLIGHT_EDIT,
        ) {
            // triangle-light set may have changed: rebuild from scratch
            let mut defs = LightDefinitions::new();
            {
                let ctx = self.light_ctx();
                for (mesh_index, mesh) in self.meshes.iter().enumerate() {
                    if !self.materials.is_light_source(mesh.material) {
                        continue;
                    }
                    for tri_index in 0..mesh.triangles.len() {
                        defs.add(LightSource::Triangle(TriangleLight::new(
                            &ctx, mesh_index, tri_index,
                        )));
                    }
                }
            }
            for light in self
                .light_defs
                .lights()
                .iter()
                .filter(|l| !l.is_intersectable())
            {
                defs.add(light.clone());
            }
            self.light_defs = defs;
            self.rebuild_light_distribution();
        }
        Ok(())
    }

    /// Picks a light with probability proportional to its power.
    pub fn sample_all_lights(&self, u: Float) -> Option<(&LightSource, usize, Float)> {
        self.light_defs.sample_all_lights(u)
    }

    /// Radiance from the environment for an escaped ray.
    pub fn env_radiance(&self, dir: crate::Vec3f) -> (Spectrum, Float, Float) {
        self.light_defs.env_radiance(&self.light_ctx(), dir)
    }

    /// The §-defining operation of the scene layer: trace a ray,
    /// transparently walking through pass-through surfaces, volume
    /// boundaries dominated by the priority system, and participating
    /// media. See the pass-through chain contract in the module docs.
    pub fn intersect(
        &self,
        tracer: &dyn RayTracer,
        from_light: bool,
        vol_info: &mut PathVolumeInfo,
        pass_through: Float,
        ray: &mut Ray,
    ) -> SceneIntersection {
        let mut throughput = Spectrum::WHITE;
        let mut emission = Spectrum::BLACK;

        loop {
            let hit = tracer.trace_ray(ray);

            let (bsdf, current_volume) = if !hit.is_miss() {
                let bsdf = Bsdf::from_surface_hit(self, ray, hit, pass_through, from_light);
                let hp = &bsdf.hit_point;
                let current = vol_info.current_volume().or(if hp.into_object {
                    hp.exterior_volume
                } else {
                    hp.interior_volume
                });
                (Some(bsdf), current)
            } else {
                (None, vol_info.current_volume().or(self.default_exterior_volume))
            };

            // attenuate (and possibly scatter) across the segment in front
            // of the hit
            if let Some(vol_index) = current_volume {
                let volume = self.volumes.get(vol_index);
                let mut segment = *ray;
                if !hit.is_miss() {
                    segment.maxt = hit.t;
                }
                let scatter =
                    volume.scatter(&self.textures, &segment, pass_through, vol_info.is_scattered_start());
                emission += throughput * scatter.emission;
                throughput *= scatter.throughput;

                if scatter.scattered() {
                    let bsdf = Bsdf::from_volume_scatter(
                        ray,
                        scatter.t_scatter,
                        vol_index,
                        pass_through,
                        from_light,
                    );
                    vol_info.set_scattered_start(true);
                    return SceneIntersection { bsdf: Some(bsdf), throughput, emission };
                }
            }

            let bsdf = match bsdf {
                Some(b) => b,
                None => return SceneIntersection { bsdf: None, throughput, emission },
            };

            // a dominated volume boundary is crossed silently
            if vol_info.continue_to_trace(
                bsdf.can_transmit(self),
                bsdf.hit_point.into_object,
                bsdf.hit_point.interior_volume,
                &self.volumes,
            ) {
                vol_info.update(
                    BSDFEvent::TRANSMIT,
                    bsdf.hit_point.into_object,
                    bsdf.hit_point.interior_volume,
                    &self.volumes,
                );
                ray.mint = hit.t + machine_epsilon(hit.t);
                continue;
            }

            if bsdf.is_pass_through(self) {
                let transparency = bsdf.pass_through_transparency(self);
                if transparency.is_black() {
                    // opaque cut-out: this is a real vertex
                    return SceneIntersection { bsdf: Some(bsdf), throughput, emission };
                }
                throughput *= transparency;
                vol_info.update(
                    BSDFEvent::TRANSMIT,
                    bsdf.hit_point.into_object,
                    bsdf.hit_point.interior_volume,
                    &self.volumes,
                );
                ray.mint = hit.t + machine_epsilon(hit.t);
                continue;
            }

            return SceneIntersection { bsdf: Some(bsdf), throughput, emission };
        }
    }

    /// Plain visibility query between two points, honoring pass-through
    /// transparency along the segment.
    pub fn shadow_transmittance(
        &self,
        tracer: &dyn RayTracer,
        mut shadow_ray: Ray,
        vol_info: &PathVolumeInfo,
        pass_through: Float,
    ) -> Option<Spectrum> {
        let mut info = vol_info.clone();
        let intersection = self.intersect(tracer, false, &mut info, pass_through, &mut shadow_ray);
        if intersection.hit() {
            None
        } else {
            Some(intersection.throughput)
        }
    }
}
