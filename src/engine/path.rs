use crate::bsdf::Bsdf;
use crate::engine::{russian_roulette, WorkerContext};
use crate::err_float::machine_epsilon;
use crate::geometry::Ray;
use crate::sampler::{add_sample_result, FilmBufferType, SampleResult, Sampler};
use crate::sampling::{pdf_a_to_w, power_heuristic};
use crate::scene::{RayTracer, Scene};
use crate::volume::PathVolumeInfo;
use crate::{Float, Spectrum};
use cgmath::InnerSpace;
use std::sync::atomic::Ordering;

// sample vector layout: camera boot plus a fixed stride per path vertex
const SAMPLE_BOOT_SIZE: usize = 4;
const SAMPLE_STEP_SIZE: usize = 8;

const OFFSET_PASS_THROUGH: usize = 0;
const OFFSET_BSDF_U0: usize = 1;
const OFFSET_BSDF_U1: usize = 2;
const OFFSET_RR: usize = 3;
const OFFSET_LIGHT_PICK: usize = 4;
const OFFSET_LIGHT_U0: usize = 5;
const OFFSET_LIGHT_U1: usize = 6;
const OFFSET_SHADOW_PASS_THROUGH: usize = 7;

/// Unidirectional path tracing with next-event estimation and the power
/// heuristic between the light and BSDF strategies.
pub fn render_worker(ctx: WorkerContext) {
    let mut sampler = ctx.make_sampler();
    sampler.request_samples(
        SAMPLE_BOOT_SIZE + ctx.params.max_path_depth as usize * SAMPLE_STEP_SIZE,
    );

    let tracer = EngineTracer { ctx: &ctx };
    let mut results: Vec<SampleResult> = Vec::with_capacity(1);

    while !ctx.should_stop() {
        results.clear();
        trace_eye_sample(&ctx, &tracer, sampler.as_mut(), &mut results);
        sampler.next_sample(&results);
        ctx.counters.total_samples.fetch_add(1, Ordering::Relaxed);
    }
}

/// Renders exactly `count` path samples on the calling thread. This is
/// the deterministic entry point batch comparisons and tests use; the
/// free-running worker stops on the interrupt flag instead.
pub fn render_samples(ctx: &WorkerContext, count: u64) {
    let mut sampler = ctx.make_sampler();
    sampler.request_samples(
        SAMPLE_BOOT_SIZE + ctx.params.max_path_depth as usize * SAMPLE_STEP_SIZE,
    );
    let tracer = EngineTracer { ctx };
    let mut results: Vec<SampleResult> = Vec::with_capacity(1);
    for _ in 0..count {
        results.clear();
        trace_eye_sample(ctx, &tracer, sampler.as_mut(), &mut results);
        sampler.next_sample(&results);
        ctx.counters.total_samples.fetch_add(1, Ordering::Relaxed);
    }
}

/// Scene tracer that counts rays into the engine statistics.
pub(crate) struct EngineTracer<'a> {
    pub ctx: &'a WorkerContext,
}

impl<'a> RayTracer for EngineTracer<'a> {
    fn trace_ray(&self, ray: &Ray) -> crate::RayHit {
        self.ctx.counters.total_rays.fetch_add(1, Ordering::Relaxed);
        self.ctx.scene.trace_ray(ray)
    }
}

pub(crate) fn trace_eye_sample(
    ctx: &WorkerContext,
    tracer: &dyn RayTracer,
    sampler: &mut dyn Sampler,
    results: &mut Vec<SampleResult>,
) {
    let scene = &ctx.scene;
    let film = &ctx.film;
    let film_x = (sampler.get_sample(0) * film.width() as Float).min(film.width() as Float - 1.0);
    let film_y = (sampler.get_sample(1) * film.height() as Float).min(film.height() as Float - 1.0);

    let mut ray = scene
        .camera
        .generate_ray(film_x, film_y, sampler.get_sample(2), sampler.get_sample(3));

    let mut radiance = Spectrum::BLACK;
    let mut throughput = Spectrum::WHITE;
    let mut alpha = 1.0;
    let mut vol_info = PathVolumeInfo::new();

    // pdf of the previous bounce, for MIS against direct light sampling
    let mut last_pdf_w = 1.0;
    let mut last_specular = true;

    let mut depth = 1u32;
    while depth <= ctx.params.max_path_depth {
        let offset = SAMPLE_BOOT_SIZE + (depth - 1) as usize * SAMPLE_STEP_SIZE;
        let pass_through = sampler.get_sample(offset + OFFSET_PASS_THROUGH);

        let isect = scene.intersect(tracer, false, &mut vol_info, pass_through, &mut ray);
        radiance += throughput * isect.emission;
        throughput *= isect.throughput;

        let bsdf = match isect.bsdf {
            Some(bsdf) => bsdf,
            None => {
                // escaped: environmental lights
                let (env, direct_pdf_w, _) = scene.env_radiance(ray.d);
                if !env.is_black() {
                    let weight = if last_specular {
                        1.0
                    } else {
                        power_heuristic(1, last_pdf_w, 1, direct_pdf_w)
                    };
                    radiance += throughput * env * weight;
                }
                if depth == 1 {
                    alpha = 0.0;
                }
                break;
            }
        };

        // emitted light at the hit
        if bsdf.is_light_source() {
            let (emitted, direct_pdf_a, _) = bsdf.emitted_radiance(scene);
            if !emitted.is_black() {
                let weight = if last_specular {
                    1.0
                } else {
                    let light_index = bsdf.triangle_light_index.unwrap();
                    let pick_pdf = scene.light_defs.light_pick_pdf(light_index);
                    let distance = (bsdf.p() - ray.o).magnitude();
                    let cos_at_light = bsdf.hit_point.fixed_dir.dot(bsdf.geometry_n().0).abs();
                    let direct_pdf_w = pdf_a_to_w(direct_pdf_a * pick_pdf, distance, cos_at_light);
                    power_heuristic(1, last_pdf_w, 1, direct_pdf_w)
                };
                radiance += throughput * emitted * weight;
            }
            // light sources behave as black bodies
            break;
        }

        // next-event estimation at non-delta vertices
        if !bsdf.is_delta(scene) {
            radiance += throughput
                * direct_light_sampling(
                    ctx,
                    tracer,
                    &bsdf,
                    &vol_info,
                    depth,
                    sampler.get_sample(offset + OFFSET_LIGHT_PICK),
                    sampler.get_sample(offset + OFFSET_LIGHT_U0),
                    sampler.get_sample(offset + OFFSET_LIGHT_U1),
                    sampler.get_sample(offset + OFFSET_SHADOW_PASS_THROUGH),
                );
        }

        // extend the path
        let sample = match bsdf.sample(
            scene,
            sampler.get_sample(offset + OFFSET_BSDF_U0),
            sampler.get_sample(offset + OFFSET_BSDF_U1),
        ) {
            Some(s) if !s.f_over_pdf.is_black() => s,
            _ => break,
        };

        let (weighted, pdf_w) = match russian_roulette(
            &ctx.params,
            depth,
            sample.f_over_pdf,
            sample.pdf_w,
            sampler.get_sample(offset + OFFSET_RR),
        ) {
            Some(v) => v,
            None => break,
        };

        throughput *= weighted;
        last_specular = sample.event.is_specular();
        last_pdf_w = pdf_w;

        vol_info.update(
            sample.event,
            bsdf.hit_point.into_object,
            bsdf.hit_point.interior_volume,
            &scene.volumes,
        );

        let origin = bsdf.p();
        ray = Ray::new(origin, sample.sampled_dir);
        ray.mint = machine_epsilon(ray.o.x.abs().max(ray.o.y.abs()).max(ray.o.z.abs()));
        depth += 1;
    }

    add_sample_result(
        results,
        FilmBufferType::PerPixelNormalized,
        film_x,
        film_y,
        radiance,
        alpha,
    );
}

/// One-light next-event estimation with MIS against the BSDF strategy.
#[allow(clippy::too_many_arguments)]
pub(crate) fn direct_light_sampling(
    ctx: &WorkerContext,
    tracer: &dyn RayTracer,
    bsdf: &Bsdf,
    vol_info: &PathVolumeInfo,
    depth: u32,
    u_pick: Float,
    u0: Float,
    u1: Float,
    shadow_pass_through: Float,
) -> Spectrum {
    let scene: &Scene = &ctx.scene;
    let (light, _light_index, pick_pdf) = match scene.sample_all_lights(u_pick) {
        Some(v) => v,
        None => return Spectrum::BLACK,
    };

    let light_ctx = scene.light_ctx();
    let illum = match light.illuminate(&light_ctx, bsdf.p(), u0, u1) {
        Some(i) if !i.radiance.is_black() => i,
        _ => return Spectrum::BLACK,
    };

    let eval = match bsdf.evaluate(scene, illum.dir) {
        Some(e) if !e.f.is_black() => e,
        _ => return Spectrum::BLACK,
    };

    // fold the RR continuation probability into the MIS pdf
    let mut bsdf_pdf_w = eval.direct_pdf_w;
    if depth >= ctx.params.rr_depth {
        bsdf_pdf_w *= eval.f.filter().max(ctx.params.rr_cap).min(1.0);
    }

    let shadow_ray = Ray::segment(bsdf.p(), illum.dir, illum.distance);
    let transmittance =
        match scene.shadow_transmittance(tracer, shadow_ray, vol_info, shadow_pass_through) {
            Some(t) => t,
            None => return Spectrum::BLACK,
        };

    let direct_light_pdf_w = illum.direct_pdf_w * pick_pdf;
    let weight = if light.is_delta() {
        1.0
    } else {
        power_heuristic(1, direct_light_pdf_w, 1, bsdf_pdf_w)
    };

    // a medium scatter vertex has no surface cosine
    let cos_theta = if bsdf.is_volume_scatter() {
        1.0
    } else {
        crate::abs_dot(illum.dir, bsdf.shade_n().0)
    };
    transmittance * illum.radiance * eval.f * (weight * cos_theta / direct_light_pdf_w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCounters, RenderParams, SamplerType};
    use crate::film::{Film, Filter};
    use crate::sampler::MetropolisSharedState;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn worker_ctx(scene: Scene) -> WorkerContext {
        let film = Arc::new(Film::new(
            scene.camera.film_width,
            scene.camera.film_height,
            Filter::default_box(),
        ));
        WorkerContext {
            scene: Arc::new(scene),
            film,
            params: RenderParams {
                sampler_type: SamplerType::Random,
                max_path_depth: 4,
                ..Default::default()
            },
            thread_index: 0,
            interrupt: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(EngineCounters::default()),
            metropolis_shared: Arc::new(MetropolisSharedState::new()),
        }
    }

    fn lit_floor_scene() -> Scene {
        use crate::camera::PerspectiveCamera;
        use crate::light::{LightSource, PointLight};
        use crate::material::{Material, MaterialBase, Materials, MatteMaterial};
        use crate::scene::mesh::TriangleMesh;
        use crate::texture::{Texture, Textures};
        use crate::volume::Volumes;

        let mut texs = Textures::new();
        let kd = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.7)));
        let mut mats = Materials::new();
        let matte = mats.add(Material::Matte(MatteMaterial::new(MaterialBase::default(), kd)));
        let floor = TriangleMesh::quad(
            point3f!(-10, -10, 0),
            point3f!(10, -10, 0),
            point3f!(10, 10, 0),
            point3f!(-10, 10, 0),
            matte,
        );
        let camera = PerspectiveCamera::new(
            point3f!(0, 0, 5),
            point3f!(0, 0, 0),
            vec3f!(0, 1, 0),
            60.0,
            16,
            16,
        );
        let light = LightSource::Point(PointLight::new(point3f!(0, 0, 3), Spectrum::uniform(50.0)));
        Scene::build(camera, vec![floor], texs, mats, Volumes::new(), vec![light]).unwrap()
    }

    #[test]
    fn test_eye_sample_produces_result() {
        let ctx = worker_ctx(lit_floor_scene());
        let tracer = EngineTracer { ctx: &ctx };
        let mut sampler = ctx.make_sampler();
        let mut results = Vec::new();
        trace_eye_sample(&ctx, &tracer, sampler.as_mut(), &mut results);
        assert_eq!(results.len(), 1);
        // the lit floor fills the view: radiance must be positive
        assert!(!results[0].radiance.is_black());
        assert_eq!(results[0].alpha, 1.0);
    }

    #[test]
    fn test_rays_are_counted() {
        let ctx = worker_ctx(lit_floor_scene());
        let tracer = EngineTracer { ctx: &ctx };
        let mut sampler = ctx.make_sampler();
        let mut results = Vec::new();
        trace_eye_sample(&ctx, &tracer, sampler.as_mut(), &mut results);
        assert!(ctx.counters.total_rays.load(Ordering::Relaxed) > 0);
    }
}
