use crate::bsdf::Bsdf;
use crate::engine::path::EngineTracer;
use crate::engine::{russian_roulette, WorkerContext};
use crate::geometry::Ray;
use crate::sampler::{add_sample_result, FilmBufferType, SampleResult, Sampler};
use crate::sampling::pdf_w_to_a;
use crate::scene::RayTracer;
use crate::volume::PathVolumeInfo;
use crate::{Float, Point3f, Spectrum};
use cgmath::InnerSpace;
use std::sync::atomic::Ordering;

// boot: eye pixel (2), light pick (1), emit (4), lens (2), eye ray (2),
// eye pass-through (1)
const SAMPLE_BOOT_SIZE: usize = 12;
const SAMPLE_STEP_SIZE: usize = 6;

const OFFSET_PASS_THROUGH: usize = 0;
const OFFSET_EYE_SHADOW_PASS_THROUGH: usize = 1;
const OFFSET_BSDF_U0: usize = 2;
const OFFSET_BSDF_U1: usize = 3;
const OFFSET_RR: usize = 4;

/// Light tracing: particles leave the lights and splat onto the film
/// through lens connections. The camera ray contributes the directly
/// visible emission so both film buffers stay populated.
pub fn render_worker(ctx: WorkerContext) {
    let mut sampler = ctx.make_sampler();
    sampler.request_samples(
        SAMPLE_BOOT_SIZE + ctx.params.max_path_depth as usize * SAMPLE_STEP_SIZE,
    );

    let tracer = EngineTracer { ctx: &ctx };
    let mut results: Vec<SampleResult> = Vec::new();

    while !ctx.should_stop() {
        results.clear();
        trace_light_sample(&ctx, &tracer, sampler.as_mut(), &mut results);
        sampler.next_sample(&results);
        ctx.counters.total_samples.fetch_add(1, Ordering::Relaxed);
    }
}

fn trace_light_sample(
    ctx: &WorkerContext,
    tracer: &dyn RayTracer,
    sampler: &mut dyn Sampler,
    results: &mut Vec<SampleResult>,
) {
    let scene = &ctx.scene;
    let film = &ctx.film;

    // select one light source
    let (light, _, pick_pdf) = match scene.sample_all_lights(sampler.get_sample(2)) {
        Some(v) => v,
        None => return,
    };

    let light_ctx = scene.light_ctx();
    let emit = match light.emit(
        &light_ctx,
        sampler.get_sample(3),
        sampler.get_sample(4),
        sampler.get_sample(5),
        sampler.get_sample(6),
    ) {
        Some(e) if !e.radiance.is_black() => e,
        _ => return,
    };
    let mut light_path_flux = emit.radiance / (emit.emission_pdf_w * pick_pdf);

    // sample a point on the camera lens
    let lens_point = scene
        .camera
        .sample_lens(sampler.get_sample(7), sampler.get_sample(8));

    // the camera ray handles directly visible lights, keeping the
    // per-pixel buffer aliasing-free even for pixels no particle reaches
    {
        let film_x =
            (sampler.get_sample(0) * film.width() as Float).min(film.width() as Float - 1.0);
        let film_y =
            (sampler.get_sample(1) * film.height() as Float).min(film.height() as Float - 1.0);
        let mut eye_ray = scene.camera.generate_ray(
            film_x,
            film_y,
            sampler.get_sample(9),
            sampler.get_sample(10),
        );

        let mut vol_info = PathVolumeInfo::new();
        let isect = scene.intersect(
            tracer,
            false,
            &mut vol_info,
            sampler.get_sample(11),
            &mut eye_ray,
        );

        let mut radiance = isect.emission;
        let alpha;
        match &isect.bsdf {
            Some(bsdf) => {
                alpha = 1.0;
                if bsdf.is_light_source() {
                    let (emitted, _, _) = bsdf.emitted_radiance(scene);
                    radiance += isect.throughput * emitted;
                }
            }
            None => {
                alpha = 0.0;
                let (env, _, _) = scene.env_radiance(eye_ray.d);
                radiance += isect.throughput * env;
            }
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

    // walk the light path
    let mut ray = Ray::new(emit.origin, emit.dir);
    let mut vol_info = PathVolumeInfo::new();
    let mut depth = 1u32;
    while depth <= ctx.params.max_path_depth {
        let offset = SAMPLE_BOOT_SIZE + (depth - 1) as usize * SAMPLE_STEP_SIZE;

        let isect = scene.intersect(
            tracer,
            true,
            &mut vol_info,
            sampler.get_sample(offset + OFFSET_PASS_THROUGH),
            &mut ray,
        );
        let bsdf = match isect.bsdf {
            Some(bsdf) => bsdf,
            None => break, // ray lost in space
        };
        // light sources behave as black bodies
        if bsdf.is_light_source() {
            break;
        }
        light_path_flux *= isect.throughput;

        connect_to_eye(
            ctx,
            tracer,
            &bsdf,
            &vol_info,
            lens_point,
            light_path_flux,
            sampler.get_sample(offset + OFFSET_EYE_SHADOW_PASS_THROUGH),
            results,
        );

        if depth >= ctx.params.max_path_depth {
            break;
        }

        let sample = match bsdf.sample(
            scene,
            sampler.get_sample(offset + OFFSET_BSDF_U0),
            sampler.get_sample(offset + OFFSET_BSDF_U1),
        ) {
            Some(s) if !s.f_over_pdf.is_black() => s,
            _ => break,
        };

        let (weighted, _) = match russian_roulette(
            &ctx.params,
            depth,
            sample.f_over_pdf,
            sample.pdf_w,
            sampler.get_sample(offset + OFFSET_RR),
        ) {
            Some(v) => v,
            None => break,
        };
        light_path_flux *= weighted;

        vol_info.update(
            sample.event,
            bsdf.hit_point.into_object,
            bsdf.hit_point.interior_volume,
            &scene.volumes,
        );
        ray = Ray::new(bsdf.p(), sample.sampled_dir);
        depth += 1;
    }
}

/// Connects a light-path vertex to the lens and splats the contribution
/// at the raster position the lens sees it through.
#[allow(clippy::too_many_arguments)]
pub(crate) fn connect_to_eye(
    ctx: &WorkerContext,
    tracer: &dyn RayTracer,
    bsdf: &Bsdf,
    vol_info: &PathVolumeInfo,
    lens_point: Point3f,
    flux: Spectrum,
    shadow_pass_through: Float,
    results: &mut Vec<SampleResult>,
) {
    let scene = &ctx.scene;
    let to_vertex = bsdf.p() - lens_point;
    let eye_distance = to_vertex.magnitude();
    if eye_distance < 1e-6 {
        return;
    }
    let eye_dir = to_vertex / eye_distance;

    let eval = match bsdf.evaluate(scene, -eye_dir) {
        Some(e) if !e.f.is_black() => e,
        _ => return,
    };

    let (screen_x, screen_y) =
        match scene.camera.get_sample_position(lens_point, eye_dir, eye_distance) {
            Some(pos) => pos,
            None => return,
        };

    let shadow_ray = Ray::segment(lens_point, eye_dir, eye_distance);
    let transmittance =
        match scene.shadow_transmittance(tracer, shadow_ray, vol_info, shadow_pass_through) {
            Some(t) => t,
            None => return,
        };

    let cos_to_camera = if bsdf.is_volume_scatter() {
        1.0
    } else {
        bsdf.shade_n().dot(-eye_dir).abs()
    };
    let cos_at_camera = scene.camera.direction().dot(eye_dir);
    if cos_at_camera <= 0.0 {
        return;
    }

    let camera_pdf_w =
        1.0 / (cos_at_camera * cos_at_camera * cos_at_camera * scene.camera.pixel_area());
    let flux_to_radiance = pdf_w_to_a(camera_pdf_w, eye_distance, cos_to_camera);

    add_sample_result(
        results,
        FilmBufferType::PerScreenNormalized,
        screen_x,
        screen_y,
        transmittance * flux * eval.f * flux_to_radiance,
        1.0,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::engine::{EngineCounters, RenderParams, SamplerType};
    use crate::film::{Film, Filter};
    use crate::light::{LightSource, PointLight};
    use crate::material::{Material, MaterialBase, Materials, MatteMaterial};
    use crate::sampler::MetropolisSharedState;
    use crate::scene::mesh::TriangleMesh;
    use crate::scene::Scene;
    use crate::texture::{Texture, Textures};
    use crate::volume::Volumes;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn scene_with_point_light() -> Scene {
        let mut texs = Textures::new();
        let kd = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.8)));
        let mut mats = Materials::new();
        let matte = mats.add(Material::Matte(MatteMaterial::new(MaterialBase::default(), kd)));
        let floor = TriangleMesh::quad(
            point3f!(-5, -5, 0),
            point3f!(5, -5, 0),
            point3f!(5, 5, 0),
            point3f!(-5, 5, 0),
            matte,
        );
        let camera = PerspectiveCamera::new(
            point3f!(0, 0, 4),
            point3f!(0, 0, 0),
            vec3f!(0, 1, 0),
            60.0,
            32,
            32,
        );
        let light = LightSource::Point(PointLight::new(point3f!(0, 0, 2), Spectrum::uniform(30.0)));
        Scene::build(camera, vec![floor], texs, mats, Volumes::new(), vec![light]).unwrap()
    }

    #[test]
    fn test_light_tracing_splats_to_screen_buffer() {
        let scene = scene_with_point_light();
        let film = Arc::new(Film::new(32, 32, Filter::default_box()));
        let ctx = WorkerContext {
            scene: Arc::new(scene),
            film: film.clone(),
            params: RenderParams {
                sampler_type: SamplerType::Random,
                max_path_depth: 4,
                ..Default::default()
            },
            thread_index: 0,
            interrupt: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(EngineCounters::default()),
            metropolis_shared: Arc::new(MetropolisSharedState::new()),
        };
        let tracer = EngineTracer { ctx: &ctx };
        let mut sampler = ctx.make_sampler();

        let mut found_splat = false;
        for _ in 0..256 {
            let mut results = Vec::new();
            trace_light_sample(&ctx, &tracer, sampler.as_mut(), &mut results);
            if results
                .iter()
                .any(|r| r.buffer == FilmBufferType::PerScreenNormalized && !r.radiance.is_black())
            {
                found_splat = true;
                break;
            }
            sampler.next_sample(&results);
        }
        assert!(found_splat, "light tracing never reached the lens");
    }
}
