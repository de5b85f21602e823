use crate::bsdf::Bsdf;
use crate::engine::path::EngineTracer;
use crate::engine::{russian_roulette, WorkerContext};
use crate::geometry::Ray;
use crate::sampler::{add_sample_result, FilmBufferType, SampleResult, Sampler};
use crate::sampling::pdf_w_to_a;
use crate::scene::{RayTracer, Scene};
use crate::volume::PathVolumeInfo;
use crate::{Float, Point3f, Spectrum};
use cgmath::InnerSpace;
use std::sync::atomic::Ordering;

// power heuristic
fn mis(a: Float) -> Float {
    a * a
}

pub(crate) const SAMPLE_EYE_BOOT_SIZE: usize = 6;
pub(crate) const SAMPLE_EYE_STEP_SIZE: usize = 11;
pub(crate) const SAMPLE_LIGHT_BOOT_SIZE: usize = 5;
pub(crate) const SAMPLE_LIGHT_STEP_SIZE: usize = 6;

pub(crate) fn sample_size(max_eye_depth: u32, max_light_depth: u32) -> usize {
    SAMPLE_EYE_BOOT_SIZE
        + max_eye_depth as usize * SAMPLE_EYE_STEP_SIZE
        + SAMPLE_LIGHT_BOOT_SIZE
        + max_light_depth as usize * SAMPLE_LIGHT_STEP_SIZE
}

fn light_sample_offset(max_eye_depth: u32) -> usize {
    SAMPLE_EYE_BOOT_SIZE + max_eye_depth as usize * SAMPLE_EYE_STEP_SIZE
}

/// A subpath vertex with the two running MIS quantities that let every
/// competing strategy be weighted in O(1) at connection time.
pub(crate) struct PathVertex {
    pub bsdf: Bsdf,
    pub throughput: Spectrum,
    pub depth: u32,
    pub d_vcm: Float,
    pub d_vc: Float,
    pub vol_info: PathVolumeInfo,
}

/// A contribution whose visibility is still unresolved. The CPU engine
/// traces the ray immediately; the hybrid engine batches them into ray
/// buffers.
pub(crate) struct Connection {
    pub ray: Ray,
    pub vol_info: PathVolumeInfo,
    pub pass_through: Float,
    pub radiance: Spectrum,
    pub kind: ConnectionKind,
}

pub(crate) enum ConnectionKind {
    /// Adds to the eye sample's pixel.
    Eye,
    /// Splats to the per-screen buffer at the raster position.
    LightSplat { x: Float, y: Float },
}

/// Everything one bidirectional sample produced before visibility
/// resolution.
pub(crate) struct BiDirSample {
    pub film_x: Float,
    pub film_y: Float,
    pub alpha: Float,
    pub base_radiance: Spectrum,
    pub connections: Vec<Connection>,
}

/// Bidirectional path tracing, one eye and one light subpath per sample.
pub fn render_worker(ctx: WorkerContext) {
    let mut sampler = ctx.make_sampler();
    sampler.request_samples(sample_size(ctx.params.max_eye_depth, ctx.params.max_light_depth));

    let tracer = EngineTracer { ctx: &ctx };
    let mut results: Vec<SampleResult> = Vec::new();

    while !ctx.should_stop() {
        results.clear();
        let sample = trace_bidir_sample(&ctx, &tracer, sampler.as_mut());
        resolve_connections_sync(&ctx, &tracer, sample, &mut results);
        sampler.next_sample(&results);
        ctx.counters.total_samples.fetch_add(1, Ordering::Relaxed);
    }
}

/// Renders exactly `count` bidirectional samples on the calling thread.
pub fn render_samples(ctx: &WorkerContext, count: u64) {
    let mut sampler = ctx.make_sampler();
    sampler.request_samples(sample_size(ctx.params.max_eye_depth, ctx.params.max_light_depth));
    let tracer = EngineTracer { ctx };
    let mut results: Vec<SampleResult> = Vec::new();
    for _ in 0..count {
        results.clear();
        let sample = trace_bidir_sample(ctx, &tracer, sampler.as_mut());
        resolve_connections_sync(ctx, &tracer, sample, &mut results);
        sampler.next_sample(&results);
        ctx.counters.total_samples.fetch_add(1, Ordering::Relaxed);
    }
}

/// Resolves every pending connection with an immediate shadow trace.
pub(crate) fn resolve_connections_sync(
    ctx: &WorkerContext,
    tracer: &dyn RayTracer,
    sample: BiDirSample,
    results: &mut Vec<SampleResult>,
) {
    let scene = &ctx.scene;
    let mut eye_radiance = sample.base_radiance;
    for conn in sample.connections {
        let transmittance = match scene.shadow_transmittance(
            tracer,
            conn.ray,
            &conn.vol_info,
            conn.pass_through,
        ) {
            Some(t) => t,
            None => continue,
        };
        match conn.kind {
            ConnectionKind::Eye => eye_radiance += conn.radiance * transmittance,
            ConnectionKind::LightSplat { x, y } => add_sample_result(
                results,
                FilmBufferType::PerScreenNormalized,
                x,
                y,
                conn.radiance * transmittance,
                1.0,
            ),
        }
    }
    add_sample_result(
        results,
        FilmBufferType::PerPixelNormalized,
        sample.film_x,
        sample.film_y,
        eye_radiance,
        sample.alpha,
    );
}

/// Builds the light subpath, the eye subpath, and every connection
/// between them.
pub(crate) fn trace_bidir_sample(
    ctx: &WorkerContext,
    tracer: &dyn RayTracer,
    sampler: &mut dyn Sampler,
) -> BiDirSample {
    let scene = &ctx.scene;
    let film = &ctx.film;
    let mut connections = Vec::new();

    // lens point shared by every light-to-eye connection of this sample
    let lens_point = scene
        .camera
        .sample_lens(sampler.get_sample(2), sampler.get_sample(3));

    //--------------------------------------------------------------------
    // Light subpath
    //--------------------------------------------------------------------
    let light_vertices = trace_light_subpath(ctx, tracer, sampler, lens_point, &mut connections);

    //--------------------------------------------------------------------
    // Eye subpath
    //--------------------------------------------------------------------
    let film_x = (sampler.get_sample(0) * film.width() as Float).min(film.width() as Float - 1.0);
    let film_y = (sampler.get_sample(1) * film.height() as Float).min(film.height() as Float - 1.0);
    let mut ray = scene
        .camera
        .generate_ray(film_x, film_y, sampler.get_sample(4), sampler.get_sample(5));

    let pixel_count = (film.width() * film.height()) as Float;
    let cos_at_camera = scene.camera.direction().dot(ray.d);
    let camera_pdf_w = 1.0
        / (cos_at_camera
            * cos_at_camera
            * cos_at_camera
            * scene.camera.pixel_area()
            * pixel_count);

    let mut eye = PathVertex {
        // placeholder until the first hit; only the MIS state is live
        bsdf: Bsdf::from_volume_scatter(&ray, 1.0, 0, 0.5, false),
        throughput: Spectrum::WHITE,
        depth: 1,
        d_vcm: mis(1.0 / camera_pdf_w),
        d_vc: 0.0,
        vol_info: PathVolumeInfo::new(),
    };

    let mut base_radiance = Spectrum::BLACK;
    let mut alpha = 1.0;

    while eye.depth <= ctx.params.max_eye_depth {
        let offset = SAMPLE_EYE_BOOT_SIZE + (eye.depth - 1) as usize * SAMPLE_EYE_STEP_SIZE;
        let pass_through = sampler.get_sample(offset);

        let prev_origin = ray.o;
        let mut vol_info = eye.vol_info.clone();
        let isect = scene.intersect(tracer, false, &mut vol_info, pass_through, &mut ray);
        eye.vol_info = vol_info;
        base_radiance += eye.throughput * isect.emission;

        if !isect.hit() {
            // escaped: environment contribution with full MIS state
            let (env, direct_pdf_w, emission_pdf_w) = scene.env_radiance(ray.d);
            if !env.is_black() {
                let weight = if eye.depth == 1 {
                    1.0
                } else {
                    let weight_camera =
                        mis(direct_pdf_w) * eye.d_vcm + mis(emission_pdf_w) * eye.d_vc;
                    1.0 / (weight_camera + 1.0)
                };
                base_radiance += eye.throughput * env * weight;
            }
            if eye.depth == 1 {
                alpha = 0.0;
            }
            break;
        }

        let bsdf = isect.bsdf.unwrap();
        eye.throughput *= isect.throughput;

        // update MIS constants for the traveled segment
        let distance = (bsdf.p() - prev_origin).magnitude();
        eye.d_vcm *= mis(distance * distance);
        let cos_factor = bsdf.hit_point.fixed_dir.dot(bsdf.shade_n().0).abs();
        eye.d_vcm /= mis(cos_factor);
        eye.d_vc /= mis(cos_factor);

        // the eye walked into a light source
        if bsdf.is_light_source() {
            let (emitted, direct_pdf_a, emission_pdf_w) = bsdf.emitted_radiance(scene);
            if !emitted.is_black() {
                let weight = if eye.depth == 1 {
                    1.0
                } else {
                    let light_index = bsdf.triangle_light_index.unwrap();
                    let pick_pdf = scene.light_defs.light_pick_pdf(light_index);
                    let weight_camera = mis(direct_pdf_a * pick_pdf) * eye.d_vcm
                        + mis(emission_pdf_w * pick_pdf) * eye.d_vc;
                    1.0 / (weight_camera + 1.0)
                };
                base_radiance += eye.throughput * emitted * weight;
            }
            break;
        }
        eye.bsdf = bsdf;

        if !eye.bsdf.is_delta(scene) {
            // strategy: direct light sampling at this eye vertex
            direct_light_sampling(
                ctx,
                &eye,
                sampler.get_sample(offset + 1),
                sampler.get_sample(offset + 2),
                sampler.get_sample(offset + 3),
                sampler.get_sample(offset + 4),
                &mut connections,
            );

            // strategy: connect to every stored light vertex
            for (light_vertex_index, light_vertex) in light_vertices.iter().enumerate() {
                let light_offset = light_sample_offset(ctx.params.max_eye_depth)
                    + SAMPLE_LIGHT_BOOT_SIZE
                    + light_vertex_index * SAMPLE_LIGHT_STEP_SIZE;
                connect_vertices(
                    ctx,
                    &eye,
                    light_vertex,
                    sampler.get_sample(light_offset + 5),
                    &mut connections,
                );
            }
        }

        // extend the eye path
        if !bounce(
            ctx,
            scene,
            sampler.get_sample(offset + 5),
            sampler.get_sample(offset + 6),
            sampler.get_sample(offset + 7),
            &mut eye,
            &mut ray,
        ) {
            break;
        }
        eye.depth += 1;
    }

    BiDirSample {
        film_x,
        film_y,
        alpha,
        base_radiance,
        connections,
    }
}

fn trace_light_subpath(
    ctx: &WorkerContext,
    tracer: &dyn RayTracer,
    sampler: &mut dyn Sampler,
    lens_point: Point3f,
    connections: &mut Vec<Connection>,
) -> Vec<PathVertex> {
    let scene = &ctx.scene;
    let boot = light_sample_offset(ctx.params.max_eye_depth);
    let mut vertices: Vec<PathVertex> = Vec::new();

    let (light, _, pick_pdf) = match scene.sample_all_lights(sampler.get_sample(boot)) {
        Some(v) => v,
        None => return vertices,
    };
    let light_ctx = scene.light_ctx();
    let emit = match light.emit(
        &light_ctx,
        sampler.get_sample(boot + 1),
        sampler.get_sample(boot + 2),
        sampler.get_sample(boot + 3),
        sampler.get_sample(boot + 4),
    ) {
        Some(e) if !e.radiance.is_black() => e,
        _ => return vertices,
    };

    let emit_pdf_w = emit.emission_pdf_w * pick_pdf;
    let direct_pdf_a = emit.direct_pdf_a * pick_pdf;

    // vertex 0 lives on the light itself; direct lighting covers those
    // paths, so only the walk from here on is stored
    let mut vertex = PathVertex {
        bsdf: Bsdf::from_volume_scatter(&Ray::new(emit.origin, emit.dir), 1.0, 0, 0.5, true),
        throughput: emit.radiance / emit_pdf_w,
        depth: 1,
        d_vcm: mis(direct_pdf_a / emit_pdf_w),
        d_vc: {
            let used_cos = if light.is_environmental() { 1.0 } else { emit.cos_theta_at_light };
            mis(used_cos / emit_pdf_w)
        },
        vol_info: PathVolumeInfo::new(),
    };

    let mut ray = Ray::new(emit.origin, emit.dir);
    let is_env = light.is_environmental();

    while vertex.depth <= ctx.params.max_light_depth {
        let offset =
            boot + SAMPLE_LIGHT_BOOT_SIZE + (vertex.depth - 1) as usize * SAMPLE_LIGHT_STEP_SIZE;

        let prev_origin = ray.o;
        let mut vol_info = vertex.vol_info.clone();
        let isect = scene.intersect(
            tracer,
            true,
            &mut vol_info,
            sampler.get_sample(offset),
            &mut ray,
        );
        vertex.vol_info = vol_info;

        let bsdf = match isect.bsdf {
            Some(b) => b,
            None => break, // ray lost in space
        };
        // light sources behave as black bodies
        if bsdf.is_light_source() {
            break;
        }

        vertex.throughput *= isect.throughput;

        // infinite lights use solid-angle MIS for the first segment
        let distance = (bsdf.p() - prev_origin).magnitude();
        if vertex.depth > 1 || !is_env {
            vertex.d_vcm *= mis(distance * distance);
        }
        let cos_factor = bsdf.hit_point.fixed_dir.dot(bsdf.shade_n().0).abs();
        vertex.d_vcm /= mis(cos_factor);
        vertex.d_vc /= mis(cos_factor);
        vertex.bsdf = bsdf;

        if !vertex.bsdf.is_delta(scene) {
            let stored = PathVertex {
                bsdf: vertex.bsdf.clone(),
                throughput: vertex.throughput,
                depth: vertex.depth,
                d_vcm: vertex.d_vcm,
                d_vc: vertex.d_vc,
                vol_info: vertex.vol_info.clone(),
            };
            // strategy: connect this light vertex to the camera lens
            connect_to_eye(
                ctx,
                &stored,
                lens_point,
                sampler.get_sample(offset + 1),
                connections,
            );
            vertices.push(stored);
        }

        if vertex.depth >= ctx.params.max_light_depth {
            break;
        }

        if !bounce(
            ctx,
            scene,
            sampler.get_sample(offset + 2),
            sampler.get_sample(offset + 3),
            sampler.get_sample(offset + 4),
            &mut vertex,
            &mut ray,
        ) {
            break;
        }
        vertex.depth += 1;
    }

    vertices
}

/// Shared subpath extension: samples the BSDF, applies Russian roulette,
/// and maintains the dVC/dVCM recurrences.
fn bounce(
    ctx: &WorkerContext,
    scene: &Scene,
    u0: Float,
    u1: Float,
    u_rr: Float,
    vertex: &mut PathVertex,
    ray: &mut Ray,
) -> bool {
    let sample = match vertex.bsdf.sample(scene, u0, u1) {
        Some(s) if !s.f_over_pdf.is_black() => s,
        _ => return false,
    };

    let rr_prob = if vertex.depth >= ctx.params.rr_depth {
        sample.f_over_pdf.filter().max(ctx.params.rr_cap).min(1.0)
    } else {
        1.0
    };
    let (weighted, pdf_w) = match russian_roulette(
        &ctx.params,
        vertex.depth,
        sample.f_over_pdf,
        sample.pdf_w,
        u_rr,
    ) {
        Some(v) => v,
        None => return false,
    };

    let rev_pdf_w = if sample.event.is_specular() {
        pdf_w
    } else {
        let (_, rev) = vertex.bsdf.pdf(scene, sample.sampled_dir);
        rev * rr_prob
    };

    vertex.throughput *= weighted;

    let cos_sampled = sample.abs_cos_sampled;
    if sample.event.is_specular() {
        vertex.d_vcm = 0.0;
        vertex.d_vc *= mis(cos_sampled / pdf_w) * mis(rev_pdf_w);
    } else {
        vertex.d_vc = mis(cos_sampled / pdf_w) * (vertex.d_vc * mis(rev_pdf_w) + vertex.d_vcm);
        vertex.d_vcm = mis(1.0 / pdf_w);
    }

    vertex.vol_info.update(
        sample.event,
        vertex.bsdf.hit_point.into_object,
        vertex.bsdf.hit_point.interior_volume,
        &scene.volumes,
    );
    *ray = Ray::new(vertex.bsdf.p(), sample.sampled_dir);
    true
}

/// Direct-light-sampling strategy at an eye vertex.
fn direct_light_sampling(
    ctx: &WorkerContext,
    eye: &PathVertex,
    u_pick: Float,
    u0: Float,
    u1: Float,
    shadow_pass_through: Float,
    connections: &mut Vec<Connection>,
) {
    let scene = &ctx.scene;
    let (light, _, pick_pdf) = match scene.sample_all_lights(u_pick) {
        Some(v) => v,
        None => return,
    };
    let light_ctx = scene.light_ctx();
    let illum = match light.illuminate(&light_ctx, eye.bsdf.p(), u0, u1) {
        Some(i) if !i.radiance.is_black() => i,
        _ => return,
    };

    let eval = match eye.bsdf.evaluate(scene, illum.dir) {
        Some(e) if !e.f.is_black() => e,
        _ => return,
    };

    let mut bsdf_pdf_w = eval.direct_pdf_w;
    let mut bsdf_rev_pdf_w = eval.reverse_pdf_w;
    if eye.depth >= ctx.params.rr_depth {
        let prob = eval.f.filter().max(ctx.params.rr_cap).min(1.0);
        bsdf_pdf_w *= prob;
        bsdf_rev_pdf_w *= prob;
    }

    let cos_to_light = if eye.bsdf.is_volume_scatter() {
        1.0
    } else {
        crate::abs_dot(illum.dir, eye.bsdf.shade_n().0)
    };
    let direct_light_pdf_w = illum.direct_pdf_w * pick_pdf;

    // emissionPdfA / directPdfA == emissionPdfW / directPdfW
    let weight_light = if light.is_delta() {
        0.0
    } else {
        mis(bsdf_pdf_w / direct_light_pdf_w)
    };
    let weight_camera =
        mis(illum.emission_pdf_w * cos_to_light / (illum.direct_pdf_w * illum.cos_theta_at_light))
            * (eye.d_vcm + eye.d_vc * mis(bsdf_rev_pdf_w));
    let mis_weight = 1.0 / (weight_light + 1.0 + weight_camera);

    let factor = cos_to_light / direct_light_pdf_w;
    let radiance = (mis_weight * factor) * eye.throughput * illum.radiance * eval.f;
    if radiance.is_black() {
        return;
    }

    connections.push(Connection {
        ray: Ray::segment(eye.bsdf.p(), illum.dir, illum.distance),
        vol_info: eye.vol_info.clone(),
        pass_through: shadow_pass_through,
        radiance,
        kind: ConnectionKind::Eye,
    });
}

/// Light-to-eye strategy: projects a stored light vertex through the lens.
fn connect_to_eye(
    ctx: &WorkerContext,
    light_vertex: &PathVertex,
    lens_point: Point3f,
    shadow_pass_through: Float,
    connections: &mut Vec<Connection>,
) {
    let scene = &ctx.scene;
    let film = &ctx.film;

    let to_vertex = light_vertex.bsdf.p() - lens_point;
    let eye_distance = to_vertex.magnitude();
    if eye_distance < 1e-6 {
        return;
    }
    let eye_dir = to_vertex / eye_distance;

    let eval = match light_vertex.bsdf.evaluate(scene, -eye_dir) {
        Some(e) if !e.f.is_black() => e,
        _ => return,
    };

    let (screen_x, screen_y) =
        match scene.camera.get_sample_position(lens_point, eye_dir, eye_distance) {
            Some(pos) => pos,
            None => return,
        };

    let mut bsdf_rev_pdf_w = eval.reverse_pdf_w;
    if light_vertex.depth >= ctx.params.rr_depth {
        bsdf_rev_pdf_w *= eval.f.filter().max(ctx.params.rr_cap).min(1.0);
    }

    let cos_to_camera = if light_vertex.bsdf.is_volume_scatter() {
        1.0
    } else {
        light_vertex.bsdf.shade_n().dot(-eye_dir).abs()
    };
    let cos_at_camera = scene.camera.direction().dot(eye_dir);
    if cos_at_camera <= 0.0 {
        return;
    }

    let camera_pdf_w =
        1.0 / (cos_at_camera * cos_at_camera * cos_at_camera * scene.camera.pixel_area());
    let camera_pdf_a = pdf_w_to_a(camera_pdf_w, eye_distance, cos_to_camera);
    let flux_to_radiance = camera_pdf_a;

    // cameraPdfA expressed in normalized device coordinates for the weight
    let pixel_count = (film.width() * film.height()) as Float;
    let weight_light = mis(camera_pdf_a / pixel_count)
        * (light_vertex.d_vcm + light_vertex.d_vc * mis(bsdf_rev_pdf_w));
    let mis_weight = 1.0 / (weight_light + 1.0);

    let radiance = mis_weight * light_vertex.throughput * flux_to_radiance * eval.f;
    if radiance.is_black() {
        return;
    }

    connections.push(Connection {
        ray: Ray::segment(lens_point, eye_dir, eye_distance),
        vol_info: light_vertex.vol_info.clone(),
        pass_through: shadow_pass_through,
        radiance,
        kind: ConnectionKind::LightSplat { x: screen_x, y: screen_y },
    });
}

/// Vertex-to-vertex strategy between one eye and one light vertex.
fn connect_vertices(
    ctx: &WorkerContext,
    eye: &PathVertex,
    light_vertex: &PathVertex,
    shadow_pass_through: Float,
    connections: &mut Vec<Connection>,
) {
    let scene = &ctx.scene;
    let to_light = light_vertex.bsdf.p() - eye.bsdf.p();
    let distance2 = to_light.magnitude2();
    if distance2 < 1e-12 {
        return;
    }
    let distance = distance2.sqrt();
    let dir = to_light / distance;

    let eye_eval = match eye.bsdf.evaluate(scene, dir) {
        Some(e) if !e.f.is_black() => e,
        _ => return,
    };
    let light_eval = match light_vertex.bsdf.evaluate(scene, -dir) {
        Some(e) if !e.f.is_black() => e,
        _ => return,
    };

    let cos_at_eye = if eye.bsdf.is_volume_scatter() {
        1.0
    } else {
        eye.bsdf.shade_n().dot(dir).abs()
    };
    let cos_at_light = if light_vertex.bsdf.is_volume_scatter() {
        1.0
    } else {
        light_vertex.bsdf.shade_n().dot(-dir).abs()
    };
    let geometry_term = cos_at_eye * cos_at_light / distance2;
    if geometry_term <= 0.0 {
        return;
    }

    let mut eye_pdf_w = eye_eval.direct_pdf_w;
    let mut eye_rev_pdf_w = eye_eval.reverse_pdf_w;
    if eye.depth >= ctx.params.rr_depth {
        let prob = eye_eval.f.filter().max(ctx.params.rr_cap).min(1.0);
        eye_pdf_w *= prob;
        eye_rev_pdf_w *= prob;
    }
    let mut light_pdf_w = light_eval.direct_pdf_w;
    let mut light_rev_pdf_w = light_eval.reverse_pdf_w;
    if light_vertex.depth >= ctx.params.rr_depth {
        let prob = light_eval.f.filter().max(ctx.params.rr_cap).min(1.0);
        light_pdf_w *= prob;
        light_rev_pdf_w *= prob;
    }

    // convert to area pdfs at the opposite vertex
    let eye_pdf_a = pdf_w_to_a(eye_pdf_w, distance, cos_at_light);
    let light_pdf_a = pdf_w_to_a(light_pdf_w, distance, cos_at_eye);

    let weight_light =
        mis(eye_pdf_a) * (light_vertex.d_vcm + light_vertex.d_vc * mis(light_rev_pdf_w));
    let weight_eye = mis(light_pdf_a) * (eye.d_vcm + eye.d_vc * mis(eye_rev_pdf_w));
    let mis_weight = 1.0 / (weight_light + 1.0 + weight_eye);

    let radiance = (mis_weight * geometry_term)
        * eye.throughput
        * eye_eval.f
        * light_eval.f
        * light_vertex.throughput;
    if radiance.is_black() {
        return;
    }

    connections.push(Connection {
        ray: Ray::segment(eye.bsdf.p(), dir, distance),
        vol_info: eye.vol_info.clone(),
        pass_through: shadow_pass_through,
        radiance,
        kind: ConnectionKind::Eye,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::engine::{EngineCounters, RenderParams, SamplerType};
    use crate::film::{Film, Filter};
    use crate::material::{Material, MaterialBase, Materials, MatteMaterial};
    use crate::sampler::MetropolisSharedState;
    use crate::scene::mesh::TriangleMesh;
    use crate::texture::{Texture, Textures};
    use crate::volume::Volumes;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    fn box_scene() -> Scene {
        let mut texs = Textures::new();
        let kd = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.7)));
        let emit = texs.add(Texture::ConstSpectrum(Spectrum::uniform(8.0)));
        let mut mats = Materials::new();
        let matte = mats.add(Material::Matte(MatteMaterial::new(MaterialBase::default(), kd)));
        let mut base = MaterialBase::default();
        base.emission = Some(emit);
        let light_mat = mats.add(Material::Matte(MatteMaterial::new(base, kd)));

        let floor = TriangleMesh::quad(
            point3f!(-2, -2, 0),
            point3f!(2, -2, 0),
            point3f!(2, 2, 0),
            point3f!(-2, 2, 0),
            matte,
        );
        // ceiling light facing down
        let light_quad = TriangleMesh::quad(
            point3f!(-0.5, -0.5, 3),
            point3f!(-0.5, 0.5, 3),
            point3f!(0.5, 0.5, 3),
            point3f!(0.5, -0.5, 3),
            light_mat,
        );
        let camera = PerspectiveCamera::new(
            point3f!(0, 0, 2),
            point3f!(0, 0, 0),
            vec3f!(0, 1, 0),
            70.0,
            24,
            24,
        );
        Scene::build(camera, vec![floor, light_quad], texs, mats, Volumes::new(), vec![]).unwrap()
    }

    fn worker_ctx(scene: Scene) -> WorkerContext {
        let film = Arc::new(Film::new(24, 24, Filter::default_box()));
        WorkerContext {
            scene: Arc::new(scene),
            film,
            params: RenderParams {
                sampler_type: SamplerType::Random,
                max_eye_depth: 5,
                max_light_depth: 5,
                ..Default::default()
            },
            thread_index: 0,
            interrupt: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(EngineCounters::default()),
            metropolis_shared: Arc::new(MetropolisSharedState::new()),
        }
    }

    #[test]
    fn test_bidir_sample_gathers_light() {
        let ctx = worker_ctx(box_scene());
        let tracer = EngineTracer { ctx: &ctx };
        let mut sampler = ctx.make_sampler();
        sampler.request_samples(sample_size(5, 5));

        let mut any_radiance = false;
        for _ in 0..64 {
            let mut results = Vec::new();
            let sample = trace_bidir_sample(&ctx, &tracer, sampler.as_mut());
            resolve_connections_sync(&ctx, &tracer, sample, &mut results);
            if results.iter().any(|r| !r.radiance.is_black()) {
                any_radiance = true;
            }
            sampler.next_sample(&results);
        }
        assert!(any_radiance, "bidirectional transport found no light");
    }

    #[test]
    fn test_light_subpath_stores_diffuse_vertices() {
        let ctx = worker_ctx(box_scene());
        let tracer = EngineTracer { ctx: &ctx };
        let mut sampler = ctx.make_sampler();
        sampler.request_samples(sample_size(5, 5));

        let mut stored_any = false;
        for _ in 0..32 {
            let mut connections = Vec::new();
            let lens = ctx.scene.camera.sample_lens(0.5, 0.5);
            let vertices =
                trace_light_subpath(&ctx, &tracer, sampler.as_mut(), lens, &mut connections);
            for v in &vertices {
                assert!(!v.bsdf.is_delta(&ctx.scene));
                assert!(v.d_vcm >= 0.0);
            }
            stored_any |= !vertices.is_empty();
            sampler.next_sample(&[]);
        }
        assert!(stored_any);
    }
}
