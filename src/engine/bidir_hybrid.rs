use crate::engine::bidir::{
    resolve_connections_sync, sample_size, trace_bidir_sample, BiDirSample, ConnectionKind,
};
use crate::engine::WorkerContext;
use crate::geometry::Ray;
use crate::sampler::{add_sample_result, FilmBufferType, SampleResult, Sampler};
use crate::scene::RayTracer;
use crate::device::{IntersectionDevice, VirtualM2ODevice};
use crate::RayHit;
use std::cell::RefCell;
use std::sync::atomic::Ordering;

/// Synchronous adapter over the dispatch layer for subpath-extension
/// rays; connection rays go through the buffered path instead.
struct DeviceTracer<'a> {
    device: &'a VirtualM2ODevice,
    scratch: RefCell<Vec<RayHit>>,
}

impl<'a> RayTracer for DeviceTracer<'a> {
    fn trace_ray(&self, ray: &Ray) -> RayHit {
        let mut hits = self.scratch.borrow_mut();
        self.device.trace_sync(std::slice::from_ref(ray), &mut hits);
        hits[0]
    }
}

/// Per-state resume record: the sample whose connections are in flight
/// and where its rays start inside the shared buffer.
struct InFlightState {
    sample: BiDirSample,
    first_ray_index: usize,
}

/// Bidirectional engine whose visibility rays ride the intersection
/// dispatch layer. Each worker coalesces the connection rays of many
/// samples into one buffer, pushes it, and resumes every sample once the
/// buffer pops; between push and pop the worker never blocks on anything
/// else.
pub fn render_worker(ctx: WorkerContext) {
    let state_count = ctx.params.hybrid_state_count.max(1);

    // worst case: every eye vertex connects to a light and every light
    // vertex, and every light vertex splats to the eye
    let per_sample_rays = ctx.params.max_eye_depth as usize
        * (1 + ctx.params.max_light_depth as usize)
        + ctx.params.max_light_depth as usize;
    let buffer_capacity = (state_count * per_sample_rays).max(64);

    let device = VirtualM2ODevice::new(ctx.scene.clone(), buffer_capacity);
    let producer_id = ctx.thread_index;
    let tracer = DeviceTracer { device: &device, scratch: RefCell::new(Vec::with_capacity(1)) };

    let mut samplers: Vec<Box<dyn Sampler>> = (0..state_count)
        .map(|i| {
            let mut s = WorkerContext {
                scene: ctx.scene.clone(),
                film: ctx.film.clone(),
                params: {
                    let mut p = ctx.params;
                    p.seed = ctx.params.seed
                        + (ctx.thread_index * state_count + i) as u64;
                    p
                },
                thread_index: ctx.thread_index,
                interrupt: ctx.interrupt.clone(),
                counters: ctx.counters.clone(),
                metropolis_shared: ctx.metropolis_shared.clone(),
            }
            .make_sampler();
            s.request_samples(sample_size(ctx.params.max_eye_depth, ctx.params.max_light_depth));
            s
        })
        .collect();

    let mut results: Vec<SampleResult> = Vec::new();

    while !ctx.should_stop() {
        // phase 1: build a batch of samples, queueing connection rays
        let mut buffer = device.new_ray_buffer(producer_id);
        let mut in_flight: Vec<InFlightState> = Vec::with_capacity(state_count);

        for sampler in samplers.iter_mut() {
            let sample = trace_bidir_sample(&ctx, &tracer, sampler.as_mut());
            let first_ray_index = buffer.len();
            for conn in &sample.connections {
                buffer.add_ray(conn.ray);
            }
            in_flight.push(InFlightState { sample, first_ray_index });
        }

        if buffer.is_empty() {
            // nothing to resolve: finish the samples immediately
            for (state, sampler) in in_flight.into_iter().zip(samplers.iter_mut()) {
                results.clear();
                resolve_connections_sync(&ctx, &tracer, state.sample, &mut results);
                sampler.next_sample(&results);
                ctx.counters.total_samples.fetch_add(1, Ordering::Relaxed);
            }
            continue;
        }

        // phase 2: one push, one pop; the device overlaps our batches
        device.push_ray_buffer(buffer);
        let completed = device.pop_ray_buffer(producer_id);

        // phase 3: resume every sample against the completed buffer
        for (state, sampler) in in_flight.into_iter().zip(samplers.iter_mut()) {
            results.clear();
            let mut eye_radiance = state.sample.base_radiance;
            for (i, conn) in state.sample.connections.iter().enumerate() {
                // an occluded connection contributes nothing; pass-through
                // chains are resolved by the CPU engines only
                if !completed.hit(state.first_ray_index + i).is_miss() {
                    continue;
                }
                match conn.kind {
                    ConnectionKind::Eye => eye_radiance += conn.radiance,
                    ConnectionKind::LightSplat { x, y } => add_sample_result(
                        &mut results,
                        FilmBufferType::PerScreenNormalized,
                        x,
                        y,
                        conn.radiance,
                        1.0,
                    ),
                }
            }
            add_sample_result(
                &mut results,
                FilmBufferType::PerPixelNormalized,
                state.sample.film_x,
                state.sample.film_y,
                eye_radiance,
                state.sample.alpha,
            );
            sampler.next_sample(&results);
            ctx.counters.total_samples.fetch_add(1, Ordering::Relaxed);
        }
    }

    device.interrupt();
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
    use crate::scene::Scene;
    use crate::texture::{Texture, Textures};
    use crate::volume::Volumes;
    use crate::Spectrum;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_hybrid_worker_renders_until_interrupted() {
        let mut texs = Textures::new();
        let kd = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.6)));
        let emit = texs.add(Texture::ConstSpectrum(Spectrum::uniform(4.0)));
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
            16,
            16,
        );
        let scene =
            Scene::build(camera, vec![floor, light_quad], texs, mats, Volumes::new(), vec![])
                .unwrap();

        let film = Arc::new(Film::new(16, 16, Filter::default_box()));
        let interrupt = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(EngineCounters::default());
        let ctx = WorkerContext {
            scene: Arc::new(scene),
            film: film.clone(),
            params: RenderParams {
                sampler_type: SamplerType::Random,
                max_eye_depth: 3,
                max_light_depth: 3,
                hybrid_state_count: 4,
                ..Default::default()
            },
            thread_index: 0,
            interrupt: interrupt.clone(),
            counters: counters.clone(),
            metropolis_shared: Arc::new(MetropolisSharedState::new()),
        };

        let handle = std::thread::spawn(move || render_worker(ctx));
        std::thread::sleep(std::time::Duration::from_millis(200));
        interrupt.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        assert!(counters.total_samples.load(Ordering::Relaxed) > 0);
        assert!(film.sample_count() > 0.0);
    }
}
