use crate::device::raybuffer::{DoneQueue, RayBuffer, TodoQueue, RAY_BUFFER_SIZE};
use crate::device::{DeviceStats, IntersectionDevice};
use crate::geometry::Ray;
use crate::scene::{RayTracer, Scene};
use crate::RayHit;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::warn;

/// CPU-backed intersection device: one OS thread services the buffer
/// queue against the in-process accelerator. Also serves as the
/// synchronous backend for the CPU engines.
pub struct NativeThreadDevice {
    scene: Arc<Scene>,
    todo: Arc<TodoQueue>,
    done: Arc<DoneQueue>,
    stats: Arc<DeviceStats>,
    buffer_capacity: usize,
    worker: Option<JoinHandle<()>>,
}

impl NativeThreadDevice {
    pub fn new(scene: Arc<Scene>, done: Arc<DoneQueue>) -> Self {
        Self::with_options(scene, done, RAY_BUFFER_SIZE, None)
    }

    /// `artificial_delay` slows each buffer down; only used to exercise
    /// the aggregators under skewed device speeds.
    pub fn with_options(
        scene: Arc<Scene>,
        done: Arc<DoneQueue>,
        buffer_capacity: usize,
        artificial_delay: Option<Duration>,
    ) -> Self {
        let todo = Arc::new(TodoQueue::new());
        let stats = Arc::new(DeviceStats::new());

        let worker = {
            let todo = todo.clone();
            let done = done.clone();
            let scene = scene.clone();
            let stats = stats.clone();
            std::thread::spawn(move || {
                Self::worker_loop(&scene, &todo, &done, &stats, artificial_delay);
            })
        };

        Self {
            scene,
            todo,
            done,
            stats,
            buffer_capacity,
            worker: Some(worker),
        }
    }

    /// Services up to 3 buffers per wakeup so a burst of producers keeps
    /// the device busy without unbounded batching.
    fn worker_loop(
        scene: &Scene,
        todo: &TodoQueue,
        done: &DoneQueue,
        stats: &DeviceStats,
        artificial_delay: Option<Duration>,
    ) {
        'outer: loop {
            let first = match todo.pop() {
                Some(buf) => buf,
                None => break 'outer,
            };
            let mut batch = vec![first];
            while batch.len() < 3 {
                match todo.try_pop() {
                    Some(buf) => batch.push(buf),
                    None => break,
                }
            }

            for mut buffer in batch {
                let begin = Instant::now();
                Self::intersect_buffer(scene, &mut buffer);
                if let Some(delay) = artificial_delay {
                    std::thread::sleep(delay);
                }
                stats.record(buffer.len() as u64, begin.elapsed());
                done.push_done(buffer);
            }
        }
    }

    fn intersect_buffer(scene: &Scene, buffer: &mut RayBuffer) {
        buffer.hits.clear();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            buffer
                .rays
                .iter()
                .map(|ray| scene.trace_ray(ray))
                .collect::<Vec<RayHit>>()
        }));
        match result {
            Ok(hits) => buffer.hits = hits,
            Err(_) => {
                // transient device failure: complete the buffer all-miss
                // and keep rendering
                warn!(
                    rays = buffer.len(),
                    "intersection failure, marking buffer as all-miss"
                );
                buffer.hits = vec![RayHit::MISS; buffer.len()];
            }
        }
    }

    pub fn interrupt(&self) {
        self.todo.close();
    }
}

impl IntersectionDevice for NativeThreadDevice {
    fn new_ray_buffer(&self, producer_id: usize) -> RayBuffer {
        RayBuffer::new(self.buffer_capacity, producer_id)
    }

    fn push_ray_buffer(&self, mut buffer: RayBuffer) {
        self.done.assign_sequence(&mut buffer);
        self.todo.push(buffer);
    }

    fn pop_ray_buffer(&self, producer_id: usize) -> RayBuffer {
        self.done.pop_done(producer_id)
    }

    fn trace_sync(&self, rays: &[Ray], hits: &mut Vec<RayHit>) {
        let begin = Instant::now();
        hits.clear();
        hits.extend(rays.iter().map(|ray| self.scene.trace_ray(ray)));
        self.stats.record(rays.len() as u64, begin.elapsed());
    }

    fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    fn pending_buffers(&self) -> usize {
        self.todo.len()
    }
}

impl Drop for NativeThreadDevice {
    fn drop(&mut self) {
        self.todo.close();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::material::{Material, MaterialBase, Materials, MatteMaterial};
    use crate::scene::mesh::TriangleMesh;
    use crate::scene::Scene;
    use crate::texture::{Texture, Textures};
    use crate::volume::Volumes;
    use crate::{Point3f, Spectrum, Vec3f};

    fn test_scene() -> Arc<Scene> {
        let mut texs = Textures::new();
        let kd = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.5)));
        let emit = texs.add(Texture::ConstSpectrum(Spectrum::WHITE));
        let mut mats = Materials::new();
        let mut base = MaterialBase::default();
        base.emission = Some(emit);
        let m = mats.add(Material::Matte(MatteMaterial::new(base, kd)));
        let mesh = TriangleMesh::quad(
            point3f!(-1, -1, 0),
            point3f!(1, -1, 0),
            point3f!(1, 1, 0),
            point3f!(-1, 1, 0),
            m,
        );
        let camera = PerspectiveCamera::default_for_film(8, 8);
        Arc::new(Scene::build(camera, vec![mesh], texs, mats, Volumes::new(), vec![]).unwrap())
    }

    #[test]
    fn test_push_pop_completes_buffer() {
        let scene = test_scene();
        let done = Arc::new(DoneQueue::new());
        let device = NativeThreadDevice::with_options(scene, done, 64, None);

        let mut buffer = device.new_ray_buffer(0);
        buffer.add_ray(Ray::new(
            Point3f::new(0.0, 0.0, -3.0),
            Vec3f::new(0.0, 0.0, 1.0),
        ));
        buffer.add_ray(Ray::new(
            Point3f::new(5.0, 5.0, -3.0),
            Vec3f::new(0.0, 0.0, 1.0),
        ));
        device.push_ray_buffer(buffer);

        let result = device.pop_ray_buffer(0);
        assert_eq!(result.hits.len(), 2);
        assert!(!result.hits[0].is_miss());
        assert!(result.hits[1].is_miss());
        assert_eq!(device.stats().total_rays(), 2);
    }

    #[test]
    fn test_multiple_buffers_fifo() {
        let scene = test_scene();
        let done = Arc::new(DoneQueue::new());
        let device = NativeThreadDevice::with_options(scene, done, 16, None);

        for _ in 0..5 {
            let mut buffer = device.new_ray_buffer(3);
            buffer.add_ray(Ray::new(
                Point3f::new(0.0, 0.0, -3.0),
                Vec3f::new(0.0, 0.0, 1.0),
            ));
            device.push_ray_buffer(buffer);
        }
        for i in 0..5 {
            let buf = device.pop_ray_buffer(3);
            assert_eq!(buf.sequence, i);
        }
    }
}
