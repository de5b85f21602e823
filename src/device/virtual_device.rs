use crate::device::raybuffer::{DoneQueue, RayBuffer};
use crate::device::{DeviceStats, IntersectionDevice, NativeThreadDevice};
use crate::geometry::Ray;
use crate::scene::Scene;
use crate::RayHit;
use std::sync::Arc;

/// Many-to-one aggregator: any number of producers share one underlying
/// device. Per-producer FIFO falls out of the sequence-ordered completion
/// router.
pub struct VirtualM2ODevice {
    device: NativeThreadDevice,
    done: Arc<DoneQueue>,
}

impl VirtualM2ODevice {
    pub fn new(scene: Arc<Scene>, buffer_capacity: usize) -> Self {
        let done = Arc::new(DoneQueue::new());
        let device = NativeThreadDevice::with_options(scene, done.clone(), buffer_capacity, None);
        Self { device, done }
    }

    pub fn interrupt(&self) {
        self.device.interrupt();
        self.done.drain();
    }
}

impl IntersectionDevice for VirtualM2ODevice {
    fn new_ray_buffer(&self, producer_id: usize) -> RayBuffer {
        self.device.new_ray_buffer(producer_id)
    }

    fn push_ray_buffer(&self, buffer: RayBuffer) {
        self.device.push_ray_buffer(buffer);
    }

    fn pop_ray_buffer(&self, producer_id: usize) -> RayBuffer {
        self.device.pop_ray_buffer(producer_id)
    }

    fn trace_sync(&self, rays: &[Ray], hits: &mut Vec<RayHit>) {
        self.device.trace_sync(rays, hits);
    }

    fn stats(&self) -> &DeviceStats {
        self.device.stats()
    }

    fn pending_buffers(&self) -> usize {
        self.device.pending_buffers()
    }
}

/// Many-to-many aggregator: buffers are routed to the underlying device
/// with the lowest expected completion time (pending work over measured
/// throughput), while the shared completion router still hands each
/// producer its buffers in push order.
pub struct VirtualM2MDevice {
    devices: Vec<NativeThreadDevice>,
    done: Arc<DoneQueue>,
    stats: DeviceStats,
}

impl VirtualM2MDevice {
    pub fn new(scene: Arc<Scene>, device_count: usize, buffer_capacity: usize) -> Self {
        let done = Arc::new(DoneQueue::new());
        let devices = (0..device_count)
            .map(|_| {
                NativeThreadDevice::with_options(scene.clone(), done.clone(), buffer_capacity, None)
            })
            .collect();
        Self { devices, done, stats: DeviceStats::new() }
    }

    /// Test/bench constructor with per-device artificial delays.
    pub fn with_delays(
        scene: Arc<Scene>,
        delays: &[Option<std::time::Duration>],
        buffer_capacity: usize,
    ) -> Self {
        let done = Arc::new(DoneQueue::new());
        let devices = delays
            .iter()
            .map(|delay| {
                NativeThreadDevice::with_options(
                    scene.clone(),
                    done.clone(),
                    buffer_capacity,
                    *delay,
                )
            })
            .collect();
        Self { devices, done, stats: DeviceStats::new() }
    }

    fn pick_device(&self) -> &NativeThreadDevice {
        // estimated time to drain: queued buffers over measured throughput;
        // an idle device with high throughput wins
        self.devices
            .iter()
            .min_by(|a, b| {
                let score = |d: &NativeThreadDevice| {
                    let rate = d.stats().rays_per_second().max(1.0);
                    (d.pending_buffers() as f64 + 1.0) / rate
                };
                score(a).partial_cmp(&score(b)).unwrap()
            })
            .expect("VirtualM2MDevice requires at least one device")
    }

    pub fn device_stats(&self) -> Vec<&DeviceStats> {
        self.devices.iter().map(|d| d.stats()).collect()
    }

    pub fn interrupt(&self) {
        for d in &self.devices {
            d.interrupt();
        }
        self.done.drain();
    }
}

impl IntersectionDevice for VirtualM2MDevice {
    fn new_ray_buffer(&self, producer_id: usize) -> RayBuffer {
        self.devices[0].new_ray_buffer(producer_id)
    }

    fn push_ray_buffer(&self, buffer: RayBuffer) {
        self.pick_device().push_ray_buffer(buffer);
    }

    fn pop_ray_buffer(&self, producer_id: usize) -> RayBuffer {
        self.done.pop_done(producer_id)
    }

    fn trace_sync(&self, rays: &[Ray], hits: &mut Vec<RayHit>) {
        self.devices[0].trace_sync(rays, hits);
    }

    fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    fn pending_buffers(&self) -> usize {
        self.devices.iter().map(|d| d.pending_buffers()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PerspectiveCamera;
    use crate::material::{Material, MaterialBase, Materials, MatteMaterial};
    use crate::scene::mesh::TriangleMesh;
    use crate::texture::{Texture, Textures};
    use crate::volume::Volumes;
    use crate::{Point3f, Spectrum, Vec3f};
    use std::time::Duration;

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
    fn test_m2m_preserves_push_order_with_skewed_devices() {
        let scene = test_scene();
        // one fast device, one slow device
        let device = VirtualM2MDevice::with_delays(
            scene,
            &[None, Some(Duration::from_millis(2))],
            16,
        );

        const N: u64 = 12;
        for _ in 0..N {
            let mut buf = device.new_ray_buffer(0);
            buf.add_ray(Ray::new(
                Point3f::new(0.0, 0.0, -3.0),
                Vec3f::new(0.0, 0.0, 1.0),
            ));
            device.push_ray_buffer(buf);
        }
        for i in 0..N {
            let buf = device.pop_ray_buffer(0);
            assert_eq!(buf.sequence, i, "buffers must pop in push order");
            assert_eq!(buf.hits.len(), 1);
        }
    }

    #[test]
    fn test_m2o_multiple_producers() {
        let scene = test_scene();
        let device = VirtualM2ODevice::new(scene, 16);

        for producer in 0..4usize {
            for _ in 0..3 {
                let mut buf = device.new_ray_buffer(producer);
                buf.add_ray(Ray::new(
                    Point3f::new(0.0, 0.0, -3.0),
                    Vec3f::new(0.0, 0.0, 1.0),
                ));
                device.push_ray_buffer(buf);
            }
        }
        for producer in 0..4usize {
            for i in 0..3 {
                let buf = device.pop_ray_buffer(producer);
                assert_eq!(buf.producer_id, producer);
                assert_eq!(buf.sequence, i);
            }
        }
    }
}
