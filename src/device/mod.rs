use crate::geometry::Ray;
use crate::scene::{RayTracer, Scene};
use crate::RayHit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

pub mod native;
pub mod raybuffer;
pub mod virtual_device;

pub use native::NativeThreadDevice;
pub use raybuffer::{DoneQueue, RayBuffer, TodoQueue, RAY_BUFFER_SIZE};
pub use virtual_device::{VirtualM2MDevice, VirtualM2ODevice};

/// Throughput and utilization counters every device exposes; the
/// work-stealing aggregator schedules by them.
#[derive(Debug)]
pub struct DeviceStats {
    start: Instant,
    total_rays: AtomicU64,
    busy_nanos: AtomicU64,
}

impl Default for DeviceStats {
    fn default() -> Self {
        Self {
            start: Instant::now(),
            total_rays: AtomicU64::new(0),
            busy_nanos: AtomicU64::new(0),
        }
    }
}

impl DeviceStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, rays: u64, busy: std::time::Duration) {
        self.total_rays.fetch_add(rays, Ordering::Relaxed);
        self.busy_nanos
            .fetch_add(busy.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn total_rays(&self) -> u64 {
        self.total_rays.load(Ordering::Relaxed)
    }

    pub fn rays_per_second(&self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.total_rays() as f64 / elapsed
    }

    /// Fraction of wall time spent tracing.
    pub fn load(&self) -> f64 {
        let elapsed = self.start.elapsed().as_nanos() as f64;
        if elapsed <= 0.0 {
            return 0.0;
        }
        (self.busy_nanos.load(Ordering::Relaxed) as f64 / elapsed).min(1.0)
    }

    pub fn idle_fraction(&self) -> f64 {
        1.0 - self.load()
    }
}

/// The dispatch contract: a synchronous form for CPU workers and the
/// buffer-queue form for batched/hardware-style backends. A pushed buffer
/// always comes back exactly once from `pop_ray_buffer`, completed.
pub trait IntersectionDevice: Send + Sync {
    fn new_ray_buffer(&self, producer_id: usize) -> RayBuffer;

    fn push_ray_buffer(&self, buffer: RayBuffer);

    /// Blocks until the producer's next buffer (in push order) completes.
    fn pop_ray_buffer(&self, producer_id: usize) -> RayBuffer;

    fn trace_sync(&self, rays: &[Ray], hits: &mut Vec<RayHit>);

    fn stats(&self) -> &DeviceStats;

    fn pending_buffers(&self) -> usize;
}

/// Scene-backed tracer that counts rays into an engine-wide counter; the
/// sync path the CPU engines use.
pub struct CountingTracer {
    pub scene: Arc<Scene>,
    pub counter: Arc<AtomicU64>,
}

impl CountingTracer {
    pub fn new(scene: Arc<Scene>, counter: Arc<AtomicU64>) -> Self {
        Self { scene, counter }
    }
}

impl RayTracer for CountingTracer {
    fn trace_ray(&self, ray: &Ray) -> RayHit {
        self.counter.fetch_add(1, Ordering::Relaxed);
        self.scene.trace_ray(ray)
    }
}
