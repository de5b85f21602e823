use crate::film::Film;
use crate::sampler::{
    MetropolisSampler, MetropolisSharedState, RandomSampler, Sampler, SobolSampler,
};
use crate::scene::Scene;
use crate::{Float, Spectrum};
use bitflags::bitflags;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub mod bidir;
pub mod bidir_hybrid;
pub mod light;
pub mod path;

bitflags! {
    /// Minimum work to redo after a scene edit.
    pub struct EditAction: u32 {
        const CAMERA_EDIT         = 1 << 0;
        const GEOMETRY_EDIT       = 1 << 1;
        const INSTANCE_TRANS_EDIT = 1 << 2;
        const MATERIALS_EDIT      = 1 << 3;
        const MATERIAL_TYPES_EDIT = 1 << 4;
        const AREALIGHTS_EDIT     = 1 << 5;
        const INFINITELIGHT_EDIT  = 1 << 6;
        const SUNLIGHT_EDIT       = 1 << 7;
        const SKYLIGHT_EDIT       = 1 << 8;
        const IMAGEMAPS_EDIT      = 1 << 9;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    PathCpu,
    LightCpu,
    BiDirCpu,
    BiDirHybrid,
}

impl EngineType {
    pub fn from_name(name: &str) -> Option<Self> {
        // hardware engine names resolve to the equivalent CPU topology
        match name {
            "PATHCPU" | "PATHOCL" | "RTPATHOCL" | "PATHHYBRID" | "BIASPATHCPU" | "BIASPATHOCL"
            | "RTBIASPATHOCL" => Some(EngineType::PathCpu),
            "LIGHTCPU" => Some(EngineType::LightCpu),
            "BIDIRCPU" | "BIDIRVMCPU" => Some(EngineType::BiDirCpu),
            "BIDIRHYBRID" | "CBIDIRHYBRID" => Some(EngineType::BiDirHybrid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerType {
    Random,
    Sobol,
    Metropolis,
}

impl SamplerType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RANDOM" | "INLINED_RANDOM" => Some(SamplerType::Random),
            "SOBOL" => Some(SamplerType::Sobol),
            "METROPOLIS" => Some(SamplerType::Metropolis),
            _ => None,
        }
    }
}

/// Everything a render worker needs to know, copied per thread.
#[derive(Debug, Clone, Copy)]
pub struct RenderParams {
    pub engine_type: EngineType,
    pub sampler_type: SamplerType,
    pub max_path_depth: u32,
    pub max_eye_depth: u32,
    pub max_light_depth: u32,
    pub rr_depth: u32,
    pub rr_cap: Float,
    pub seed: u64,
    pub worker_count: usize,
    pub large_step_rate: Float,
    pub max_consecutive_reject: u32,
    pub image_mutation_rate: Float,
    /// States batched per ray buffer in the hybrid engine.
    pub hybrid_state_count: usize,
    pub halt_time: Option<Duration>,
    pub halt_spp: Option<Float>,
    pub halt_threshold: Option<Float>,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            engine_type: EngineType::PathCpu,
            sampler_type: SamplerType::Random,
            max_path_depth: 6,
            max_eye_depth: 6,
            max_light_depth: 6,
            rr_depth: 3,
            rr_cap: 0.125,
            seed: 1,
            worker_count: num_workers_default(),
            large_step_rate: 0.4,
            max_consecutive_reject: 512,
            image_mutation_rate: 0.1,
            hybrid_state_count: 64,
            halt_time: None,
            halt_spp: None,
            halt_threshold: None,
        }
    }
}

fn num_workers_default() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Live counters exposed through the read-only statistics view.
#[derive(Default)]
pub struct EngineCounters {
    pub total_samples: AtomicU64,
    pub total_rays: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
pub struct EngineStatistics {
    pub elapsed: Duration,
    pub total_samples: u64,
    pub total_rays: u64,
    pub samples_per_second: f64,
    pub rays_per_second: f64,
    pub samples_per_pixel: Float,
    pub convergence: Float,
}

/// Per-worker context handed to the engine-specific render loops.
pub struct WorkerContext {
    pub scene: Arc<Scene>,
    pub film: Arc<Film>,
    pub params: RenderParams,
    pub thread_index: usize,
    pub interrupt: Arc<AtomicBool>,
    pub counters: Arc<EngineCounters>,
    pub metropolis_shared: Arc<MetropolisSharedState>,
}

impl WorkerContext {
    pub fn should_stop(&self) -> bool {
        self.interrupt.load(Ordering::Relaxed)
    }

    pub fn make_sampler(&self) -> Box<dyn Sampler> {
        let seed = self.params.seed + self.thread_index as u64;
        match self.params.sampler_type {
            SamplerType::Random => Box::new(RandomSampler::new(self.film.clone(), seed)),
            SamplerType::Sobol => Box::new(SobolSampler::new(self.film.clone(), seed)),
            SamplerType::Metropolis => Box::new(MetropolisSampler::new(
                self.film.clone(),
                seed,
                self.params.max_consecutive_reject,
                self.params.large_step_rate,
                self.params.image_mutation_rate,
                self.metropolis_shared.clone(),
            )),
        }
    }
}

/// Applies Russian roulette to a pre-weighted BSDF sample result past
/// `rr_depth`; returns the adjusted (throughput multiplier, pdf) or None
/// on termination.
pub fn russian_roulette(
    params: &RenderParams,
    depth: u32,
    f_over_pdf: Spectrum,
    pdf_w: Float,
    u: Float,
) -> Option<(Spectrum, Float)> {
    if depth >= params.rr_depth {
        let prob = f_over_pdf.filter().max(params.rr_cap).min(1.0);
        if u < prob {
            Some((f_over_pdf / prob, pdf_w * prob))
        } else {
            None
        }
    } else {
        Some((f_over_pdf, pdf_w))
    }
}

/// The render engine: owns the worker threads, the lifecycle, and the
/// scene-edit protocol. The scene is immutable while workers run; edits
/// happen between `begin_scene_edit` and `end_scene_edit`.
pub struct RenderEngine {
    scene: Arc<Scene>,
    film: Arc<Film>,
    params: RenderParams,
    counters: Arc<EngineCounters>,
    metropolis_shared: Arc<MetropolisSharedState>,
    interrupt: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    start_time: Instant,
    in_scene_edit: bool,
    running: bool,
}

impl RenderEngine {
    pub fn new(scene: Scene, film: Arc<Film>, params: RenderParams) -> Self {
        Self {
            scene: Arc::new(scene),
            film,
            params,
            counters: Arc::new(EngineCounters::default()),
            metropolis_shared: Arc::new(MetropolisSharedState::new()),
            interrupt: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            start_time: Instant::now(),
            in_scene_edit: false,
            running: false,
        }
    }

    pub fn film(&self) -> &Arc<Film> {
        &self.film
    }

    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    pub fn params(&self) -> &RenderParams {
        &self.params
    }

    pub fn start(&mut self) {
        if self.running {
            return;
        }
        info!(
            engine = ?self.params.engine_type,
            workers = self.params.worker_count,
            "starting render engine"
        );
        self.interrupt.store(false, Ordering::SeqCst);
        self.start_time = Instant::now();

        for thread_index in 0..self.params.worker_count {
            let ctx = WorkerContext {
                scene: self.scene.clone(),
                film: self.film.clone(),
                params: self.params,
                thread_index,
                interrupt: self.interrupt.clone(),
                counters: self.counters.clone(),
                metropolis_shared: self.metropolis_shared.clone(),
            };
            let engine_type = self.params.engine_type;
            self.workers.push(std::thread::spawn(move || match engine_type {
                EngineType::PathCpu => path::render_worker(ctx),
                EngineType::LightCpu => light::render_worker(ctx),
                EngineType::BiDirCpu => bidir::render_worker(ctx),
                EngineType::BiDirHybrid => bidir_hybrid::render_worker(ctx),
            }));
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.interrupt.store(true, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        self.running = false;
        info!("render engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Stops the workers and hands out mutable access to the scene. Must
    /// be paired with `end_scene_edit`; the exclusive receiver serializes
    /// concurrent edit attempts at compile time.
    pub fn begin_scene_edit(&mut self) -> &mut Scene {
        self.stop();
        self.in_scene_edit = true;
        Arc::get_mut(&mut self.scene).expect("scene still referenced by a stopped worker")
    }

    /// Applies the minimum rebuild for the edit, clears the film, and
    /// restarts the workers. On a rejected edit the engine stays stopped
    /// with the pre-edit tables in force.
    pub fn end_scene_edit(&mut self, actions: EditAction) -> anyhow::Result<()> {
        debug!(?actions, "applying scene edit");
        assert!(self.in_scene_edit, "end_scene_edit without begin_scene_edit");
        self.in_scene_edit = false;

        Arc::get_mut(&mut self.scene)
            .expect("scene still referenced during edit")
            .apply_edit_actions(actions)?;
        self.film.reset();
        self.counters.total_samples.store(0, Ordering::SeqCst);
        self.counters.total_rays.store(0, Ordering::SeqCst);
        self.start();
        Ok(())
    }

    pub fn statistics(&self) -> EngineStatistics {
        let elapsed = self.start_time.elapsed();
        let total_samples = self.counters.total_samples.load(Ordering::Relaxed);
        let total_rays = self.counters.total_rays.load(Ordering::Relaxed);
        let secs = elapsed.as_secs_f64().max(1e-9);
        let pixel_count = (self.film.width() * self.film.height()) as Float;
        EngineStatistics {
            elapsed,
            total_samples,
            total_rays,
            samples_per_second: total_samples as f64 / secs,
            rays_per_second: total_rays as f64 / secs,
            samples_per_pixel: self.film.sample_count() as Float / pixel_count,
            convergence: 0.0,
        }
    }

    /// Blocks until a halt condition triggers, polling statistics at the
    /// given interval. Returns the final statistics.
    pub fn wait_for_halt(&mut self, poll: Duration) -> EngineStatistics {
        loop {
            std::thread::sleep(poll);
            let mut stats = self.statistics();

            if let Some(threshold) = self.params.halt_threshold {
                stats.convergence = self.film.convergence(threshold);
                if stats.convergence >= 1.0 {
                    self.stop();
                    return stats;
                }
            }
            if let Some(halt_time) = self.params.halt_time {
                if stats.elapsed >= halt_time {
                    self.stop();
                    return stats;
                }
            }
            if let Some(halt_spp) = self.params.halt_spp {
                if stats.samples_per_pixel >= halt_spp {
                    self.stop();
                    return stats;
                }
            }
        }
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_type_names() {
        assert_eq!(EngineType::from_name("PATHCPU"), Some(EngineType::PathCpu));
        assert_eq!(EngineType::from_name("PATHOCL"), Some(EngineType::PathCpu));
        assert_eq!(EngineType::from_name("BIDIRCPU"), Some(EngineType::BiDirCpu));
        assert_eq!(
            EngineType::from_name("CBIDIRHYBRID"),
            Some(EngineType::BiDirHybrid)
        );
        assert_eq!(EngineType::from_name("WHATEVER"), None);
    }

    #[test]
    fn test_edit_action_flags() {
        let mut actions = EditAction::empty();
        actions |= EditAction::CAMERA_EDIT;
        actions |= EditAction::GEOMETRY_EDIT;
        assert!(actions.contains(EditAction::CAMERA_EDIT));
        assert!(!actions.contains(EditAction::MATERIALS_EDIT));
    }

    #[test]
    fn test_russian_roulette_termination() {
        let params = RenderParams::default();
        // bright sample survives with u below its filter value
        let bright = Spectrum::uniform(0.9);
        assert!(russian_roulette(&params, 5, bright, 1.0, 0.5).is_some());
        // dark sample dies with u above the cap
        let dark = Spectrum::uniform(0.01);
        assert!(russian_roulette(&params, 5, dark, 1.0, 0.9).is_none());
        // below rr depth nothing happens
        assert!(russian_roulette(&params, 1, dark, 1.0, 0.9).is_some());
    }
}
