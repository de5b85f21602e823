use crate::film::Film;
use crate::sampler::{splat_checked, SampleResult, Sampler};
use crate::Float;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Image-plane mean-intensity estimator shared by every Metropolis worker
/// in the process. Sharing it makes the estimate converge with the total
/// number of large mutations, not per-thread counts.
#[derive(Debug, Default)]
pub struct MetropolisSharedState {
    /// f64 bits, updated with a compare-exchange add.
    total_luminance: AtomicU64,
    sample_count: AtomicU64,
}

impl MetropolisSharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_luminance(&self, luminance: f64) {
        let mut current = self.total_luminance.load(Ordering::Relaxed);
        loop {
            let new = f64::from_bits(current) + luminance;
            match self.total_luminance.compare_exchange_weak(
                current,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(v) => current = v,
            }
        }
        self.sample_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count.load(Ordering::Relaxed)
    }

    pub fn mean_intensity(&self) -> f64 {
        let count = self.sample_count();
        if count == 0 {
            return 1.0;
        }
        let total = f64::from_bits(self.total_luminance.load(Ordering::Relaxed));
        if total > 0.0 {
            total / count as f64
        } else {
            1.0
        }
    }
}

/// Kelemen-style small mutation.
fn mutate(x: Float, random_value: Float) -> Float {
    const S1: Float = 1.0 / 512.0;
    const S2: Float = 1.0 / 16.0;
    let dx = S1 / (S1 / S2 + (2.0 * random_value - 1.0).abs()) - S1 / S2;
    if random_value < 0.5 {
        let m = x + dx;
        if m < 1.0 { m } else { m - 1.0 }
    } else {
        let m = x - dx;
        if m < 0.0 { m + 1.0 } else { m }
    }
}

/// Screen-space mutation for the image X/Y dimensions, scaled to
/// `range` in pixels over the unit image extent.
fn mutate_scaled(x: Float, range: Float, random_value: Float) -> Float {
    const S1: Float = 32.0;
    let dx = range / (S1 / (1.0 + S1) + (S1 * S1) / (1.0 + S1) * (2.0 * random_value - 1.0).abs())
        - range / S1;
    if random_value < 0.5 {
        let m = x + dx;
        if m < 1.0 { m } else { m - 1.0 }
    } else {
        let m = x - dx;
        if m < 0.0 { m + 1.0 } else { m }
    }
}

/// Kelemen-style Metropolis sampler over the unit hypercube of sample
/// values, with lazily applied mutation chains and a process-wide
/// luminance estimator.
pub struct MetropolisSampler {
    film: Arc<Film>,
    rng: Xoshiro256Plus,
    shared: Arc<MetropolisSharedState>,

    max_rejects: u32,
    large_mutation_probability: Float,
    image_mutation_range: Float,

    sample_size: usize,
    samples: Vec<Float>,
    sample_stamps: Vec<u32>,
    stamp: u32,

    weight: Float,
    consec_rejects: u32,

    current_stamp: u32,
    current_luminance: f64,
    current_samples: Vec<Float>,
    current_sample_stamps: Vec<u32>,
    current_results: Vec<SampleResult>,

    is_large_mutation: bool,
    cooldown: bool,
}

impl MetropolisSampler {
    pub fn new(
        film: Arc<Film>,
        seed: u64,
        max_rejects: u32,
        large_mutation_probability: Float,
        image_mutation_range: Float,
        shared: Arc<MetropolisSharedState>,
    ) -> Self {
        Self {
            film,
            rng: Xoshiro256Plus::seed_from_u64(seed),
            shared,
            max_rejects,
            large_mutation_probability,
            image_mutation_range,
            sample_size: 0,
            samples: Vec::new(),
            sample_stamps: Vec::new(),
            stamp: 1,
            weight: 0.0,
            consec_rejects: 0,
            current_stamp: 1,
            current_luminance: 0.0,
            current_samples: Vec::new(),
            current_sample_stamps: Vec::new(),
            current_results: Vec::new(),
            is_large_mutation: true,
            cooldown: true,
        }
    }

    fn pixel_count(&self) -> u64 {
        (self.film.width() * self.film.height()) as u64
    }

    fn large_mutation(&mut self) {
        for (value, stamp) in self.samples.iter_mut().zip(self.sample_stamps.iter_mut()) {
            *value = self.rng.gen();
            *stamp = self.stamp;
        }
    }
}

impl Sampler for MetropolisSampler {
    fn request_samples(&mut self, size: usize) {
        self.sample_size = size;
        self.samples = (0..size).map(|_| self.rng.gen()).collect();
        self.sample_stamps = vec![0; size];
        self.current_samples = self.samples.clone();
        self.current_sample_stamps = vec![0; size];
    }

    fn get_sample(&mut self, index: usize) -> Float {
        debug_assert!(index < self.sample_size);
        let mut value = self.samples[index];
        let mut stamp_diff = self.stamp - self.sample_stamps[index];
        while stamp_diff > 0 {
            let u = self.rng.gen();
            value = if index <= 1 {
                mutate_scaled(value, self.image_mutation_range, u)
            } else {
                mutate(value, u)
            };
            stamp_diff -= 1;
        }
        self.samples[index] = value;
        self.sample_stamps[index] = self.stamp;
        value
    }

    fn next_sample(&mut self, results: &[SampleResult]) {
        let new_luminance: f64 = results
            .iter()
            .filter(|sr| sr.radiance.is_finite())
            .map(|sr| sr.radiance.y() as f64)
            .sum();

        if self.is_large_mutation {
            self.shared.add_luminance(new_luminance);
        }
        let mean_intensity = self.shared.mean_intensity() as Float;

        let accept_prob = if self.current_luminance > 0.0 && self.consec_rejects < self.max_rejects
        {
            (new_luminance / self.current_luminance).min(1.0) as Float
        } else {
            1.0
        };
        let new_weight = accept_prob + if self.is_large_mutation { 1.0 } else { 0.0 };
        self.weight += 1.0 - accept_prob;

        // during cooldown the estimator is too unstable to normalize with
        let p_large = if self.cooldown { 0.5 } else { self.large_mutation_probability };

        self.film.add_sample_count(1.0);

        if accept_prob >= 1.0 || self.rng.gen::<Float>() < accept_prob {
            // splat the accumulated weight of the sample being replaced
            if self.current_luminance > 0.0 {
                let norm = self.weight / (self.current_luminance as Float / mean_intensity + p_large);
                if norm > 0.0 {
                    let current = std::mem::take(&mut self.current_results);
                    splat_checked(&self.film, &current, norm);
                }
            }

            self.weight = new_weight;
            self.current_stamp = self.stamp;
            self.current_luminance = new_luminance;
            self.current_samples.copy_from_slice(&self.samples);
            self.current_sample_stamps.copy_from_slice(&self.sample_stamps);
            self.current_results = results.to_vec();
            self.consec_rejects = 0;
        } else {
            // splat the rejected proposal once, then restore the current
            // state
            if new_luminance > 0.0 {
                let norm = new_weight / (new_luminance as Float / mean_intensity + p_large);
                if norm > 0.0 {
                    splat_checked(&self.film, results, norm);
                }
            }

            self.stamp = self.current_stamp;
            self.samples.copy_from_slice(&self.current_samples);
            self.sample_stamps.copy_from_slice(&self.current_sample_stamps);
            self.consec_rejects += 1;
        }

        if self.cooldown && self.shared.sample_count() > self.pixel_count() {
            self.cooldown = false;
        }

        self.is_large_mutation = self.rng.gen::<Float>() < p_large;
        self.stamp += 1;
        if self.is_large_mutation {
            self.large_mutation();
        }
    }

    fn film(&self) -> &Arc<Film> {
        &self.film
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::film::Filter;
    use crate::sampler::{add_sample_result, FilmBufferType};
    use crate::Spectrum;

    #[test]
    fn test_mutate_stays_in_unit_interval() {
        let mut x = 0.3;
        for i in 0..1000 {
            let u = (i as Float * 0.618_034) % 1.0;
            x = mutate(x, u);
            assert!((0.0..1.0).contains(&x), "x = {}", x);
        }
    }

    #[test]
    fn test_mutate_scaled_small_steps() {
        // small image range keeps the mutation local most of the time
        let x = 0.5;
        let m = mutate_scaled(x, 0.01, 0.3);
        assert!((m - x).abs() < 0.05);
    }

    #[test]
    fn test_shared_state_mean() {
        let shared = MetropolisSharedState::new();
        shared.add_luminance(2.0);
        shared.add_luminance(4.0);
        approx::assert_abs_diff_eq!(shared.mean_intensity(), 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_constant_scene_unbiased() {
        // on a constant-luminance image every proposal is accepted and the
        // film receives total weight equal to the sample count
        let film = Arc::new(Film::new(2, 2, Filter::default_box()));
        let shared = Arc::new(MetropolisSharedState::new());
        let mut sampler =
            MetropolisSampler::new(film.clone(), 3, 128, 0.4, 0.1, shared);
        sampler.request_samples(8);

        let n = 2000;
        for _ in 0..n {
            let x = sampler.get_sample(0);
            let y = sampler.get_sample(1);
            let mut results = Vec::new();
            add_sample_result(
                &mut results,
                FilmBufferType::PerPixelNormalized,
                x * 2.0,
                y * 2.0,
                Spectrum::WHITE,
                1.0,
            );
            sampler.next_sample(&results);
        }

        let total: Float = (0..2)
            .flat_map(|y| {
                let film = film.clone();
                (0..2).map(move |x| film.pixel_rgb(x, y)[1])
            })
            .sum();
        // mean pixel value should be near 1 for a constant white image
        approx::assert_relative_eq!(total / 4.0, 1.0, max_relative = 0.35);
    }
}
