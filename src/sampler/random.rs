use crate::film::Film;
use crate::sampler::{splat_checked, SampleResult, Sampler};
use crate::Float;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::sync::Arc;

/// Uniform independent sampler.
pub struct RandomSampler {
    rng: Xoshiro256Plus,
    film: Arc<Film>,
}

impl RandomSampler {
    pub fn new(film: Arc<Film>, seed: u64) -> Self {
        Self {
            rng: Xoshiro256Plus::seed_from_u64(seed),
            film,
        }
    }
}

impl Sampler for RandomSampler {
    fn request_samples(&mut self, _size: usize) {}

    fn get_sample(&mut self, _index: usize) -> Float {
        self.rng.gen()
    }

    fn next_sample(&mut self, results: &[SampleResult]) {
        self.film.add_sample_count(1.0);
        splat_checked(&self.film, results, 1.0);
    }

    fn film(&self) -> &Arc<Film> {
        &self.film
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::film::{Film, Filter};

    #[test]
    fn test_samples_in_unit_interval() {
        let film = Arc::new(Film::new(4, 4, Filter::default_box()));
        let mut sampler = RandomSampler::new(film, 7);
        for i in 0..256 {
            let v = sampler.get_sample(i);
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_deterministic_given_seed() {
        let film = Arc::new(Film::new(4, 4, Filter::default_box()));
        let mut a = RandomSampler::new(film.clone(), 42);
        let mut b = RandomSampler::new(film, 42);
        for i in 0..32 {
            assert_eq!(a.get_sample(i), b.get_sample(i));
        }
    }
}
