use crate::film::Film;
use crate::sampler::{splat_checked, SampleResult, Sampler};
use crate::Float;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::sync::Arc;

const MAX_SOBOL_DIMENSIONS: usize = 17;

/// Primitive-polynomial parameters (degree, coefficient, initial
/// direction numbers) for the first Sobol' dimensions after the van der
/// Corput sequence.
const POLYS: [(u32, u32, &[u32]); MAX_SOBOL_DIMENSIONS - 1] = [
    (1, 0, &[1]),
    (2, 1, &[1, 3]),
    (3, 1, &[1, 3, 1]),
    (3, 2, &[1, 1, 1]),
    (4, 1, &[1, 1, 3, 3]),
    (4, 4, &[1, 3, 5, 13]),
    (5, 2, &[1, 1, 5, 5, 17]),
    (5, 4, &[1, 1, 5, 5, 5]),
    (5, 7, &[1, 1, 7, 11, 19]),
    (5, 11, &[1, 1, 5, 1, 1]),
    (5, 13, &[1, 1, 1, 3, 11]),
    (5, 14, &[1, 3, 5, 5, 31]),
    (6, 1, &[1, 3, 3, 9, 7, 49]),
    (6, 13, &[1, 1, 1, 15, 21, 21]),
    (6, 16, &[1, 3, 1, 13, 27, 49]),
    (6, 19, &[1, 1, 1, 15, 7, 5]),
];

/// Direction numbers for one dimension, 32 bits each.
fn direction_numbers(dim: usize) -> [u32; 32] {
    let mut v = [0u32; 32];
    if dim == 0 {
        // van der Corput
        for (i, entry) in v.iter_mut().enumerate() {
            *entry = 1 << (31 - i);
        }
        return v;
    }

    let (s, a, m_init) = POLYS[(dim - 1) % POLYS.len()];
    let s = s as usize;
    for i in 0..s.min(32) {
        v[i] = m_init[i] << (31 - i);
    }
    for i in s..32 {
        let mut value = v[i - s] ^ (v[i - s] >> s);
        for k in 1..s {
            if (a >> (s - 1 - k)) & 1 == 1 {
                value ^= v[i - k];
            }
        }
        v[i] = value;
    }
    v
}

fn sobol_value(index: u64, dim: usize, scramble: u32) -> Float {
    let v = direction_numbers(dim);
    let mut result = scramble;
    let mut i = index;
    let mut bit = 0;
    while i != 0 {
        if i & 1 == 1 {
            result ^= v[bit & 31];
        }
        i >>= 1;
        bit += 1;
    }
    ((result as Float) * (1.0 / 4_294_967_296.0)).min(0.999_999_94)
}

/// Scrambled Sobol' sequence sampler: low-discrepancy in the first
/// dimensions, falling back to uniform randoms past the table.
pub struct SobolSampler {
    film: Arc<Film>,
    rng: Xoshiro256Plus,
    scrambles: Vec<u32>,
    sample_index: u64,
}

impl SobolSampler {
    pub fn new(film: Arc<Film>, seed: u64) -> Self {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let scrambles = (0..MAX_SOBOL_DIMENSIONS).map(|_| rng.gen()).collect();
        Self {
            film,
            rng,
            scrambles,
            sample_index: 0,
        }
    }
}

impl Sampler for SobolSampler {
    fn request_samples(&mut self, _size: usize) {}

    fn get_sample(&mut self, index: usize) -> Float {
        if index < MAX_SOBOL_DIMENSIONS {
            sobol_value(self.sample_index, index, self.scrambles[index])
        } else {
            self.rng.gen()
        }
    }

    fn next_sample(&mut self, results: &[SampleResult]) {
        self.film.add_sample_count(1.0);
        splat_checked(&self.film, results, 1.0);
        self.sample_index += 1;
    }

    fn film(&self) -> &Arc<Film> {
        &self.film
    }
}
