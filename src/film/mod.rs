use crate::sampler::FilmBufferType;
use crate::{Float, Point2f, Spectrum};
use image::{ImageBuffer, Rgb};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};

pub mod filter;

pub use filter::Filter;

const FILTER_TABLE_WIDTH: usize = 16;

/// Per-pixel state of the pixel-normalized buffer.
#[derive(Debug, Clone, Copy, Default)]
struct PixelPP {
    rgb: [Float; 3],
    alpha: Float,
    weight: Float,
    depth: Float,
}

/// Accumulation state guarded by the film mutex. Kept in one struct so a
/// splat takes a single short lock.
#[derive(Debug, Default)]
struct FilmBuffers {
    per_pixel: Vec<PixelPP>,
    per_screen: Vec<[Float; 3]>,
    sample_count: f64,
    /// Snapshot of the developed frame taken by the last convergence test.
    convergence_reference: Vec<[Float; 3]>,
}

/// The image plane: filtered accumulation into the two normalization
/// buffers plus the statistics the engine reports.
pub struct Film {
    width: u32,
    height: u32,
    filter: Filter,
    filter_table: [[Float; FILTER_TABLE_WIDTH]; FILTER_TABLE_WIDTH],
    buffers: Mutex<FilmBuffers>,
    discarded_samples: AtomicU64,
}

impl Film {
    pub fn new(width: u32, height: u32, filter: Filter) -> Self {
        let mut filter_table = [[0.0; FILTER_TABLE_WIDTH]; FILTER_TABLE_WIDTH];
        let radius = filter.radius();
        for (y, row) in filter_table.iter_mut().enumerate() {
            for (x, val) in row.iter_mut().enumerate() {
                let p = Point2f::new(
                    (x as Float + 0.5) * radius / FILTER_TABLE_WIDTH as Float,
                    (y as Float + 0.5) * radius / FILTER_TABLE_WIDTH as Float,
                );
                *val = filter.evaluate(p);
            }
        }

        let pixel_count = (width * height) as usize;
        Self {
            width,
            height,
            filter,
            filter_table,
            buffers: Mutex::new(FilmBuffers {
                per_pixel: vec![Default::default(); pixel_count],
                per_screen: vec![[0.0; 3]; pixel_count],
                sample_count: 0.0,
                convergence_reference: Vec::new(),
            }),
            discarded_samples: AtomicU64::new(0),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn add_sample_count(&self, count: f64) {
        self.buffers.lock().sample_count += count;
    }

    pub fn sample_count(&self) -> f64 {
        self.buffers.lock().sample_count
    }

    pub fn count_discarded_sample(&self) {
        self.discarded_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn discarded_samples(&self) -> u64 {
        self.discarded_samples.load(Ordering::Relaxed)
    }

    /// Splats one radiance contribution through the reconstruction filter
    /// into the buffer the sample belongs to.
    pub fn splat_filtered(
        &self,
        buffer: FilmBufferType,
        film_x: Float,
        film_y: Float,
        radiance: Spectrum,
        alpha: Float,
        depth: Float,
    ) {
        if !radiance.is_finite() {
            self.count_discarded_sample();
            return;
        }

        let radius = self.filter.radius();
        let dx = film_x - 0.5;
        let dy = film_y - 0.5;
        let x0 = (dx - radius).ceil().max(0.0) as i64;
        let x1 = ((dx + radius).floor() as i64).min(self.width as i64 - 1);
        let y0 = (dy - radius).ceil().max(0.0) as i64;
        let y1 = ((dy + radius).floor() as i64).min(self.height as i64 - 1);
        if x1 < x0 || y1 < y0 {
            return;
        }

        // precompute LUT rows/columns once per splat
        let mut xi: SmallVec<[usize; 16]> = SmallVec::new();
        for x in x0..=x1 {
            let fx = ((x as Float - dx) / radius * FILTER_TABLE_WIDTH as Float).abs();
            xi.push((fx.floor() as usize).min(FILTER_TABLE_WIDTH - 1));
        }
        let mut yi: SmallVec<[usize; 16]> = SmallVec::new();
        for y in y0..=y1 {
            let fy = ((y as Float - dy) / radius * FILTER_TABLE_WIDTH as Float).abs();
            yi.push((fy.floor() as usize).min(FILTER_TABLE_WIDTH - 1));
        }

        let mut buffers = self.buffers.lock();
        for (iy, y) in (y0..=y1).enumerate() {
            for (ix, x) in (x0..=x1).enumerate() {
                let weight = self.filter_table[yi[iy]][xi[ix]];
                if weight == 0.0 {
                    continue;
                }
                let index = (y as u32 * self.width + x as u32) as usize;
                match buffer {
                    FilmBufferType::PerPixelNormalized => {
                        let pixel = &mut buffers.per_pixel[index];
                        pixel.rgb[0] += radiance.r() * weight;
                        pixel.rgb[1] += radiance.g() * weight;
                        pixel.rgb[2] += radiance.b() * weight;
                        pixel.alpha += alpha * weight;
                        pixel.weight += weight;
                        if depth < pixel.depth || pixel.depth == 0.0 {
                            pixel.depth = depth;
                        }
                    }
                    FilmBufferType::PerScreenNormalized => {
                        let pixel = &mut buffers.per_screen[index];
                        pixel[0] += radiance.r() * weight;
                        pixel[1] += radiance.g() * weight;
                        pixel[2] += radiance.b() * weight;
                    }
                }
            }
        }
    }

    /// Folds another film's accumulators into this one. Used to merge
    /// per-thread films at frame boundaries.
    pub fn merge(&self, other: &Film) {
        assert_eq!(self.width, other.width);
        assert_eq!(self.height, other.height);
        let other_buffers = other.buffers.lock();
        let mut buffers = self.buffers.lock();
        for (dst, src) in buffers.per_pixel.iter_mut().zip(other_buffers.per_pixel.iter()) {
            for i in 0..3 {
                dst.rgb[i] += src.rgb[i];
            }
            dst.alpha += src.alpha;
            dst.weight += src.weight;
            if src.depth > 0.0 && (dst.depth == 0.0 || src.depth < dst.depth) {
                dst.depth = src.depth;
            }
        }
        for (dst, src) in buffers.per_screen.iter_mut().zip(other_buffers.per_screen.iter()) {
            for i in 0..3 {
                dst[i] += src[i];
            }
        }
        buffers.sample_count += other_buffers.sample_count;
        self.discarded_samples
            .fetch_add(other.discarded_samples(), Ordering::Relaxed);
    }

    /// Clears every accumulator; used when a scene edit restarts the
    /// render from scratch.
    pub fn reset(&self) {
        let mut buffers = self.buffers.lock();
        for p in buffers.per_pixel.iter_mut() {
            *p = Default::default();
        }
        for p in buffers.per_screen.iter_mut() {
            *p = [0.0; 3];
        }
        buffers.sample_count = 0.0;
        buffers.convergence_reference.clear();
        self.discarded_samples.store(0, Ordering::Relaxed);
    }

    fn developed_pixel(buffers: &FilmBuffers, index: usize) -> [Float; 3] {
        let pp = &buffers.per_pixel[index];
        let mut rgb = [0.0; 3];
        if pp.weight > 0.0 {
            for i in 0..3 {
                rgb[i] = pp.rgb[i] / pp.weight;
            }
        }
        if buffers.sample_count > 0.0 {
            let inv = 1.0 / buffers.sample_count as Float;
            let ps = &buffers.per_screen[index];
            for i in 0..3 {
                rgb[i] += ps[i] * inv;
            }
        }
        rgb
    }

    /// The final pixel value: pixel-normalized plus screen-normalized
    /// contributions.
    pub fn pixel_rgb(&self, x: u32, y: u32) -> [Float; 3] {
        let buffers = self.buffers.lock();
        Self::developed_pixel(&buffers, (y * self.width + x) as usize)
    }

    pub fn pixel_alpha(&self, x: u32, y: u32) -> Float {
        let buffers = self.buffers.lock();
        let pp = &buffers.per_pixel[(y * self.width + x) as usize];
        if pp.weight > 0.0 { pp.alpha / pp.weight } else { 0.0 }
    }

    /// Counts pixels still changing by more than `threshold` since the
    /// previous test, and snapshots the frame for the next call.
    pub fn run_convergence_test(&self, threshold: Float) -> u32 {
        let mut buffers = self.buffers.lock();
        let pixel_count = (self.width * self.height) as usize;
        let current: Vec<[Float; 3]> = (0..pixel_count)
            .map(|i| Self::developed_pixel(&buffers, i))
            .collect();

        let changing = if buffers.convergence_reference.len() == pixel_count {
            use rayon::prelude::*;
            current
                .par_iter()
                .zip(buffers.convergence_reference.par_iter())
                .filter(|(now, before)| {
                    (0..3).any(|i| (now[i] - before[i]).abs() > threshold)
                })
                .count() as u32
        } else {
            self.width * self.height
        };

        buffers.convergence_reference = current;
        changing
    }

    /// Normalized convergence metric in [0, 1]; 1 means no pixel moved.
    pub fn convergence(&self, threshold: Float) -> Float {
        let changing = self.run_convergence_test(threshold);
        1.0 - changing as Float / (self.width * self.height) as Float
    }

    pub fn to_image_buffer(&self) -> ImageBuffer<Rgb<f32>, Vec<f32>> {
        let buffers = self.buffers.lock();
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for i in 0..(self.width * self.height) as usize {
            let rgb = Self::developed_pixel(&buffers, i);
            data.extend_from_slice(&rgb);
        }
        ImageBuffer::from_vec(self.width, self.height, data)
            .expect("Invalid dimensions when creating image buffer")
    }

    /// Raw accumulator snapshot, used by the determinism tests.
    pub fn accumulator_bits(&self) -> Vec<u32> {
        let buffers = self.buffers.lock();
        let mut bits = Vec::with_capacity(buffers.per_pixel.len() * 4);
        for p in buffers.per_pixel.iter() {
            for c in &p.rgb {
                bits.push(c.to_bits());
            }
            bits.push(p.weight.to_bits());
        }
        for p in buffers.per_screen.iter() {
            for c in p {
                bits.push(c.to_bits());
            }
        }
        bits
    }
}
