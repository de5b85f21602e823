use crate::{Float, Spectrum};
use anyhow::Context;
use ndarray::Array2;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Decoded image-map pixels. Instances are shared through the process-wide
/// cache below and are immutable once loaded.
#[derive(Debug)]
pub struct ImageMap {
    pub pixels: Array2<Spectrum>,
    pub alpha: Option<Array2<Float>>,
    pub width: usize,
    pub height: usize,
}

impl ImageMap {
    pub fn from_rgba8(data: &[u8], width: usize, height: usize, gamma: Float) -> Self {
        let mut pixels = Array2::from_elem((height, width), Spectrum::BLACK);
        let mut alpha = Array2::from_elem((height, width), 1.0);
        let mut any_alpha = false;
        for y in 0..height {
            for x in 0..width {
                let i = (y * width + x) * 4;
                let decode = |v: u8| ((v as Float) / 255.0).powf(gamma);
                pixels[(y, x)] = Spectrum::new(decode(data[i]), decode(data[i + 1]), decode(data[i + 2]));
                let a = data[i + 3] as Float / 255.0;
                alpha[(y, x)] = a;
                any_alpha |= a < 1.0;
            }
        }
        Self {
            pixels,
            alpha: if any_alpha { Some(alpha) } else { None },
            width,
            height,
        }
    }

    pub fn load(path: impl AsRef<Path>, gamma: Float) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let img = image::open(path)
            .with_context(|| format!("Unable to load image map {:?}", path))?
            .to_rgba();
        let (w, h) = img.dimensions();
        Ok(Self::from_rgba8(img.as_raw(), w as usize, h as usize, gamma))
    }

    fn texel(&self, x: i64, y: i64) -> Spectrum {
        let x = x.rem_euclid(self.width as i64) as usize;
        let y = y.rem_euclid(self.height as i64) as usize;
        self.pixels[(y, x)]
    }

    fn texel_alpha(&self, x: i64, y: i64) -> Float {
        match &self.alpha {
            Some(a) => {
                let x = x.rem_euclid(self.width as i64) as usize;
                let y = y.rem_euclid(self.height as i64) as usize;
                a[(y, x)]
            }
            None => 1.0,
        }
    }

    /// Bilinear lookup with repeat wrapping.
    pub fn lookup(&self, u: Float, v: Float) -> Spectrum {
        let s = u * self.width as Float - 0.5;
        let t = v * self.height as Float - 0.5;
        let x0 = s.floor() as i64;
        let y0 = t.floor() as i64;
        let ds = s - x0 as Float;
        let dt = t - y0 as Float;
        (1.0 - ds) * (1.0 - dt) * self.texel(x0, y0)
            + (1.0 - ds) * dt * self.texel(x0, y0 + 1)
            + ds * (1.0 - dt) * self.texel(x0 + 1, y0)
            + ds * dt * self.texel(x0 + 1, y0 + 1)
    }

    pub fn lookup_alpha(&self, u: Float, v: Float) -> Float {
        let s = u * self.width as Float - 0.5;
        let t = v * self.height as Float - 0.5;
        let x0 = s.floor() as i64;
        let y0 = t.floor() as i64;
        let ds = s - x0 as Float;
        let dt = t - y0 as Float;
        (1.0 - ds) * (1.0 - dt) * self.texel_alpha(x0, y0)
            + (1.0 - ds) * dt * self.texel_alpha(x0, y0 + 1)
            + ds * (1.0 - dt) * self.texel_alpha(x0 + 1, y0)
            + ds * dt * self.texel_alpha(x0 + 1, y0 + 1)
    }

    /// Per-texel luminance, flattened row-major. Feeds the env-light
    /// importance tables.
    pub fn luminance_values(&self) -> Vec<Float> {
        let mut out = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                out.push(self.pixels[(y, x)].y());
            }
        }
        out
    }

    pub fn mean_luminance(&self) -> Float {
        let n = (self.width * self.height) as Float;
        self.luminance_values().iter().sum::<Float>() / n
    }
}

static IMAGE_MAP_CACHE: Lazy<Mutex<HashMap<String, Arc<ImageMap>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Loads through the process-wide cache, keyed by path and decode gamma.
/// The cache is only touched during scene builds/edits, never while
/// rendering.
pub fn get_image_map(path: &str, gamma: Float) -> anyhow::Result<Arc<ImageMap>> {
    let key = format!("{}|{}", path, gamma);
    let mut cache = IMAGE_MAP_CACHE.lock();
    if let Some(map) = cache.get(&key) {
        return Ok(map.clone());
    }
    let map = Arc::new(ImageMap::load(path, gamma)?);
    cache.insert(key, map.clone());
    Ok(map)
}

/// Drops cache entries not referenced from outside the cache. Called between
/// scene edits on request.
pub fn purge_unused_image_maps() {
    let mut cache = IMAGE_MAP_CACHE.lock();
    cache.retain(|_, v| Arc::strong_count(v) > 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker_map() -> ImageMap {
        // 2x2 black/white checker, gamma 1
        let data: Vec<u8> = vec![
            255, 255, 255, 255,  0, 0, 0, 255,
            0, 0, 0, 255,  255, 255, 255, 255,
        ];
        ImageMap::from_rgba8(&data, 2, 2, 1.0)
    }

    #[test]
    fn test_lookup_center_of_texel() {
        let map = checker_map();
        let c = map.lookup(0.25, 0.25);
        approx::assert_abs_diff_eq!(c.r(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_lookup_wraps() {
        let map = checker_map();
        let a = map.lookup(0.25, 0.25);
        let b = map.lookup(1.25, 0.25);
        approx::assert_abs_diff_eq!(a.r(), b.r(), epsilon = 1e-5);
    }

    #[test]
    fn test_mean_luminance() {
        let map = checker_map();
        approx::assert_abs_diff_eq!(map.mean_luminance(), 0.5, epsilon = 1e-5);
    }
}
