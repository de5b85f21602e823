use crate::bsdf::hitpoint::HitPoint;
use crate::{Float, Point3f, Spectrum, Vec2f};
use crate::geometry::Transform;
use std::sync::Arc;

pub mod imagemap;
pub mod noise;

pub use imagemap::{get_image_map, purge_unused_image_maps, ImageMap};

/// Index into the scene-owned texture arena. Composite textures store
/// indices, never references, so scene edits can swap entries in place.
pub type TextureIndex = usize;

#[derive(Debug, Clone, Copy)]
pub struct UvMapping {
    pub u_scale: Float,
    pub v_scale: Float,
    pub u_delta: Float,
    pub v_delta: Float,
}

impl Default for UvMapping {
    fn default() -> Self {
        Self { u_scale: 1.0, v_scale: 1.0, u_delta: 0.0, v_delta: 0.0 }
    }
}

impl UvMapping {
    pub fn map(&self, uv: Vec2f) -> Vec2f {
        Vec2f::new(uv.x * self.u_scale + self.u_delta, uv.y * self.v_scale + self.v_delta)
    }
}

#[derive(Debug, Clone)]
pub struct ImageMapTexture {
    pub image: Arc<ImageMap>,
    pub mapping: UvMapping,
    pub gain: Float,
}

#[derive(Debug, Clone)]
pub struct BrickTexture {
    pub tex1: TextureIndex,
    pub tex2: TextureIndex,
    pub mortar: TextureIndex,
    pub brick_width: Float,
    pub brick_height: Float,
    pub brick_depth: Float,
    pub mortar_size: Float,
    pub mapping: Transform,
}

/// The closed set of texture variants. The hot path (`float_value` /
/// `spectrum_value`) dispatches over an inlined match instead of a vtable.
#[derive(Debug, Clone)]
pub enum Texture {
    ConstFloat(Float),
    ConstSpectrum(Spectrum),
    ImageMap(ImageMapTexture),
    Scale { tex1: TextureIndex, tex2: TextureIndex },
    Mix { amount: TextureIndex, tex1: TextureIndex, tex2: TextureIndex },
    Add { tex1: TextureIndex, tex2: TextureIndex },
    /// Piecewise-linear ramp over the amount texture.
    Band { amount: TextureIndex, offsets: Vec<Float>, values: Vec<Spectrum> },
    Checkerboard2D { tex1: TextureIndex, tex2: TextureIndex, mapping: UvMapping },
    Checkerboard3D { tex1: TextureIndex, tex2: TextureIndex, mapping: Transform },
    Fbm { octaves: i32, omega: Float, mapping: Transform },
    Wrinkled { octaves: i32, omega: Float, mapping: Transform },
    Windy { mapping: Transform },
    Marble { octaves: i32, omega: Float, scale: Float, variation: Float, mapping: Transform },
    Dots { inside: TextureIndex, outside: TextureIndex, mapping: UvMapping },
    Brick(BrickTexture),
    Uv { mapping: UvMapping },
    HitPointColor,
    HitPointAlpha,
    FresnelApproxN(TextureIndex),
    FresnelApproxK(TextureIndex),
    NormalMap { tex: TextureIndex, scale: Float },
}

/// Scene-owned texture arena.
#[derive(Debug, Clone, Default)]
pub struct Textures {
    texs: Vec<Texture>,
}

fn fresnel_approx_n(f: Float) -> Float {
    let f = f.min(0.999);
    (1.0 + f.sqrt()) / (1.0 - f.sqrt())
}

fn fresnel_approx_k(f: Float) -> Float {
    let f = f.min(0.999);
    2.0 * (f / (1.0 - f)).sqrt()
}

impl Textures {
    pub fn new() -> Self {
        Self { texs: Vec::new() }
    }

    pub fn add(&mut self, tex: Texture) -> TextureIndex {
        self.texs.push(tex);
        self.texs.len() - 1
    }

    pub fn get(&self, index: TextureIndex) -> &Texture {
        &self.texs[index]
    }

    pub fn replace(&mut self, index: TextureIndex, tex: Texture) {
        self.texs[index] = tex;
    }

    pub fn len(&self) -> usize {
        self.texs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texs.is_empty()
    }

    pub fn float_value(&self, index: TextureIndex, hp: &HitPoint) -> Float {
        match self.get(index) {
            Texture::ConstFloat(v) => *v,
            Texture::ConstSpectrum(s) => s.y(),
            Texture::ImageMap(im) => {
                let uv = im.mapping.map(hp.uv);
                im.gain * im.image.lookup(uv.x, uv.y).y()
            }
            Texture::Scale { tex1, tex2 } => {
                self.float_value(*tex1, hp) * self.float_value(*tex2, hp)
            }
            Texture::Mix { amount, tex1, tex2 } => {
                let amt = self.float_value(*amount, hp).min(1.0).max(0.0);
                crate::lerp(amt, self.float_value(*tex1, hp), self.float_value(*tex2, hp))
            }
            Texture::Add { tex1, tex2 } => {
                self.float_value(*tex1, hp) + self.float_value(*tex2, hp)
            }
            Texture::Band { .. } => self.spectrum_value(index, hp).y(),
            Texture::Checkerboard2D { tex1, tex2, mapping } => {
                let uv = mapping.map(hp.uv);
                if (uv.x.floor() as i64 + uv.y.floor() as i64) % 2 == 0 {
                    self.float_value(*tex1, hp)
                } else {
                    self.float_value(*tex2, hp)
                }
            }
            Texture::Checkerboard3D { tex1, tex2, mapping } => {
                let p = mapping.transform_point(hp.p);
                if (p.x.floor() as i64 + p.y.floor() as i64 + p.z.floor() as i64) % 2 == 0 {
                    self.float_value(*tex1, hp)
                } else {
                    self.float_value(*tex2, hp)
                }
            }
            Texture::Fbm { octaves, omega, mapping } => {
                noise::fbm(mapping.transform_point(hp.p), *omega, *octaves)
            }
            Texture::Wrinkled { octaves, omega, mapping } => {
                noise::turbulence(mapping.transform_point(hp.p), *omega, *octaves)
            }
            Texture::Windy { mapping } => {
                let p = mapping.transform_point(hp.p);
                let strength = noise::fbm(Point3f::new(p.x * 0.1, p.y * 0.1, p.z * 0.1), 0.5, 3);
                let height = noise::fbm(p, 0.5, 6);
                strength.abs() * height
            }
            Texture::Marble { .. } => self.spectrum_value(index, hp).y(),
            Texture::Dots { inside, outside, mapping } => {
                if Self::inside_dot(mapping.map(hp.uv)) {
                    self.float_value(*inside, hp)
                } else {
                    self.float_value(*outside, hp)
                }
            }
            Texture::Brick(_) => self.spectrum_value(index, hp).y(),
            Texture::Uv { mapping } => {
                let uv = mapping.map(hp.uv);
                Spectrum::new(uv.x - uv.x.floor(), uv.y - uv.y.floor(), 0.0).y()
            }
            Texture::HitPointColor => hp.color.y(),
            Texture::HitPointAlpha => hp.alpha,
            Texture::FresnelApproxN(tex) => fresnel_approx_n(self.float_value(*tex, hp)),
            Texture::FresnelApproxK(tex) => fresnel_approx_k(self.float_value(*tex, hp)),
            Texture::NormalMap { .. } => 0.0,
        }
    }

    pub fn spectrum_value(&self, index: TextureIndex, hp: &HitPoint) -> Spectrum {
        match self.get(index) {
            Texture::ConstFloat(v) => Spectrum::uniform(*v),
            Texture::ConstSpectrum(s) => *s,
            Texture::ImageMap(im) => {
                let uv = im.mapping.map(hp.uv);
                im.gain * im.image.lookup(uv.x, uv.y)
            }
            Texture::Scale { tex1, tex2 } => {
                self.spectrum_value(*tex1, hp) * self.spectrum_value(*tex2, hp)
            }
            Texture::Mix { amount, tex1, tex2 } => {
                let amt = self.float_value(*amount, hp).min(1.0).max(0.0);
                Spectrum::lerp(amt, self.spectrum_value(*tex1, hp), self.spectrum_value(*tex2, hp))
            }
            Texture::Add { tex1, tex2 } => {
                self.spectrum_value(*tex1, hp) + self.spectrum_value(*tex2, hp)
            }
            Texture::Band { amount, offsets, values } => {
                let a = self.float_value(*amount, hp);
                if a < offsets[0] {
                    values[0]
                } else if a >= *offsets.last().unwrap() {
                    *values.last().unwrap()
                } else {
                    let i = offsets.iter().rposition(|&o| o <= a).unwrap();
                    let t = (a - offsets[i]) / (offsets[i + 1] - offsets[i]);
                    Spectrum::lerp(t, values[i], values[i + 1])
                }
            }
            Texture::Checkerboard2D { tex1, tex2, mapping } => {
                let uv = mapping.map(hp.uv);
                if (uv.x.floor() as i64 + uv.y.floor() as i64) % 2 == 0 {
                    self.spectrum_value(*tex1, hp)
                } else {
                    self.spectrum_value(*tex2, hp)
                }
            }
            Texture::Checkerboard3D { tex1, tex2, mapping } => {
                let p = mapping.transform_point(hp.p);
                if (p.x.floor() as i64 + p.y.floor() as i64 + p.z.floor() as i64) % 2 == 0 {
                    self.spectrum_value(*tex1, hp)
                } else {
                    self.spectrum_value(*tex2, hp)
                }
            }
            Texture::Fbm { .. } | Texture::Wrinkled { .. } | Texture::Windy { .. } => {
                Spectrum::uniform(self.float_value(index, hp))
            }
            Texture::Marble { octaves, omega, scale, variation, mapping } => {
                let p = mapping.transform_point(hp.p);
                let p = Point3f::new(p.x * scale, p.y * scale, p.z * scale);
                let marble = p.y + variation * noise::fbm(p, *omega, *octaves);
                let t = 0.5 + 0.5 * marble.sin();
                Self::marble_ramp(t)
            }
            Texture::Dots { inside, outside, mapping } => {
                if Self::inside_dot(mapping.map(hp.uv)) {
                    self.spectrum_value(*inside, hp)
                } else {
                    self.spectrum_value(*outside, hp)
                }
            }
            Texture::Brick(brick) => self.brick_value(brick, hp),
            Texture::Uv { mapping } => {
                let uv = mapping.map(hp.uv);
                Spectrum::new(uv.x - uv.x.floor(), uv.y - uv.y.floor(), 0.0)
            }
            Texture::HitPointColor => hp.color,
            Texture::HitPointAlpha => Spectrum::uniform(hp.alpha),
            Texture::FresnelApproxN(tex) => {
                let s = self.spectrum_value(*tex, hp);
                Spectrum::new(fresnel_approx_n(s.r()), fresnel_approx_n(s.g()), fresnel_approx_n(s.b()))
            }
            Texture::FresnelApproxK(tex) => {
                let s = self.spectrum_value(*tex, hp);
                Spectrum::new(fresnel_approx_k(s.r()), fresnel_approx_k(s.g()), fresnel_approx_k(s.b()))
            }
            Texture::NormalMap { tex, scale } => self.spectrum_value(*tex, hp) * *scale,
        }
    }

    /// Central-difference gradient of the texture along u and v, used by
    /// bump mapping. `delta` is the material's bump sampling distance.
    pub fn uv_gradient(&self, index: TextureIndex, hp: &HitPoint, delta: Float) -> Vec2f {
        let base = self.float_value(index, hp);

        let mut hp_u = hp.clone();
        hp_u.uv.x += delta;
        hp_u.p = hp.p + hp.dpdu * delta;
        let du = (self.float_value(index, &hp_u) - base) / delta;

        let mut hp_v = hp.clone();
        hp_v.uv.y += delta;
        hp_v.p = hp.p + hp.dpdv * delta;
        let dv = (self.float_value(index, &hp_v) - base) / delta;

        Vec2f::new(du, dv)
    }

    fn inside_dot(uv: Vec2f) -> bool {
        let cell = Vec2f::new(uv.x.floor() + 0.5, uv.y.floor() + 0.5);
        let radius = 0.35;
        let d = uv - cell;
        d.x * d.x + d.y * d.y < radius * radius
    }

    fn marble_ramp(t: Float) -> Spectrum {
        // blend between vein and base colors
        let vein = Spectrum::new(0.58, 0.58, 0.6);
        let base = Spectrum::new(0.9, 0.88, 0.85);
        Spectrum::lerp(t, vein, base)
    }

    fn brick_value(&self, brick: &BrickTexture, hp: &HitPoint) -> Spectrum {
        let p = brick.mapping.transform_point(hp.p);
        let run_width = brick.brick_width + brick.mortar_size;
        let run_height = brick.brick_height + brick.mortar_size;
        let run_depth = brick.brick_depth + brick.mortar_size;

        let by = (p.y / run_height).floor();
        // running bond: every other course shifts by half a brick
        let shift = if (by as i64) % 2 == 0 { 0.0 } else { 0.5 * run_width };
        let bx = ((p.x + shift) / run_width).floor();

        let fx = p.x + shift - bx * run_width;
        let fy = p.y - by * run_height;
        let fz = p.z - (p.z / run_depth).floor() * run_depth;

        if fx < brick.mortar_size || fy < brick.mortar_size || fz < brick.mortar_size {
            self.spectrum_value(brick.mortar, hp)
        } else {
            // modulate bricks with the secondary texture
            self.spectrum_value(brick.tex1, hp) * self.spectrum_value(brick.tex2, hp)
        }
    }
}
