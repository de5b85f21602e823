//! Schlick's microfacet distribution with anisotropy, shared by the rough
//! glass, glossy coating and metal variants.

use crate::{consts, Float, Vec3f};

/// Collapses the `(nu, nv)` anisotropic roughness pair into the scalar
/// roughness and signed anisotropy this distribution is parameterized by.
pub fn roughness_anisotropy(nu: Float, nv: Float) -> (Float, Float) {
    let u = nu.min(1.0).max(6e-3);
    let v = nv.min(1.0).max(6e-3);
    let u2 = u * u;
    let v2 = v * v;

    let anisotropy = if u2 < v2 { 1.0 - u2 / v2 } else { v2 / u2 - 1.0 };
    (u * v, anisotropy)
}

fn schlick_z(roughness: Float, cos_nh: Float) -> Float {
    if roughness > 0.0 {
        let cos_nh2 = cos_nh * cos_nh;
        // expanded for numerical stability near zero roughness
        let d = cos_nh2 * roughness + (1.0 - cos_nh2);
        (roughness / d) / d
    } else {
        0.0
    }
}

fn schlick_a(h: Vec3f, anisotropy: Float) -> Float {
    let ht = (h.x * h.x + h.y * h.y).sqrt();
    if ht > 0.0 {
        let w = (if anisotropy > 0.0 { h.x } else { h.y }) / ht;
        let p = 1.0 - anisotropy.abs();
        (p / (p * p + w * w * (1.0 - p * p))).sqrt()
    } else {
        1.0
    }
}

pub fn distribution_d(roughness: Float, wh: Vec3f, anisotropy: Float) -> Float {
    schlick_z(roughness, wh.z.abs()) * schlick_a(wh, anisotropy) * consts::FRAC_1_PI
}

fn schlick_g1(roughness: Float, cos_theta: Float) -> Float {
    cos_theta / (cos_theta * (1.0 - roughness) + roughness)
}

pub fn distribution_g(roughness: Float, local_fixed_dir: Vec3f, local_sampled_dir: Vec3f) -> Float {
    schlick_g1(roughness, local_fixed_dir.z.abs()) * schlick_g1(roughness, local_sampled_dir.z.abs())
}

/// Samples a half vector; returns `(wh, d, pdf)`.
pub fn sample_h(roughness: Float, anisotropy: Float, u0: Float, u1: Float) -> (Vec3f, Float, Float) {
    let cos2_theta = u0 / (roughness * (1.0 - u0) + u0);
    let cos_theta = cos2_theta.sqrt();
    let sin_theta = (1.0 - cos2_theta).max(0.0).sqrt();
    let p = 1.0 - anisotropy.abs();

    // fold the quadrants so the anisotropic azimuth stays continuous
    let u1x4 = u1 * 4.0;
    let phi = if u1x4 < 1.0 {
        (p * (consts::FRAC_PI_2 * u1x4).tan()).atan()
    } else if u1x4 < 2.0 {
        consts::PI - (p * (consts::FRAC_PI_2 * (2.0 - u1x4)).tan()).atan()
    } else if u1x4 < 3.0 {
        consts::PI + (p * (consts::FRAC_PI_2 * (u1x4 - 2.0)).tan()).atan()
    } else {
        consts::TWO_PI - (p * (consts::FRAC_PI_2 * (4.0 - u1x4)).tan()).atan()
    };
    let phi = if anisotropy > 0.0 { phi + consts::FRAC_PI_2 } else { phi };

    let wh = Vec3f::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);
    let d = schlick_z(roughness, cos_theta) * schlick_a(wh, anisotropy) * consts::FRAC_1_PI;
    (wh, d, d)
}

pub fn distribution_pdf(roughness: Float, wh: Vec3f, anisotropy: Float) -> Float {
    distribution_d(roughness, wh, anisotropy)
}
