use crate::{Float, Spectrum};

/// Unpolarized Fresnel reflectance at a dielectric boundary.
/// `cos_theta_i` is signed; a negative value means the direction is on the
/// transmission side and the indices swap.
pub fn fresnel_dielectric(cos_theta_i: Float, mut eta_i: Float, mut eta_t: Float) -> Float {
    let mut cos_theta_i = cos_theta_i.min(1.0).max(-1.0);
    let entering = cos_theta_i > 0.0;
    if !entering {
        std::mem::swap(&mut eta_i, &mut eta_t);
        cos_theta_i = cos_theta_i.abs();
    }

    // compute cos_theta_t using Snell's law
    let sin_theta_i = Float::sqrt((1.0 - cos_theta_i * cos_theta_i).max(0.0));
    let sin_theta_t = eta_i / eta_t * sin_theta_i;
    if sin_theta_t >= 1.0 {
        return 1.0; // total internal reflection
    }
    let cos_theta_t = Float::sqrt((1.0 - sin_theta_t * sin_theta_t).max(0.0));

    let r_parallel = ((eta_t * cos_theta_i) - (eta_i * cos_theta_t))
        / ((eta_t * cos_theta_i) + (eta_i * cos_theta_t));
    let r_perp = ((eta_i * cos_theta_i) - (eta_t * cos_theta_t))
        / ((eta_i * cos_theta_i) + (eta_t * cos_theta_t));

    (r_parallel * r_parallel + r_perp * r_perp) / 2.0
}

/// Fresnel reflectance for a conductor with complex IOR `eta + i·k`.
#[allow(non_snake_case)]
pub fn fresnel_conductor(cos_theta_i: Float, eta: Spectrum, k: Spectrum) -> Spectrum {
    let cos_theta_i = cos_theta_i.abs().min(1.0);

    let cos_theta_i2 = cos_theta_i * cos_theta_i;
    let sin_theta_i2 = 1.0 - cos_theta_i2;
    let eta2 = eta * eta;
    let eta_k2 = k * k;

    let t0 = eta2 - eta_k2 - Spectrum::uniform(sin_theta_i2);
    let a2plusb2 = (t0 * t0 + 4.0 * eta2 * eta_k2).sqrt();
    let t1 = a2plusb2 + Spectrum::uniform(cos_theta_i2);
    let a = ((a2plusb2 + t0) * 0.5).clamp_positive().sqrt();
    let t2 = 2.0 * cos_theta_i * a;
    let Rs = (t1 - t2) / (t1 + t2);

    let t3 = cos_theta_i2 * a2plusb2 + Spectrum::uniform(sin_theta_i2 * sin_theta_i2);
    let t4 = t2 * sin_theta_i2;
    let Rp = Rs * (t3 - t4) / (t3 + t4);

    0.5 * (Rp + Rs)
}

/// Schlick's approximation with a spectral normal reflectance, used by the
/// glossy coating lobes.
pub fn schlick_fresnel(ks: Spectrum, cos_theta: Float) -> Spectrum {
    let w = (1.0 - cos_theta.abs()).max(0.0).powi(5);
    ks + w * (Spectrum::WHITE - ks)
}
