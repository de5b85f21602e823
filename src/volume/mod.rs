use crate::bsdf::hitpoint::HitPoint;
use crate::geometry::Ray;
use crate::material::{BSDFEvent, BsdfEval, BsdfSample};
use crate::texture::{TextureIndex, Textures};
use crate::{consts, Float, Normal3, Point3f, Spectrum, Vec2f, Vec3f};
use arrayvec::ArrayVec;
use cgmath::InnerSpace;

pub type VolumeIndex = usize;

pub const PATH_VOLUME_INFO_SIZE: usize = 8;

/// Attributes shared by every volume variant.
#[derive(Debug, Clone)]
pub struct VolumeBase {
    pub ior: TextureIndex,
    /// Emission along rays inside the medium; unlike surface emission it is
    /// never sampled by direct lighting.
    pub emission: Option<TextureIndex>,
    pub priority: i32,
}

/// Outcome of `Volume::scatter`: `t_scatter <= 0` means the ray reached
/// `maxt` without a scattering event. The transmittance is always folded
/// into `throughput`, and `emission` accumulates the medium's own glow.
#[derive(Debug, Clone, Copy)]
pub struct VolumeScatter {
    pub t_scatter: Float,
    pub throughput: Spectrum,
    pub emission: Spectrum,
}

impl VolumeScatter {
    pub fn none(throughput: Spectrum, emission: Spectrum) -> Self {
        Self { t_scatter: -1.0, throughput, emission }
    }

    pub fn scattered(&self) -> bool {
        self.t_scatter > 0.0
    }
}

/// Evaluation point for volume textures: only the position is meaningful.
fn volume_hit_point(p: Point3f) -> HitPoint {
    HitPoint {
        fixed_dir: Vec3f::new(0.0, 0.0, 1.0),
        p,
        uv: Vec2f::new(0.0, 0.0),
        ng: Normal3::new(0.0, 0.0, 1.0),
        ns: Normal3::new(0.0, 0.0, 1.0),
        dpdu: Vec3f::new(1.0, 0.0, 0.0),
        dpdv: Vec3f::new(0.0, 1.0, 0.0),
        color: Spectrum::WHITE,
        alpha: 1.0,
        pass_through_event: 0.0,
        from_light: false,
        into_object: true,
        interior_volume: None,
        exterior_volume: None,
    }
}

/// Absorption-only medium.
#[derive(Debug, Clone)]
pub struct ClearVolume {
    pub base: VolumeBase,
    pub sigma_a: TextureIndex,
}

/// Constant-coefficient single/multi scattering medium.
#[derive(Debug, Clone)]
pub struct HomogeneousVolume {
    pub base: VolumeBase,
    pub sigma_a: TextureIndex,
    pub sigma_s: TextureIndex,
    pub g: TextureIndex,
    pub multi_scattering: bool,
}

/// Ray-marched medium with spatially varying coefficients.
#[derive(Debug, Clone)]
pub struct HeterogeneousVolume {
    pub base: VolumeBase,
    pub sigma_a: TextureIndex,
    pub sigma_s: TextureIndex,
    pub g: TextureIndex,
    pub multi_scattering: bool,
    pub step_size: Float,
    pub max_steps: u32,
}

#[derive(Debug, Clone)]
pub enum Volume {
    Clear(ClearVolume),
    Homogeneous(HomogeneousVolume),
    Heterogeneous(HeterogeneousVolume),
}

impl Volume {
    pub fn base(&self) -> &VolumeBase {
        match self {
            Volume::Clear(v) => &v.base,
            Volume::Homogeneous(v) => &v.base,
            Volume::Heterogeneous(v) => &v.base,
        }
    }

    pub fn priority(&self) -> i32 {
        self.base().priority
    }

    pub fn ior(&self, textures: &Textures, hp: &HitPoint) -> Float {
        textures.float_value(self.base().ior, hp)
    }

    fn emission_along(&self, textures: &Textures, p: Point3f, distance: Float) -> Spectrum {
        match self.base().emission {
            Some(tex) => textures.spectrum_value(tex, &volume_hit_point(p)) * distance,
            None => Spectrum::BLACK,
        }
    }

    /// Walks the medium along `[ray.mint, ray.maxt]`. `scattered_start`
    /// suppresses a second scatter for single-scattering media whose path
    /// already scattered in this volume.
    pub fn scatter(
        &self,
        textures: &Textures,
        ray: &Ray,
        u: Float,
        scattered_start: bool,
    ) -> VolumeScatter {
        match self {
            Volume::Clear(v) => {
                let distance = ray.maxt - ray.mint;
                let hp = volume_hit_point(ray.at(ray.mint));
                let sigma_a = textures.spectrum_value(v.sigma_a, &hp).clamp_positive();
                let throughput = (sigma_a * -distance).exp();
                let emission = self.emission_along(textures, ray.at(ray.mint), distance);
                VolumeScatter::none(throughput, emission)
            }
            Volume::Homogeneous(v) => {
                let distance = ray.maxt - ray.mint;
                let hp = volume_hit_point(ray.at(ray.mint));
                let sigma_a = textures.spectrum_value(v.sigma_a, &hp).clamp_positive();
                let sigma_s = textures.spectrum_value(v.sigma_s, &hp).clamp_positive();
                let sigma_t = sigma_a + sigma_s;

                let scatter_allowed = v.multi_scattering || !scattered_start;
                let k = sigma_s.filter();
                if !scatter_allowed || k <= 0.0 {
                    let throughput = (sigma_t * -distance).exp();
                    let emission = self.emission_along(textures, ray.at(ray.mint), distance);
                    return VolumeScatter::none(throughput, emission);
                }

                let sampled = -Float::ln(1.0 - u.min(0.999_999)) / k;
                if sampled < distance {
                    let pdf = k * (-k * sampled).exp();
                    let throughput = sigma_s * (sigma_t * -sampled).exp() / pdf;
                    let emission = self.emission_along(textures, ray.at(ray.mint), sampled);
                    VolumeScatter {
                        t_scatter: ray.mint + sampled,
                        throughput,
                        emission,
                    }
                } else {
                    let pdf = (-k * distance).exp();
                    let throughput = (sigma_t * -distance).exp() / pdf;
                    let emission = self.emission_along(textures, ray.at(ray.mint), distance);
                    VolumeScatter::none(throughput, emission)
                }
            }
            Volume::Heterogeneous(v) => self.scatter_heterogeneous(v, textures, ray, u, scattered_start),
        }
    }

    fn scatter_heterogeneous(
        &self,
        v: &HeterogeneousVolume,
        textures: &Textures,
        ray: &Ray,
        u: Float,
        scattered_start: bool,
    ) -> VolumeScatter {
        let distance = ray.maxt - ray.mint;
        let scatter_allowed = v.multi_scattering || !scattered_start;

        // march in fixed steps, accumulating optical depth until the
        // exponentially sampled target depth is crossed
        let target = -Float::ln(1.0 - u.min(0.999_999));
        let step = v.step_size;
        let steps = ((distance / step).ceil() as u32).min(v.max_steps).max(1);

        let mut tau = 0.0;
        let mut tau_spectral = Spectrum::BLACK;
        let mut emission = Spectrum::BLACK;
        let mut walked = 0.0;
        for _ in 0..steps {
            let seg = step.min(distance - walked);
            if seg <= 0.0 {
                break;
            }
            let p = ray.at(ray.mint + walked + 0.5 * seg);
            let hp = volume_hit_point(p);
            let sigma_a = textures.spectrum_value(v.sigma_a, &hp).clamp_positive();
            let sigma_s = textures.spectrum_value(v.sigma_s, &hp).clamp_positive();
            let sigma_t = sigma_a + sigma_s;
            let k = sigma_s.filter();

            if scatter_allowed && k > 0.0 && tau + k * seg >= target {
                // scatter inside this segment
                let local = (target - tau) / k;
                let t_scatter = ray.mint + walked + local;
                let pdf = k * (-target).exp();
                let throughput =
                    sigma_s * ((tau_spectral + sigma_t * local) * -1.0).exp() / pdf;
                emission += self.emission_along(textures, p, local);
                return VolumeScatter { t_scatter, throughput, emission };
            }

            tau += k * seg;
            tau_spectral += sigma_t * seg;
            emission += self.emission_along(textures, p, seg);
            walked += seg;
        }

        let throughput = if scatter_allowed {
            let pdf = (-tau).exp();
            (tau_spectral * -1.0).exp() / pdf
        } else {
            (tau_spectral * -1.0).exp()
        };
        VolumeScatter::none(throughput, emission)
    }

    //
    // Phase-function BSDF interface, used when a path vertex is a scatter
    // event inside this volume.
    //

    fn schlick_k(&self, textures: &Textures, hp: &HitPoint) -> Spectrum {
        let g_tex = match self {
            Volume::Clear(_) => return Spectrum::BLACK,
            Volume::Homogeneous(v) => v.g,
            Volume::Heterogeneous(v) => v.g,
        };
        let g = textures.spectrum_value(g_tex, hp).clamp(-1.0, 1.0);
        // Schlick's k approximating Henyey-Greenstein for the same g
        Spectrum::new(
            g.r() * (1.55 - 0.55 * g.r() * g.r()),
            g.g() * (1.55 - 0.55 * g.g() * g.g()),
            g.b() * (1.55 - 0.55 * g.b() * g.b()),
        )
    }

    fn phase(&self, k: Float, cos_theta: Float) -> Float {
        let compcost = 1.0 + k * cos_theta;
        (1.0 - k * k) / (compcost * compcost * consts::FOUR_PI)
    }

    pub fn phase_evaluate(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_light_dir: Vec3f,
        local_eye_dir: Vec3f,
    ) -> Option<BsdfEval> {
        let k = self.schlick_k(textures, hp);
        let cos_theta = local_light_dir.dot(local_eye_dir);
        let f = Spectrum::new(
            self.phase(k.r(), cos_theta),
            self.phase(k.g(), cos_theta),
            self.phase(k.b(), cos_theta),
        );
        if f.is_black() {
            return None;
        }
        let pdf = f.y().max(0.0);
        if pdf <= 0.0 {
            return None;
        }
        Some(BsdfEval {
            f,
            event: BSDFEvent::DIFFUSE | BSDFEvent::REFLECT,
            direct_pdf_w: pdf,
            reverse_pdf_w: pdf,
        })
    }

    pub fn phase_sample(
        &self,
        textures: &Textures,
        hp: &HitPoint,
        local_fixed_dir: Vec3f,
        u0: Float,
        u1: Float,
    ) -> Option<BsdfSample> {
        let k = self.schlick_k(textures, hp).y();

        // invert the Schlick phase cdf for cos(theta)
        let cos_theta = if k.abs() < 1e-3 {
            1.0 - 2.0 * u0
        } else {
            // inverse cdf of the Schlick phase function
            (2.0 * u0 + k - 1.0) / (2.0 * k * u0 - k + 1.0)
        };
        let cos_theta = cos_theta.min(1.0).max(-1.0);
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let phi = consts::TWO_PI * u1;

        // frame around the incoming direction
        let w = -local_fixed_dir;
        let (v1, v2) = crate::coordinate_system(w);
        let sampled_dir = v1 * (sin_theta * phi.cos()) + v2 * (sin_theta * phi.sin()) + w * cos_theta;

        let eval = self.phase_evaluate(textures, hp, sampled_dir, local_fixed_dir)?;
        Some(BsdfSample {
            sampled_dir,
            f_over_pdf: eval.f / eval.direct_pdf_w,
            pdf_w: eval.direct_pdf_w,
            abs_cos_sampled: 1.0,
            event: eval.event,
        })
    }
}

/// Scene-owned volume arena.
#[derive(Debug, Clone, Default)]
pub struct Volumes {
    vols: Vec<Volume>,
}

impl Volumes {
    pub fn new() -> Self {
        Self { vols: Vec::new() }
    }

    pub fn add(&mut self, v: Volume) -> VolumeIndex {
        self.vols.push(v);
        self.vols.len() - 1
    }

    pub fn get(&self, index: VolumeIndex) -> &Volume {
        &self.vols[index]
    }

    pub fn len(&self) -> usize {
        self.vols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vols.is_empty()
    }
}

/// Bounded stack of the volumes containing the current path vertex, kept in
/// sync at every transmissive surface crossing. The current volume is
/// always the highest-priority member.
#[derive(Debug, Clone, Default)]
pub struct PathVolumeInfo {
    stack: ArrayVec<[VolumeIndex; PATH_VOLUME_INFO_SIZE]>,
    current: Option<VolumeIndex>,
    scattered_start: bool,
}

impl PathVolumeInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_volume(&self) -> Option<VolumeIndex> {
        self.current
    }

    pub fn list_size(&self) -> usize {
        self.stack.len()
    }

    pub fn is_scattered_start(&self) -> bool {
        self.scattered_start
    }

    pub fn set_scattered_start(&mut self, v: bool) {
        self.scattered_start = v;
    }

    fn refresh_current(&mut self, volumes: &Volumes) {
        self.current = self
            .stack
            .iter()
            .copied()
            .max_by_key(|&v| volumes.get(v).priority());
    }

    pub fn add_volume(&mut self, v: VolumeIndex, volumes: &Volumes) {
        // a full stack drops the volume rather than panicking
        if self.stack.len() == PATH_VOLUME_INFO_SIZE {
            return;
        }
        self.stack.push(v);
        self.refresh_current(volumes);
    }

    pub fn remove_volume(&mut self, v: VolumeIndex, volumes: &Volumes) {
        if let Some(pos) = self.stack.iter().position(|&x| x == v) {
            self.stack.remove(pos);
            self.refresh_current(volumes);
        }
    }

    /// Stack maintenance after a surface event: transmission into an object
    /// pushes its interior volume, transmission out pops it.
    pub fn update(
        &mut self,
        event: BSDFEvent,
        into_object: bool,
        interior: Option<VolumeIndex>,
        volumes: &Volumes,
    ) {
        if !event.contains(BSDFEvent::TRANSMIT) {
            return;
        }
        if let Some(vol) = interior {
            if into_object {
                self.add_volume(vol, volumes);
            } else {
                self.remove_volume(vol, volumes);
            }
        }
    }

    /// The volume-priority rule: a transmissive surface is ignored when the
    /// volume the path is currently inside dominates the boundary being
    /// crossed.
    pub fn continue_to_trace(
        &self,
        can_transmit: bool,
        into_object: bool,
        interior: Option<VolumeIndex>,
        volumes: &Volumes,
    ) -> bool {
        if !can_transmit {
            return false;
        }
        let current_priority = self.current.map(|v| volumes.get(v).priority());
        if into_object {
            // entering: skip the surface when the current volume outranks
            // the interior behind it
            match (current_priority, interior) {
                (Some(cur), Some(int)) => cur > volumes.get(int).priority(),
                (Some(_), None) => true,
                _ => false,
            }
        } else {
            // leaving: skip unless we are actually closing the volume we
            // are inside of
            self.current != interior
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{Texture, Textures};

    fn volumes_with_priorities(priorities: &[i32]) -> (Volumes, Textures) {
        let mut texs = Textures::new();
        let ior = texs.add(Texture::ConstFloat(1.0));
        let sigma = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.1)));
        let mut vols = Volumes::new();
        for &p in priorities {
            vols.add(Volume::Clear(ClearVolume {
                base: VolumeBase { ior, emission: None, priority: p },
                sigma_a: sigma,
            }));
        }
        (vols, texs)
    }

    #[test]
    fn test_current_is_highest_priority() {
        let (vols, _) = volumes_with_priorities(&[1, 5, 3]);
        let mut info = PathVolumeInfo::new();
        info.add_volume(0, &vols);
        info.add_volume(1, &vols);
        info.add_volume(2, &vols);
        assert_eq!(info.current_volume(), Some(1));
        info.remove_volume(1, &vols);
        assert_eq!(info.current_volume(), Some(2));
    }

    #[test]
    fn test_stack_overflow_is_dropped() {
        let (vols, _) = volumes_with_priorities(&[0; 12]);
        let mut info = PathVolumeInfo::new();
        for i in 0..12 {
            info.add_volume(i % vols.len(), &vols);
        }
        assert_eq!(info.list_size(), PATH_VOLUME_INFO_SIZE);
    }

    #[test]
    fn test_priority_rule_entering() {
        let (vols, _) = volumes_with_priorities(&[10, 1]);
        let mut info = PathVolumeInfo::new();
        info.add_volume(0, &vols);
        // entering a lower-priority interior: the current volume dominates
        assert!(info.continue_to_trace(true, true, Some(1), &vols));
        // entering a higher-priority interior: handle the surface
        let (vols2, _) = volumes_with_priorities(&[1, 10]);
        let mut info2 = PathVolumeInfo::new();
        info2.add_volume(0, &vols2);
        assert!(!info2.continue_to_trace(true, true, Some(1), &vols2));
    }

    #[test]
    fn test_priority_rule_leaving() {
        let (vols, _) = volumes_with_priorities(&[5, 1]);
        let mut info = PathVolumeInfo::new();
        info.add_volume(0, &vols);
        // leaving an object whose interior is not the current volume
        assert!(info.continue_to_trace(true, false, Some(1), &vols));
        // leaving the volume we are actually inside
        assert!(!info.continue_to_trace(true, false, Some(0), &vols));
    }

    #[test]
    fn test_clear_volume_beer_lambert() {
        let mut texs = Textures::new();
        let ior = texs.add(Texture::ConstFloat(1.0));
        let sigma = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.5)));
        let vol = Volume::Clear(ClearVolume {
            base: VolumeBase { ior, emission: None, priority: 0 },
            sigma_a: sigma,
        });
        let ray = Ray::with_extent(point3f!(0, 0, 0), vec3f!(0, 0, 1), 0.0, 2.0);
        let result = vol.scatter(&texs, &ray, 0.3, false);
        assert!(!result.scattered());
        approx::assert_abs_diff_eq!(result.throughput.r(), (-1.0f32).exp(), epsilon = 1e-5);
    }

    #[test]
    fn test_homogeneous_scatter_event() {
        let mut texs = Textures::new();
        let ior = texs.add(Texture::ConstFloat(1.0));
        let sigma_a = texs.add(Texture::ConstSpectrum(Spectrum::uniform(0.0)));
        let sigma_s = texs.add(Texture::ConstSpectrum(Spectrum::uniform(10.0)));
        let g = texs.add(Texture::ConstSpectrum(Spectrum::BLACK));
        let vol = Volume::Homogeneous(HomogeneousVolume {
            base: VolumeBase { ior, emission: None, priority: 0 },
            sigma_a,
            sigma_s,
            g,
            multi_scattering: false,
        });
        let ray = Ray::with_extent(point3f!(0, 0, 0), vec3f!(0, 0, 1), 0.0, 100.0);
        let result = vol.scatter(&texs, &ray, 0.5, false);
        assert!(result.scattered());
        // dense medium scatters close to the origin
        assert!(result.t_scatter < 1.0);

        // a path that already scattered must pass through unscattered
        let again = vol.scatter(&texs, &ray, 0.5, true);
        assert!(!again.scattered());
    }

    #[test]
    fn test_isotropic_phase_normalization() {
        let mut texs = Textures::new();
        let ior = texs.add(Texture::ConstFloat(1.0));
        let s = texs.add(Texture::ConstSpectrum(Spectrum::uniform(1.0)));
        let g = texs.add(Texture::ConstSpectrum(Spectrum::BLACK));
        let vol = Volume::Homogeneous(HomogeneousVolume {
            base: VolumeBase { ior, emission: None, priority: 0 },
            sigma_a: s,
            sigma_s: s,
            g,
            multi_scattering: false,
        });
        let hp = HitPoint::test_default();
        let eval = vol
            .phase_evaluate(&texs, &hp, vec3f!(0, 0, 1), vec3f!(1, 0, 0))
            .unwrap();
        approx::assert_abs_diff_eq!(eval.f.r(), consts::FRAC_1_4PI, epsilon = 1e-5);
    }
}
