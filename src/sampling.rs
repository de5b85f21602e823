use crate::{consts, Float, Point2f, Vec2f, Vec3f};

pub fn concentric_sample_disk(u: Point2f) -> Point2f {
    // map sample from [0, 1] to [-1, 1]
    let u_offset = 2.0 * u - Vec2f::new(1.0, 1.0);
    if u_offset == Point2f::new(0.0, 0.0) {
        return Point2f::new(0.0, 0.0);
    }

    let (r, theta) = if u_offset.x.abs() > u_offset.y.abs() {
        (u_offset.x, consts::FRAC_PI_4 * (u_offset.y / u_offset.x))
    } else {
        (u_offset.y, consts::FRAC_PI_2 - consts::FRAC_PI_4 * (u_offset.x / u_offset.y))
    };

    r * Point2f::new(theta.cos(), theta.sin())
}

pub fn cosine_sample_hemisphere(u: Point2f) -> Vec3f {
    let d = concentric_sample_disk(u);
    let z = Float::sqrt(Float::max(0.0, 1.0 - d.x * d.x - d.y * d.y));
    Vec3f::new(d.x, d.y, z)
}

pub fn cosine_hemisphere_pdf(cos_theta: Float) -> Float {
    cos_theta * consts::FRAC_1_PI
}

pub fn uniform_sample_sphere(u: Point2f) -> Vec3f {
    let z = 1.0 - 2.0 * u.x;
    let r = Float::max(0.0, 1.0 - z * z).sqrt();
    let phi = consts::TWO_PI * u.y;
    Vec3f::new(r * phi.cos(), r * phi.sin(), z)
}

pub const UNIFORM_SPHERE_PDF: Float = consts::FRAC_1_4PI;

pub fn uniform_sample_cone(u: Point2f, cos_theta_max: Float) -> Vec3f {
    let cos_theta = (1.0 - u.x) + u.x * cos_theta_max;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = u.y * consts::TWO_PI;
    Vec3f::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta)
}

pub fn uniform_cone_pdf(cos_theta_max: Float) -> Float {
    1.0 / (consts::TWO_PI * (1.0 - cos_theta_max))
}

/// Barycentric coordinates of a uniform point on a triangle.
pub fn uniform_sample_triangle(u: Point2f) -> (Float, Float) {
    let su0 = u.x.sqrt();
    (1.0 - su0, u.y * su0)
}

pub fn power_heuristic(nf: i32, f_pdf: Float, ng: i32, g_pdf: Float) -> Float {
    let f = nf as Float * f_pdf;
    let g = ng as Float * g_pdf;
    (f * f) / (f * f + g * g)
}

/// Converts a solid-angle density at a point to an area density at the
/// surface it subtends: `pdf · |cos| / dist²`.
pub fn pdf_w_to_a(pdf_w: Float, dist: Float, cos_there: Float) -> Float {
    pdf_w * cos_there.abs() / (dist * dist)
}

pub fn pdf_a_to_w(pdf_a: Float, dist: Float, cos_there: Float) -> Float {
    pdf_a * dist * dist / cos_there.abs()
}

/// Piecewise-constant 1D distribution with precomputed cdf. Backs
/// power-proportional light picking and row selection in image-map
/// environment sampling.
#[derive(Debug, Clone)]
pub struct Distribution1D {
    pub func: Vec<Float>,
    pub cdf: Vec<Float>,
    pub func_int: Float,
}

impl Distribution1D {
    pub fn new(func: &[Float]) -> Self {
        let n = func.len();
        assert!(n > 0);
        let mut cdf = vec![0.0; n + 1];
        for i in 1..=n {
            cdf[i] = cdf[i - 1] + func[i - 1] / n as Float;
        }

        let func_int = cdf[n];
        if func_int == 0.0 {
            // degenerate: fall back to uniform
            for (i, v) in cdf.iter_mut().enumerate() {
                *v = i as Float / n as Float;
            }
        } else {
            for v in cdf.iter_mut() {
                *v /= func_int;
            }
        }

        Self { func: func.to_vec(), cdf, func_int }
    }

    pub fn count(&self) -> usize {
        self.func.len()
    }

    fn find_interval(&self, u: Float) -> usize {
        // binary search for the largest cdf entry <= u
        let mut first = 0;
        let mut len = self.cdf.len();
        while len > 1 {
            let half = len / 2;
            let middle = first + half;
            if self.cdf[middle] <= u {
                first = middle;
                len -= half;
            } else {
                len = half;
            }
        }
        first.min(self.func.len() - 1)
    }

    /// Samples a continuous offset in [0, 1); returns (offset, pdf, index).
    pub fn sample_continuous(&self, u: Float) -> (Float, Float, usize) {
        let offset = self.find_interval(u);
        let mut du = u - self.cdf[offset];
        let denom = self.cdf[offset + 1] - self.cdf[offset];
        if denom > 0.0 {
            du /= denom;
        }
        let pdf = if self.func_int > 0.0 { self.func[offset] / self.func_int } else { 0.0 };
        ((offset as Float + du) / self.count() as Float, pdf, offset)
    }

    /// Samples a discrete index; returns (index, pdf).
    pub fn sample_discrete(&self, u: Float) -> (usize, Float) {
        let offset = self.find_interval(u);
        (offset, self.discrete_pdf(offset))
    }

    pub fn discrete_pdf(&self, index: usize) -> Float {
        if self.func_int > 0.0 {
            self.func[index] / (self.func_int * self.count() as Float)
        } else {
            1.0 / self.count() as Float
        }
    }

    pub fn pdf_continuous(&self, offset: Float) -> Float {
        let index = ((offset * self.count() as Float) as usize).min(self.count() - 1);
        if self.func_int > 0.0 { self.func[index] / self.func_int } else { 0.0 }
    }
}

/// 2D distribution as a marginal over rows plus a conditional per row.
/// Used for luminance-weighted sampling of environment image maps.
#[derive(Debug, Clone)]
pub struct Distribution2D {
    conditional: Vec<Distribution1D>,
    marginal: Distribution1D,
}

impl Distribution2D {
    pub fn new(func: &[Float], nu: usize, nv: usize) -> Self {
        assert_eq!(func.len(), nu * nv);
        let conditional: Vec<Distribution1D> =
            (0..nv).map(|v| Distribution1D::new(&func[v * nu..(v + 1) * nu])).collect();
        let marginal_func: Vec<Float> = conditional.iter().map(|d| d.func_int).collect();
        let marginal = Distribution1D::new(&marginal_func);
        Self { conditional, marginal }
    }

    pub fn sample_continuous(&self, u0: Float, u1: Float) -> (Point2f, Float) {
        let (d1, pdf1, v) = self.marginal.sample_continuous(u1);
        let (d0, pdf0, _) = self.conditional[v].sample_continuous(u0);
        (Point2f::new(d0, d1), pdf0 * pdf1)
    }

    pub fn pdf(&self, p: Point2f) -> Float {
        let nu = self.conditional[0].count();
        let nv = self.marginal.count();
        let iu = ((p.x * nu as Float) as usize).min(nu - 1);
        let iv = ((p.y * nv as Float) as usize).min(nv - 1);
        if self.marginal.func_int > 0.0 {
            self.conditional[iv].func[iu] / self.marginal.func_int
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::InnerSpace;

    #[test]
    fn test_cosine_sample_hemisphere_is_unit() {
        let v = cosine_sample_hemisphere(Point2f::new(0.3, 0.8));
        approx::assert_abs_diff_eq!(v.magnitude(), 1.0, epsilon = 1e-5);
        assert!(v.z >= 0.0);
    }

    #[test]
    fn test_power_heuristic_partition() {
        let w1 = power_heuristic(1, 0.5, 1, 2.0);
        let w2 = power_heuristic(1, 2.0, 1, 0.5);
        approx::assert_abs_diff_eq!(w1 + w2, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_distribution1d_cdf_monotone() {
        let d = Distribution1D::new(&[1.0, 3.0, 2.0, 0.0, 4.0]);
        assert!(d.cdf.windows(2).all(|w| w[0] <= w[1]));
        approx::assert_abs_diff_eq!(*d.cdf.last().unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_distribution1d_discrete_prefers_weight() {
        let d = Distribution1D::new(&[0.0, 10.0, 0.0]);
        let (idx, pdf) = d.sample_discrete(0.5);
        assert_eq!(idx, 1);
        approx::assert_abs_diff_eq!(pdf, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_distribution1d_inverse_cdf() {
        let d = Distribution1D::new(&[1.0, 1.0, 2.0]);
        // u = cdf boundary lands exactly on element start
        let (offset, pdf, idx) = d.sample_continuous(0.25);
        assert_eq!(idx, 0);
        assert!(pdf > 0.0);
        assert!(offset > 0.0 && offset < 1.0);
    }

    #[test]
    fn test_pdf_w_to_a_round_trip() {
        let pdf_w = 1.7;
        let a = pdf_w_to_a(pdf_w, 3.0, 0.5);
        approx::assert_abs_diff_eq!(pdf_a_to_w(a, 3.0, 0.5), pdf_w, epsilon = 1e-5);
    }
}
