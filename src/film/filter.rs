use crate::{Float, Point2f};

/// Reconstruction filter over a rectangular support. Evaluation happens
/// once at film creation to fill the splat LUT, so the per-variant math
/// never runs on the hot path.
#[derive(Debug, Clone, Copy)]
pub enum Filter {
    Box { radius: Float },
    Gaussian { radius: Float, alpha: Float },
    Mitchell { radius: Float, b: Float, c: Float },
}

impl Filter {
    pub fn default_box() -> Self {
        Filter::Box { radius: 0.5 }
    }

    pub fn default_gaussian() -> Self {
        Filter::Gaussian { radius: 2.0, alpha: 2.0 }
    }

    pub fn default_mitchell() -> Self {
        Filter::Mitchell { radius: 2.0, b: 1.0 / 3.0, c: 1.0 / 3.0 }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "BOX" => Some(Self::default_box()),
            "GAUSSIAN" => Some(Self::default_gaussian()),
            "MITCHELL" | "MITCHELL_SS" => Some(Self::default_mitchell()),
            _ => None,
        }
    }

    pub fn radius(&self) -> Float {
        match self {
            Filter::Box { radius } | Filter::Gaussian { radius, .. } | Filter::Mitchell { radius, .. } => {
                *radius
            }
        }
    }

    pub fn evaluate(&self, p: Point2f) -> Float {
        match self {
            Filter::Box { .. } => 1.0,
            Filter::Gaussian { radius, alpha } => {
                let gauss = |d: Float| {
                    let exp_r = (-alpha * radius * radius).exp();
                    ((-alpha * d * d).exp() - exp_r).max(0.0)
                };
                gauss(p.x) * gauss(p.y)
            }
            Filter::Mitchell { radius, b, c } => {
                mitchell_1d(p.x / radius, *b, *c) * mitchell_1d(p.y / radius, *b, *c)
            }
        }
    }
}

fn mitchell_1d(x: Float, b: Float, c: Float) -> Float {
    let x = (2.0 * x).abs();
    if x > 1.0 {
        ((-b - 6.0 * c) * x * x * x
            + (6.0 * b + 30.0 * c) * x * x
            + (-12.0 * b - 48.0 * c) * x
            + (8.0 * b + 24.0 * c))
            * (1.0 / 6.0)
    } else {
        ((12.0 - 9.0 * b - 6.0 * c) * x * x * x
            + (-18.0 + 12.0 * b + 6.0 * c) * x * x
            + (6.0 - 2.0 * b))
            * (1.0 / 6.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_is_flat() {
        let f = Filter::default_box();
        assert_eq!(f.evaluate(Point2f::new(0.0, 0.0)), 1.0);
        assert_eq!(f.evaluate(Point2f::new(0.4, -0.4)), 1.0);
    }

    #[test]
    fn test_gaussian_decays() {
        let f = Filter::default_gaussian();
        let center = f.evaluate(Point2f::new(0.0, 0.0));
        let edge = f.evaluate(Point2f::new(1.5, 0.0));
        assert!(center > edge);
        assert!(edge >= 0.0);
    }

    #[test]
    fn test_mitchell_negative_lobe() {
        let f = Filter::default_mitchell();
        // the Mitchell filter rings slightly negative between 1 and 2
        let v = f.evaluate(Point2f::new(1.4, 0.0));
        assert!(v < 0.0);
    }

    #[test]
    fn test_mitchell_integral_close_to_one() {
        // numeric integral over the support, normalized by the radius
        let f = Filter::default_mitchell();
        let r = f.radius();
        let n = 200;
        let mut sum = 0.0;
        let step = 2.0 * r / n as Float;
        for i in 0..n {
            for j in 0..n {
                let x = -r + (i as Float + 0.5) * step;
                let y = -r + (j as Float + 0.5) * step;
                sum += f.evaluate(Point2f::new(x, y)) * step * step;
            }
        }
        approx::assert_abs_diff_eq!(sum, 1.0, epsilon = 0.02);
    }
}
