use crate::Float;

pub const MACHINE_EPSILON: f32 = std::f32::EPSILON * 0.5;

pub const fn gamma(n: i32) -> Float {
    let n = n as Float;
    (n * MACHINE_EPSILON) / (1.0 - n * MACHINE_EPSILON)
}

pub fn next_float_up(mut v: f32) -> f32 {
    if v == std::f32::INFINITY { return v; }

    if v == -0.0 { v = 0.0 }

    let bits = v.to_bits();
    let bits = if v >= 0.0 { bits + 1 } else { bits - 1 };
    f32::from_bits(bits)
}

pub fn next_float_down(mut v: f32) -> f32 {
    if v == std::f32::NEG_INFINITY { return v; }

    if v == 0.0 { v = -0.0 }

    let bits = v.to_bits();
    let bits = if v >= 0.0 { bits - 1 } else { bits + 1 };
    f32::from_bits(bits)
}

/// Scale-aware epsilon used to offset ray extents away from surfaces,
/// so that self-intersection tolerance grows with distance from the origin.
pub fn machine_epsilon(value: Float) -> Float {
    const DEFAULT_EPSILON_MIN: Float = 1e-5;
    const DEFAULT_EPSILON_MAX: Float = 1e-1;
    (value.abs() * 1e-4).max(DEFAULT_EPSILON_MIN).min(DEFAULT_EPSILON_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_float() {
        let v = 1.0f32;
        assert!(next_float_up(v) > v);
        assert!(next_float_down(v) < v);
        assert_eq!(next_float_down(next_float_up(v)), v);
    }

    #[test]
    fn test_machine_epsilon_scales() {
        assert!(machine_epsilon(1000.0) > machine_epsilon(1.0));
        assert!(machine_epsilon(0.0) > 0.0);
    }
}
