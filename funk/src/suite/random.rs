//! Sampling helpers on top of `rand`.

use std::f64::consts::PI;

use rand::Rng;

/// Standard normal sample (Box-Muller).
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // `gen` yields [0, 1); shift to (0, 1] so the log stays finite.
    let u1: f64 = 1.0 - rng.r#gen::<f64>();
    let u2: f64 = rng.r#gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

pub fn normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, sigma: f64) -> f64 {
    mean + sigma * standard_normal(rng)
}

pub fn normal_vec<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<f64> {
    (0..n).map(|_| standard_normal(rng)).collect()
}

/// Uniform sample from the box `[lower, upper]`.
pub fn uniform_in<R: Rng + ?Sized>(rng: &mut R, lower: &[f64], upper: &[f64]) -> Vec<f64> {
    lower
        .iter()
        .zip(upper)
        .map(|(lo, hi)| rng.gen_range(*lo..=*hi))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stats::{mean, std_dev};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn standard_normal_moments() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples = normal_vec(&mut rng, 20_000);
        assert!(mean(&samples).abs() < 0.05);
        assert!((std_dev(&samples) - 1.0).abs() < 0.05);
        assert!(samples.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn uniform_stays_in_box() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let x = uniform_in(&mut rng, &[0.0, -1.0], &[10.0, 1.0]);
            assert!((0.0..=10.0).contains(&x[0]));
            assert!((-1.0..=1.0).contains(&x[1]));
        }
    }
}
