//! Markov chain Monte Carlo samplers used by the sampling tests.

use std::fmt;

use anyhow::{Result, bail};
use rand::Rng;

use super::random::normal_vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerMethod {
    MetropolisRandomWalk,
    /// Metropolis with a proposal covariance adapted from the chain.
    AdaptiveCovariance,
}

impl fmt::Display for SamplerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MetropolisRandomWalk => f.write_str("MetropolisRandomWalk"),
            Self::AdaptiveCovariance => f.write_str("AdaptiveCovariance"),
        }
    }
}

/// Sampler settings shared by all chains.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub iterations: usize,
    /// Iterations before adaptation starts (adaptive sampler only).
    pub initial_phase: usize,
}

/// Decay exponent of the adaptation rate.
const ADAPTATION_DECAY: f64 = 0.6;

/// Run one chain per start point. Each chain has `settings.iterations` rows.
pub fn sample<R, F>(
    method: SamplerMethod,
    log_pdf: F,
    starts: &[Vec<f64>],
    settings: &ChainSettings,
    rng: &mut R,
) -> Result<Vec<Vec<Vec<f64>>>>
where
    R: Rng + ?Sized,
    F: Fn(&[f64]) -> f64,
{
    if starts.is_empty() {
        bail!("at least one chain is required");
    }
    starts
        .iter()
        .map(|x0| run_chain(method, &log_pdf, x0, settings, rng))
        .collect()
}

fn run_chain<R, F>(
    method: SamplerMethod,
    log_pdf: &F,
    x0: &[f64],
    settings: &ChainSettings,
    rng: &mut R,
) -> Result<Vec<Vec<f64>>>
where
    R: Rng + ?Sized,
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    if n == 0 {
        bail!("start point must have at least one dimension");
    }

    // Initial proposal: independent steps of a tenth of the start magnitude.
    let mut covariance = vec![vec![0.0; n]; n];
    for (d, row) in covariance.iter_mut().enumerate() {
        let scale = if x0[d] == 0.0 { 1.0 } else { x0[d].abs() / 10.0 };
        row[d] = scale * scale;
    }
    let mut mean = x0.to_vec();
    let mut log_scale = 0.0f64;

    let mut current = x0.to_vec();
    let mut current_lp = log_pdf(&current);
    let mut chain = Vec::with_capacity(settings.iterations);

    for t in 0..settings.iterations {
        let factor = cholesky(&covariance)?;
        let z = normal_vec(rng, n);
        let step_scale = log_scale.exp();
        let proposal: Vec<f64> = (0..n)
            .map(|i| current[i] + step_scale * (0..=i).map(|j| factor[i][j] * z[j]).sum::<f64>())
            .collect();
        let proposal_lp = log_pdf(&proposal);

        let log_ratio = proposal_lp - current_lp;
        let accepted = proposal_lp.is_finite() && rng.r#gen::<f64>().ln() < log_ratio;
        if accepted {
            current = proposal;
            current_lp = proposal_lp;
        }
        chain.push(current.clone());

        if method == SamplerMethod::AdaptiveCovariance && t >= settings.initial_phase {
            let gamma = ((t - settings.initial_phase + 1) as f64).powf(-ADAPTATION_DECAY);
            let diff: Vec<f64> = (0..n).map(|i| current[i] - mean[i]).collect();
            for i in 0..n {
                mean[i] += gamma * diff[i];
                for j in 0..n {
                    covariance[i][j] += gamma * (diff[i] * diff[j] - covariance[i][j]);
                }
            }
            // Steer towards the usual 23.4% acceptance rate.
            let acceptance = if accepted { 1.0 } else { 0.0 };
            log_scale += gamma * (acceptance - 0.234);
        }
    }
    Ok(chain)
}

/// Lower triangular factor `L` with `L Lᵀ = matrix`, after a small jitter.
fn cholesky(matrix: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    const JITTER: f64 = 1e-10;
    let n = matrix.len();
    let mut factor = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| factor[i][k] * factor[j][k]).sum();
            if i == j {
                let diag = matrix[i][i] + JITTER - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    bail!("proposal covariance is not positive definite");
                }
                factor[i][j] = diag.sqrt();
            } else {
                factor[i][j] = (matrix[i][j] - sum) / factor[j][j];
            }
        }
    }
    Ok(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stats::mean;
    use crate::suite::models::normal_log_pdf;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn cholesky_reconstructs_matrix() {
        let m = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let l = cholesky(&m).expect("factor");
        for i in 0..2 {
            for j in 0..2 {
                let v: f64 = (0..2).map(|k| l[i][k] * l[j][k]).sum();
                assert!((v - m[i][j]).abs() < 1e-8);
            }
        }
        assert!(cholesky(&[vec![-1.0]]).is_err());
    }

    #[test]
    fn samplers_recover_normal_mean() {
        let target = [2.0, 2.0];
        let settings = ChainSettings {
            iterations: 6000,
            initial_phase: 2000,
        };
        for method in [
            SamplerMethod::MetropolisRandomWalk,
            SamplerMethod::AdaptiveCovariance,
        ] {
            let mut rng = StdRng::seed_from_u64(42);
            let chains = sample(
                method,
                |x: &[f64]| normal_log_pdf(&target, x),
                &[vec![1.0, 3.0]],
                &settings,
                &mut rng,
            )
            .expect("sample");
            assert_eq!(chains.len(), 1);
            assert_eq!(chains[0].len(), 6000);
            let kept = &chains[0][2000..];
            for d in 0..2 {
                let column: Vec<f64> = kept.iter().map(|row| row[d]).collect();
                assert!((mean(&column) - 2.0).abs() < 0.5, "{method}: dim {d}");
            }
        }
    }

    #[test]
    fn no_chains_is_an_error() {
        let mut rng = StdRng::seed_from_u64(0);
        let settings = ChainSettings {
            iterations: 10,
            initial_phase: 0,
        };
        assert!(
            sample(
                SamplerMethod::MetropolisRandomWalk,
                |_: &[f64]| 0.0,
                &[],
                &settings,
                &mut rng
            )
            .is_err()
        );
    }
}
