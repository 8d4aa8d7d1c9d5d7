//! Bounded minimisers used by the optimisation tests.

use std::fmt;

use anyhow::{Result, bail};
use rand::Rng;

use super::random::normal_vec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimiserMethod {
    NelderMead,
    /// Separable natural evolution strategy.
    Snes,
}

impl fmt::Display for OptimiserMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NelderMead => f.write_str("NelderMead"),
            Self::Snes => f.write_str("Snes"),
        }
    }
}

/// Rectangular search box.
#[derive(Debug, Clone)]
pub struct Boundaries {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Boundaries {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self> {
        if lower.len() != upper.len() || lower.is_empty() {
            bail!("boundaries need matching, non-empty lower and upper vectors");
        }
        if lower.iter().zip(&upper).any(|(lo, hi)| lo >= hi) {
            bail!("lower boundaries must be below upper boundaries");
        }
        Ok(Self { lower, upper })
    }

    pub fn contains(&self, x: &[f64]) -> bool {
        x.iter()
            .zip(self.lower.iter().zip(&self.upper))
            .all(|(v, (lo, hi))| *v >= *lo && *v <= *hi)
    }

    fn range(&self) -> Vec<f64> {
        self.lower.iter().zip(&self.upper).map(|(lo, hi)| hi - lo).collect()
    }
}

/// Best point found and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub f: f64,
}

/// Minimise `score` inside `bounds` starting from `x0`.
///
/// Points outside the box and non-finite scores count as `+inf`.
pub fn minimise<R, F>(
    method: OptimiserMethod,
    score: F,
    x0: &[f64],
    bounds: &Boundaries,
    max_iterations: usize,
    rng: &mut R,
) -> Minimum
where
    R: Rng + ?Sized,
    F: Fn(&[f64]) -> f64,
{
    let bounded = |x: &[f64]| {
        if !bounds.contains(x) {
            return f64::INFINITY;
        }
        let f = score(x);
        if f.is_nan() { f64::INFINITY } else { f }
    };
    match method {
        OptimiserMethod::NelderMead => nelder_mead(bounded, x0, bounds, max_iterations),
        OptimiserMethod::Snes => snes(bounded, x0, bounds, max_iterations, rng),
    }
}

fn nelder_mead<F: Fn(&[f64]) -> f64>(
    f: F,
    x0: &[f64],
    bounds: &Boundaries,
    max_iterations: usize,
) -> Minimum {
    const REFLECT: f64 = 1.0;
    const EXPAND: f64 = 2.0;
    const CONTRACT: f64 = 0.5;
    const SHRINK: f64 = 0.5;

    let n = x0.len();
    let range = bounds.range();

    // Initial simplex: x0 plus one step of 10% of the box per dimension,
    // stepping inward when the forward step would leave the box.
    let mut simplex: Vec<Vec<f64>> = vec![x0.to_vec()];
    for i in 0..n {
        let mut vertex = x0.to_vec();
        let step = 0.1 * range[i];
        vertex[i] = if vertex[i] + step <= bounds.upper[i] {
            vertex[i] + step
        } else {
            vertex[i] - step
        };
        simplex.push(vertex);
    }
    let mut scores: Vec<f64> = simplex.iter().map(|x| f(x)).collect();

    for _ in 0..max_iterations {
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|a, b| scores[*a].total_cmp(&scores[*b]));
        simplex = order.iter().map(|i| simplex[*i].clone()).collect();
        scores = order.iter().map(|i| scores[*i]).collect();

        let centroid: Vec<f64> = (0..n)
            .map(|d| simplex[..n].iter().map(|x| x[d]).sum::<f64>() / n as f64)
            .collect();
        let toward = |coef: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[n])
                .map(|(c, w)| c + coef * (c - w))
                .collect()
        };

        let reflected = toward(REFLECT);
        let f_reflected = f(&reflected);
        if f_reflected < scores[0] {
            let expanded = toward(EXPAND);
            let f_expanded = f(&expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                scores[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                scores[n] = f_reflected;
            }
            continue;
        }
        if f_reflected < scores[n - 1] {
            simplex[n] = reflected;
            scores[n] = f_reflected;
            continue;
        }

        let contracted = if f_reflected < scores[n] {
            toward(CONTRACT * REFLECT)
        } else {
            toward(-CONTRACT)
        };
        let f_contracted = f(&contracted);
        if f_contracted < scores[n].min(f_reflected) {
            simplex[n] = contracted;
            scores[n] = f_contracted;
            continue;
        }

        let best = simplex[0].clone();
        for i in 1..=n {
            simplex[i] = best
                .iter()
                .zip(&simplex[i])
                .map(|(b, x)| b + SHRINK * (x - b))
                .collect();
            scores[i] = f(&simplex[i]);
        }
    }

    let best = (0..=n)
        .min_by(|a, b| scores[*a].total_cmp(&scores[*b]))
        .unwrap_or(0);
    Minimum {
        x: simplex[best].clone(),
        f: scores[best],
    }
}

fn snes<R, F>(
    f: F,
    x0: &[f64],
    bounds: &Boundaries,
    max_iterations: usize,
    rng: &mut R,
) -> Minimum
where
    R: Rng + ?Sized,
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    let dim = n as f64;
    let population = 4 + (3.0 * dim.ln()).floor() as usize;
    let eta_mu = 1.0;
    let eta_sigma = (3.0 + dim.ln()) / (5.0 * dim.sqrt());

    // Rank-based utilities, best sample first, summing to zero.
    let half = population as f64 / 2.0 + 1.0;
    let raw: Vec<f64> = (1..=population)
        .map(|k| (half.ln() - (k as f64).ln()).max(0.0))
        .collect();
    let total: f64 = raw.iter().sum();
    let utilities: Vec<f64> = raw
        .iter()
        .map(|u| u / total - 1.0 / population as f64)
        .collect();

    let mut mu = x0.to_vec();
    let mut sigma: Vec<f64> = bounds.range().iter().map(|r| r / 6.0).collect();
    let mut best = Minimum {
        x: x0.to_vec(),
        f: f(x0),
    };

    for _ in 0..max_iterations {
        let mut samples: Vec<(Vec<f64>, f64)> = (0..population)
            .map(|_| {
                let s = normal_vec(rng, n);
                let z: Vec<f64> = (0..n).map(|d| mu[d] + sigma[d] * s[d]).collect();
                let fz = f(&z);
                if fz < best.f {
                    best = Minimum { x: z, f: fz };
                }
                (s, fz)
            })
            .collect();
        samples.sort_by(|a, b| a.1.total_cmp(&b.1));

        for d in 0..n {
            let grad_mu: f64 = samples
                .iter()
                .zip(&utilities)
                .map(|((s, _), u)| u * s[d])
                .sum();
            let grad_sigma: f64 = samples
                .iter()
                .zip(&utilities)
                .map(|((s, _), u)| u * (s[d] * s[d] - 1.0))
                .sum();
            mu[d] += eta_mu * sigma[d] * grad_mu;
            sigma[d] *= (0.5 * eta_sigma * grad_sigma).exp();
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|v| (v - 3.0).powi(2)).sum()
    }

    fn unit_box() -> Boundaries {
        Boundaries::new(vec![0.0; 3], vec![10.0; 3]).expect("bounds")
    }

    #[test]
    fn boundaries_reject_inverted_box() {
        assert!(Boundaries::new(vec![1.0], vec![0.0]).is_err());
        assert!(Boundaries::new(vec![], vec![]).is_err());
    }

    #[test]
    fn nelder_mead_finds_sphere_minimum() {
        let mut rng = StdRng::seed_from_u64(3);
        let min = minimise(
            OptimiserMethod::NelderMead,
            sphere,
            &[8.0, 1.0, 5.0],
            &unit_box(),
            300,
            &mut rng,
        );
        assert!(min.f < 1e-6, "f = {}", min.f);
    }

    #[test]
    fn snes_improves_on_start() {
        let mut rng = StdRng::seed_from_u64(11);
        let x0 = [9.0, 9.0, 9.0];
        let min = minimise(
            OptimiserMethod::Snes,
            sphere,
            &x0,
            &unit_box(),
            200,
            &mut rng,
        );
        assert!(min.f < sphere(&x0));
        assert!(min.f < 0.1, "f = {}", min.f);
        assert!(unit_box().contains(&min.x));
    }

    #[test]
    fn outside_box_is_never_best() {
        let mut rng = StdRng::seed_from_u64(5);
        // Unconstrained minimum lies outside the box.
        let min = minimise(
            OptimiserMethod::NelderMead,
            |x: &[f64]| x.iter().map(|v| (v + 5.0).powi(2)).sum(),
            &[5.0, 5.0, 5.0],
            &unit_box(),
            200,
            &mut rng,
        );
        assert!(unit_box().contains(&min.x));
    }

    #[test]
    fn method_names() {
        assert_eq!(OptimiserMethod::NelderMead.to_string(), "NelderMead");
        assert_eq!(OptimiserMethod::Snes.to_string(), "Snes");
    }
}
