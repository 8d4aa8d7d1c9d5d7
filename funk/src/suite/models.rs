//! Toy models the built-in tests fit and sample.

/// Initial state `[V, R]` of the FitzHugh-Nagumo simulation.
const FN_INITIAL: [f64; 2] = [-1.0, 1.0];

/// Integration steps per output interval.
const FN_SUBSTEPS: usize = 10;

/// FitzHugh-Nagumo neuron model with parameters `[a, b, c]`:
///
/// ```text
/// dV/dt = (V - V^3 / 3 + R) c
/// dR/dt = -(V - a + b R) / c
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FitzhughNagumo;

impl FitzhughNagumo {
    pub const N_PARAMETERS: usize = 3;

    fn derivative(params: &[f64], state: [f64; 2]) -> [f64; 2] {
        let (a, b, c) = (params[0], params[1], params[2]);
        let [v, r] = state;
        [(v - v.powi(3) / 3.0 + r) * c, -(v - a + b * r) / c]
    }

    fn rk4_step(params: &[f64], state: [f64; 2], dt: f64) -> [f64; 2] {
        let add = |s: [f64; 2], k: [f64; 2], h: f64| [s[0] + h * k[0], s[1] + h * k[1]];
        let k1 = Self::derivative(params, state);
        let k2 = Self::derivative(params, add(state, k1, dt / 2.0));
        let k3 = Self::derivative(params, add(state, k2, dt / 2.0));
        let k4 = Self::derivative(params, add(state, k3, dt));
        [
            state[0] + dt / 6.0 * (k1[0] + 2.0 * k2[0] + 2.0 * k3[0] + k4[0]),
            state[1] + dt / 6.0 * (k1[1] + 2.0 * k2[1] + 2.0 * k3[1] + k4[1]),
        ]
    }

    /// Simulate at increasing `times` (starting at 0). Returns `None` if the
    /// trajectory leaves the finite range.
    pub fn simulate(&self, params: &[f64], times: &[f64]) -> Option<Vec<[f64; 2]>> {
        let mut state = FN_INITIAL;
        let mut t = 0.0;
        let mut out = Vec::with_capacity(times.len());
        for &target in times {
            let dt = (target - t) / FN_SUBSTEPS as f64;
            if dt > 0.0 {
                for _ in 0..FN_SUBSTEPS {
                    state = Self::rk4_step(params, state, dt);
                }
            }
            if !(state[0].is_finite() && state[1].is_finite()) {
                return None;
            }
            t = target;
            out.push(state);
        }
        Some(out)
    }
}

/// `n` evenly spaced points on `[start, end]`.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Sum of squared differences between a simulation and observed values.
pub fn sum_of_squares(simulated: &[[f64; 2]], observed: &[[f64; 2]]) -> f64 {
    simulated
        .iter()
        .zip(observed)
        .map(|(s, o)| (s[0] - o[0]).powi(2) + (s[1] - o[1]).powi(2))
        .sum()
}

/// Log density of an isotropic unit-variance normal centred at `mean`.
pub fn normal_log_pdf(mean: &[f64], x: &[f64]) -> f64 {
    let d = mean.len() as f64;
    let sq: f64 = mean.iter().zip(x).map(|(m, v)| (v - m).powi(2)).sum();
    -0.5 * d * (2.0 * std::f64::consts::PI).ln() - 0.5 * sq
}

/// Two-dimensional normal bent into a banana by `x1 += b * (x0^2 - v)`,
/// with variance `v` along `x0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwistedGaussian {
    pub b: f64,
    pub v: f64,
}

impl TwistedGaussian {
    pub fn new(b: f64) -> Self {
        Self { b, v: 100.0 }
    }

    /// Map a point back onto the untwisted standard normal.
    fn untwist(&self, x: &[f64]) -> [f64; 2] {
        [x[0] / self.v.sqrt(), x[1] + self.b * (x[0] * x[0] - self.v)]
    }

    pub fn log_pdf(&self, x: &[f64]) -> f64 {
        normal_log_pdf(&[0.0, 0.0], &self.untwist(x))
    }

    /// Kullback-Leibler divergence from a normal fitted to the untwisted
    /// `samples` to the standard normal. Needs at least three samples.
    pub fn kl_divergence(&self, samples: &[Vec<f64>]) -> Option<f64> {
        if samples.len() < 3 {
            return None;
        }
        let y: Vec<[f64; 2]> = samples.iter().map(|x| self.untwist(x)).collect();
        let n = y.len() as f64;
        let m = [
            y.iter().map(|p| p[0]).sum::<f64>() / n,
            y.iter().map(|p| p[1]).sum::<f64>() / n,
        ];
        let (mut s00, mut s01, mut s11) = (0.0, 0.0, 0.0);
        for p in &y {
            let (d0, d1) = (p[0] - m[0], p[1] - m[1]);
            s00 += d0 * d0;
            s01 += d0 * d1;
            s11 += d1 * d1;
        }
        let (s00, s01, s11) = (s00 / (n - 1.0), s01 / (n - 1.0), s11 / (n - 1.0));
        let det = s00 * s11 - s01 * s01;
        if det <= 0.0 {
            return None;
        }
        let mean_sq = m[0] * m[0] + m[1] * m[1];
        Some(0.5 * (s00 + s11 + mean_sq - 2.0 - det.ln()))
    }

    /// Exact draw, by twisting a standard normal sample.
    #[cfg(test)]
    pub fn draw<R: rand::Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        let z0 = super::random::standard_normal(rng);
        let z1 = super::random::standard_normal(rng);
        let x0 = z0 * self.v.sqrt();
        vec![x0, z1 - self.b * (x0 * x0 - self.v)]
    }
}
