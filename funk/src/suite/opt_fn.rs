//! Optimisation on the FitzHugh-Nagumo model.

use std::fs;
use std::io::Write;

use anyhow::{Context, Result, bail};

use super::models::{FitzhughNagumo, linspace, sum_of_squares};
use super::optimise::{Boundaries, OptimiserMethod, minimise};
use super::random::{normal, uniform_in};
use super::{FunctionalTest, PlotSpec, RunContext, assert_not_deviated_from};
use crate::io::store::{ResultSet, keys};

const TRUE_PARAMETERS: [f64; 3] = [0.1, 0.5, 3.0];
const SAMPLES: usize = 200;
const END_TIME: f64 = 20.0;
const NOISE_SIGMA: f64 = 0.5;

/// Fits the FitzHugh-Nagumo parameters to noisy data with a chosen method
/// and iteration budget, and records how the best score compares to the
/// score of the true parameters.
pub struct OptimisationFitzhughNagumo {
    method: OptimiserMethod,
    max_iterations: usize,
    name: String,
}

impl OptimisationFitzhughNagumo {
    pub fn new(method: OptimiserMethod, max_iterations: usize) -> Result<Self> {
        if max_iterations == 0 {
            bail!("maximum number of iterations must be > 0");
        }
        Ok(Self {
            method,
            max_iterations,
            name: format!("opt_fn_{method}_{max_iterations}"),
        })
    }
}

impl FunctionalTest for OptimisationFitzhughNagumo {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        ctx.results.set_text(keys::METHOD, &self.method.to_string())?;
        ctx.results
            .set("max_iterations", self.max_iterations as i64)?;

        let model = FitzhughNagumo;
        let times = linspace(0.0, END_TIME, SAMPLES);
        let values = model
            .simulate(&TRUE_PARAMETERS, &times)
            .context("simulate true parameters")?;
        let noisy: Vec<[f64; 2]> = values
            .iter()
            .map(|[v, r]| {
                [
                    normal(&mut ctx.rng, *v, NOISE_SIGMA),
                    normal(&mut ctx.rng, *r, NOISE_SIGMA),
                ]
            })
            .collect();

        let score = |params: &[f64]| match model.simulate(params, &times) {
            Some(simulated) => sum_of_squares(&simulated, &noisy),
            None => f64::INFINITY,
        };
        let ftrue = score(&TRUE_PARAMETERS);

        let bounds = Boundaries::new(vec![0.0; 3], vec![10.0; 3])?;
        let x0 = uniform_in(&mut ctx.rng, &bounds.lower, &bounds.upper);
        let best = minimise(
            self.method,
            score,
            &x0,
            &bounds,
            self.max_iterations,
            &mut ctx.rng,
        );

        let mut log = fs::File::create(&ctx.log_path)
            .with_context(|| format!("create {}", ctx.log_path.display()))?;
        writeln!(log, "method: {}", self.method).context("write log")?;
        writeln!(log, "x0: {x0:?}").context("write log")?;
        writeln!(log, "xbest: {:?}", best.x).context("write log")?;
        writeln!(log, "fbest: {} (ftrue {ftrue})", best.f).context("write log")?;

        ctx.results.set("xbest", best.x)?;
        ctx.results.set("fbest", best.f)?;
        ctx.results.set("fbest_relative", best.f / ftrue)?;
        Ok(())
    }

    fn analyse(&self, results: &ResultSet) -> Result<bool> {
        Ok(assert_not_deviated_from(1.0, 1.0, results, "fbest_relative"))
    }

    fn plots(&self) -> Vec<PlotSpec> {
        vec![PlotSpec::new(
            "fbest_relative",
            &format!(
                "FN optimisation with {} and max iterations {}",
                self.method, self.max_iterations
            ),
        )]
    }
}
