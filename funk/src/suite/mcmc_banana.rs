//! Sampling a twisted Gaussian "banana".

use std::fs;
use std::io::Write;

use anyhow::{Context, Result, anyhow, bail};

use super::mcmc::{ChainSettings, SamplerMethod, sample};
use super::models::TwistedGaussian;
use super::random::normal;
use super::{FunctionalTest, PlotSpec, RunContext, assert_not_deviated_from};
use crate::core::stats::effective_sample_size;
use crate::io::store::{ResultSet, keys};

const TWIST: f64 = 0.1;
/// Variance of the prior the start points are drawn from.
const PRIOR_VARIANCE: f64 = 10.0;
const INITIAL_PHASE: usize = 1000;
/// Rows per chain in each sliding divergence window.
const WINDOW: usize = 500;
const WINDOW_STEP: usize = 20;

/// Runs a sampler on a twisted Gaussian and records the Kullback-Leibler
/// divergence of the samples from the true distribution.
pub struct McmcBanana {
    method: SamplerMethod,
    chains: usize,
    pass_threshold: f64,
    iterations: usize,
    name: String,
}

impl McmcBanana {
    pub fn new(
        method: SamplerMethod,
        chains: usize,
        pass_threshold: f64,
        iterations: usize,
    ) -> Result<Self> {
        if chains == 0 {
            bail!("number of chains must be > 0");
        }
        if iterations < 2 * WINDOW {
            bail!("iterations must be >= {}", 2 * WINDOW);
        }
        if pass_threshold.is_nan() || pass_threshold <= 0.0 {
            bail!("pass threshold must be > 0");
        }
        Ok(Self {
            method,
            chains,
            pass_threshold,
            iterations,
            name: format!("mcmc_banana_{method}_{chains}"),
        })
    }
}

/// Interleave chains row by row, so each prefix holds every chain's
/// progress up to the same iteration.
fn weave(chains: &[Vec<Vec<f64>>]) -> Vec<Vec<f64>> {
    let rows = chains.iter().map(Vec::len).min().unwrap_or(0);
    (0..rows)
        .flat_map(|i| chains.iter().map(move |chain| chain[i].clone()))
        .collect()
}

impl FunctionalTest for McmcBanana {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        ctx.results.set_text(keys::METHOD, &self.method.to_string())?;

        let banana = TwistedGaussian::new(TWIST);
        let prior_sigma = PRIOR_VARIANCE.sqrt();
        let starts: Vec<Vec<f64>> = (0..self.chains)
            .map(|_| (0..2).map(|_| normal(&mut ctx.rng, 0.0, prior_sigma)).collect())
            .collect();
        let settings = ChainSettings {
            iterations: self.iterations,
            initial_phase: INITIAL_PHASE,
        };
        let chains = sample(
            self.method,
            |x: &[f64]| banana.log_pdf(x),
            &starts,
            &settings,
            &mut ctx.rng,
        )?;
        let woven = weave(&chains);

        let window = WINDOW * self.chains;
        let step = WINDOW_STEP * self.chains;
        let mut iters = Vec::new();
        let mut klds = Vec::new();
        // A window where the chain never moved has no divergence; leave it out.
        for start in (0..=woven.len() - window).step_by(step) {
            if let Some(kld) = banana.kl_divergence(&woven[start..start + window]) {
                iters.push(start as i64);
                klds.push(kld);
            }
        }

        let burn_in = self.iterations / 2;
        let kept = &woven[burn_in * self.chains..];
        let kld = banana
            .kl_divergence(kept)
            .ok_or_else(|| anyhow!("degenerate samples after burn-in"))?;

        let mut log = fs::File::create(&ctx.log_path)
            .with_context(|| format!("create {}", ctx.log_path.display()))?;
        writeln!(log, "method: {}", self.method).context("write log")?;
        writeln!(log, "starts: {starts:?}").context("write log")?;
        writeln!(log, "rows without burn-in: {}", kept.len()).context("write log")?;
        writeln!(log, "kld: {kld}").context("write log")?;

        ctx.results.set("iters", iters)?;
        ctx.results.set("klds", klds)?;
        ctx.results.set("kld", kld)?;
        ctx.results.set("ess", effective_sample_size(kept))?;
        Ok(())
    }

    fn analyse(&self, results: &ResultSet) -> Result<bool> {
        Ok(assert_not_deviated_from(
            0.0,
            self.pass_threshold,
            results,
            "kld",
        ))
    }

    fn plots(&self) -> Vec<PlotSpec> {
        let title = format!("Banana with {}", self.method);
        vec![
            PlotSpec::new("kld", &format!("{title}: Kullback-Leibler divergence")),
            PlotSpec::new("ess", &format!("{title}: effective sample size")),
        ]
    }
}
