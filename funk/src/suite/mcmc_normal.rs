//! Sampling a unimodal normal distribution.

use std::fs;
use std::io::Write;

use anyhow::{Context, Result, bail};

use super::mcmc::{ChainSettings, SamplerMethod, sample};
use super::models::normal_log_pdf;
use super::random::normal;
use super::{FunctionalTest, PlotSpec, RunContext, assert_not_deviated_from};
use crate::core::stats::{effective_sample_size, mean, std_dev};
use crate::io::store::{ResultSet, keys};

const TRUE_MEAN: [f64; 2] = [2.0, 2.0];

/// Chain length and start spread of one sampling setup.
#[derive(Debug, Clone, Copy)]
struct Schedule {
    iterations: usize,
    burn_in: usize,
    /// Starts are `TRUE_MEAN * N(0, start_sigma)`.
    start_sigma: f64,
}

const MCMC_SCHEDULE: Schedule = Schedule {
    iterations: 6000,
    burn_in: 2000,
    start_sigma: 1.0,
};

/// Short single-chain run from widely spread starts.
const SAMPLING_SCHEDULE: Schedule = Schedule {
    iterations: 2000,
    burn_in: 1000,
    start_sigma: 3.0,
};

/// Runs a sampler on a 2-D normal and records how far the sample mean of the
/// first chain lands from the true mean.
pub struct McmcNormal {
    method: SamplerMethod,
    chains: usize,
    schedule: Schedule,
    name: String,
}

impl McmcNormal {
    pub fn new(method: SamplerMethod, chains: usize) -> Result<Self> {
        if chains == 0 {
            bail!("number of chains must be > 0");
        }
        Ok(Self {
            method,
            chains,
            schedule: MCMC_SCHEDULE,
            name: format!("mcmc_normal_{method}_{chains}"),
        })
    }

    /// The `sampling_normal_<method>` variant: one short chain.
    pub fn sampling(method: SamplerMethod) -> Self {
        Self {
            method,
            chains: 1,
            schedule: SAMPLING_SCHEDULE,
            name: format!("sampling_normal_{method}"),
        }
    }
}

impl FunctionalTest for McmcNormal {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        ctx.results.set_text(keys::METHOD, &self.method.to_string())?;

        let starts: Vec<Vec<f64>> = (0..self.chains)
            .map(|_| {
                TRUE_MEAN
                    .iter()
                    .map(|m| m * normal(&mut ctx.rng, 0.0, self.schedule.start_sigma))
                    .collect()
            })
            .collect();
        let settings = ChainSettings {
            iterations: self.schedule.iterations,
            initial_phase: self.schedule.burn_in,
        };
        let chains = sample(
            self.method,
            |x: &[f64]| normal_log_pdf(&TRUE_MEAN, x),
            &starts,
            &settings,
            &mut ctx.rng,
        )?;

        // Only the first chain is judged.
        let chain = &chains[0][self.schedule.burn_in..];
        let p0: Vec<f64> = chain.iter().map(|row| row[0]).collect();
        let p1: Vec<f64> = chain.iter().map(|row| row[1]).collect();
        let sample_mean = [mean(&p0), mean(&p1)];
        let distance = TRUE_MEAN
            .iter()
            .zip(&sample_mean)
            .map(|(t, m)| (t - m).powi(2))
            .sum::<f64>()
            .sqrt();

        let mut log = fs::File::create(&ctx.log_path)
            .with_context(|| format!("create {}", ctx.log_path.display()))?;
        writeln!(log, "method: {}", self.method).context("write log")?;
        writeln!(log, "starts: {starts:?}").context("write log")?;
        writeln!(log, "chain rows without burn-in: {}", chain.len()).context("write log")?;
        writeln!(log, "chain mean: {sample_mean:?}").context("write log")?;

        ctx.results.set("true", TRUE_MEAN.to_vec())?;
        ctx.results.set("mean_p0", sample_mean[0])?;
        ctx.results.set("mean_p1", sample_mean[1])?;
        ctx.results.set("std_p0", std_dev(&p0))?;
        ctx.results.set("std_p1", std_dev(&p1))?;
        ctx.results.set("distance", distance)?;
        ctx.results.set("ess", effective_sample_size(chain))?;
        Ok(())
    }

    fn analyse(&self, results: &ResultSet) -> Result<bool> {
        Ok(assert_not_deviated_from(1.0, 1.0, results, "distance"))
    }

    fn plots(&self) -> Vec<PlotSpec> {
        let title = format!("Normal log-pdf with {}", self.method);
        vec![
            PlotSpec::new("distance", &format!("{title}: distance from mean to true")),
            PlotSpec::new("ess", &format!("{title}: effective sample size")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::store::ResultWriter;
    use chrono::NaiveDate;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn rejects_zero_chains() {
        assert!(McmcNormal::new(SamplerMethod::AdaptiveCovariance, 0).is_err());
    }

    #[test]
    fn records_sampling_summary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let test = McmcNormal::new(SamplerMethod::AdaptiveCovariance, 2).expect("test");
        assert_eq!(test.name(), "mcmc_normal_AdaptiveCovariance_2");

        let date = NaiveDate::from_ymd_opt(2018, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut writer = ResultWriter::new(test.name(), date);
        let mut ctx = RunContext {
            results: &mut writer,
            rng: StdRng::seed_from_u64(4),
            log_path: temp.path().join("mcmc.log"),
        };
        test.run(&mut ctx).expect("run");

        let distance = writer
            .get("distance")
            .and_then(|v| v.as_f64())
            .expect("distance");
        assert!(distance < 1.0, "distance = {distance}");
        match writer.get("ess") {
            Some(crate::core::value::ResultValue::FloatArray(ess)) => assert_eq!(ess.len(), 2),
            other => panic!("unexpected ess: {other:?}"),
        }
    }

    #[test]
    fn sampling_variant_runs_one_short_chain() {
        let temp = tempfile::tempdir().expect("tempdir");
        let test = McmcNormal::sampling(SamplerMethod::MetropolisRandomWalk);
        assert_eq!(test.name(), "sampling_normal_MetropolisRandomWalk");

        let date = NaiveDate::from_ymd_opt(2018, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut writer = ResultWriter::new(test.name(), date);
        let mut ctx = RunContext {
            results: &mut writer,
            rng: StdRng::seed_from_u64(5),
            log_path: temp.path().join("sampling.log"),
        };
        test.run(&mut ctx).expect("run");

        let log = fs::read_to_string(temp.path().join("sampling.log")).expect("log");
        assert!(log.contains("chain rows without burn-in: 1000"));
        assert!(writer.get("distance").and_then(|v| v.as_f64()).is_some());
        assert_eq!(
            writer.get(keys::METHOD).and_then(|v| v.as_str()),
            Some("MetropolisRandomWalk")
        );
    }
}
