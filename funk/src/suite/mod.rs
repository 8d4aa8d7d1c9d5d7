//! Functional tests and the registry that names them.
//!
//! A functional test runs one stochastic experiment per invocation and writes
//! its results through the [`RunContext`]. Whether the test passes is decided
//! later, over the accumulated history of runs, by [`FunctionalTest::analyse`].

mod command;
mod fake;
mod mcmc;
mod mcmc_banana;
mod mcmc_normal;
mod models;
mod opt_fn;
mod optimise;
mod random;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use rand::rngs::StdRng;

use crate::core::naming::validate_name;
use crate::core::stats::{gather_statistics_per_commit, not_deviated_from};
use crate::io::config::FunkConfig;
use crate::io::process::CommandLimits;
use crate::io::store::{ResultSet, ResultWriter};

pub use command::CommandTest;
pub use fake::{Test1, Test2};
pub use mcmc::SamplerMethod;
pub use mcmc_banana::McmcBanana;
pub use mcmc_normal::McmcNormal;
pub use opt_fn::OptimisationFitzhughNagumo;
pub use optimise::OptimiserMethod;

/// Everything a test needs while it runs.
pub struct RunContext<'a> {
    pub results: &'a mut ResultWriter,
    /// Seeded from the run's recorded `seed`.
    pub rng: StdRng,
    /// Per-run log file the test may write progress to.
    pub log_path: PathBuf,
}

/// A variable to plot per commit (mean and standard deviation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotSpec {
    pub variable: String,
    pub title: String,
}

impl PlotSpec {
    pub fn new(variable: &str, title: &str) -> Self {
        Self {
            variable: variable.to_string(),
            title: title.to_string(),
        }
    }
}

pub trait FunctionalTest {
    fn name(&self) -> &str;

    /// Run the experiment once, writing results into `ctx.results`.
    fn run(&self, ctx: &mut RunContext<'_>) -> Result<()>;

    /// Decide whether the stored history passes.
    fn analyse(&self, results: &ResultSet) -> Result<bool>;

    /// Variables shown by `funk plot`.
    fn plots(&self) -> Vec<PlotSpec>;
}

/// Check that the per-commit means of `variable` stay within three `sigma`
/// of `expected` over the most recent commits.
pub fn assert_not_deviated_from(
    expected: f64,
    sigma: f64,
    results: &ResultSet,
    variable: &str,
) -> bool {
    let (commits, values) = results.commit_series(variable);
    let stats = gather_statistics_per_commit(&commits, &values);
    not_deviated_from(expected, sigma, &stats.mean)
}

/// All known functional tests, keyed by name.
#[derive(Default)]
pub struct Registry {
    tests: BTreeMap<String, Box<dyn FunctionalTest>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, test: Box<dyn FunctionalTest>) -> Result<()> {
        let name = test.name().to_string();
        validate_name(&name)?;
        if self.tests.contains_key(&name) {
            bail!("duplicate test name: {name}");
        }
        self.tests.insert(name, test);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&dyn FunctionalTest> {
        match self.tests.get(name) {
            Some(test) => Ok(test.as_ref()),
            None => Err(anyhow!(
                "unknown test '{name}', known tests: {}",
                self.names().join(", ")
            )),
        }
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.tests.keys().cloned().collect()
    }

    pub fn tests(&self) -> impl Iterator<Item = &dyn FunctionalTest> {
        self.tests.values().map(|test| test.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

const BANANA_PASS_THRESHOLD: f64 = 0.1;
const BANANA_ITERATIONS: usize = 10_000;

/// Built-in tests plus the command tests declared in `cfg`.
pub fn default_registry(cfg: &FunkConfig) -> Result<Registry> {
    let mut registry = Registry::new();
    registry.add(Box::new(Test1))?;
    registry.add(Box::new(Test2))?;
    for method in [OptimiserMethod::NelderMead, OptimiserMethod::Snes] {
        registry.add(Box::new(OptimisationFitzhughNagumo::new(method, 100)?))?;
    }
    for method in [
        SamplerMethod::MetropolisRandomWalk,
        SamplerMethod::AdaptiveCovariance,
    ] {
        registry.add(Box::new(McmcNormal::new(method, 1)?))?;
        registry.add(Box::new(McmcNormal::sampling(method)))?;
    }
    registry.add(Box::new(McmcBanana::new(
        SamplerMethod::AdaptiveCovariance,
        1,
        BANANA_PASS_THRESHOLD,
        BANANA_ITERATIONS,
    )?))?;
    for test in &cfg.command_tests {
        let timeout = Duration::from_secs(test.timeout_secs.unwrap_or(cfg.command_timeout_secs));
        let limits = CommandLimits::new(timeout, cfg.output_limit_bytes);
        registry.add(Box::new(CommandTest::new(test.clone(), limits)))?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::CommandTestConfig;
    use crate::test_support::{ScriptedTest, record_with};
    use chrono::NaiveDate;

    #[test]
    fn registry_rejects_duplicates_and_bad_names() {
        let mut registry = Registry::new();
        registry
            .add(Box::new(ScriptedTest::passing("alpha", 1.0)))
            .expect("add");
        assert!(
            registry
                .add(Box::new(ScriptedTest::passing("alpha", 2.0)))
                .is_err()
        );
        assert!(
            registry
                .add(Box::new(ScriptedTest::passing("has-dash", 2.0)))
                .is_err()
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_lookup_lists_known_tests() {
        let mut registry = Registry::new();
        registry
            .add(Box::new(ScriptedTest::passing("beta", 1.0)))
            .expect("add");
        registry
            .add(Box::new(ScriptedTest::passing("alpha", 1.0)))
            .expect("add");
        assert_eq!(registry.names(), vec!["alpha", "beta"]);
        let err = registry.get("gamma").err().expect("unknown");
        assert!(err.to_string().contains("alpha, beta"));
    }

    #[test]
    fn default_registry_names() {
        let mut cfg = FunkConfig::default();
        cfg.command_tests.push(CommandTestConfig {
            name: "external".to_string(),
            command: vec!["true".to_string()],
            workdir: None,
            timeout_secs: None,
            variable: "y".to_string(),
            expected: 1.0,
            sigma: 0.1,
        });
        let registry = default_registry(&cfg).expect("registry");
        assert_eq!(
            registry.names(),
            vec![
                "external",
                "mcmc_banana_AdaptiveCovariance_1",
                "mcmc_normal_AdaptiveCovariance_1",
                "mcmc_normal_MetropolisRandomWalk_1",
                "opt_fn_NelderMead_100",
                "opt_fn_Snes_100",
                "sampling_normal_AdaptiveCovariance",
                "sampling_normal_MetropolisRandomWalk",
                "test1",
                "test2",
            ]
        );
    }

    #[test]
    fn deviation_uses_last_three_commits() {
        let date = |day| {
            NaiveDate::from_ymd_opt(2018, 3, day)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        };
        let set = ResultSet::new(vec![
            record_with("t", date(1), "a", 5.0),
            record_with("t", date(2), "b", 1.0),
            record_with("t", date(3), "c", 1.1),
            record_with("t", date(4), "d", 0.9),
        ]);
        assert!(assert_not_deviated_from(1.0, 0.1, &set, "y"));
        assert!(!assert_not_deviated_from(1.0, 0.01, &set, "y"));
        assert!(assert_not_deviated_from(1.0, 0.1, &ResultSet::default(), "y"));
    }
}
