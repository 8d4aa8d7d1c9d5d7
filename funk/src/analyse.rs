//! Orchestration for `funk analyse`.

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::schedule::last_run_test;
use crate::harness::Harness;

/// Which tests to analyse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyseTarget {
    Named(String),
    /// The most recently run test.
    Last,
    All,
}

/// Analysis outcome for one test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub name: String,
    pub passed: bool,
}

#[instrument(skip_all, fields(target = ?target))]
pub fn analyse(harness: &Harness, target: &AnalyseTarget) -> Result<Vec<Verdict>> {
    let names = match target {
        AnalyseTarget::Named(name) => vec![name.clone()],
        AnalyseTarget::Last => {
            let last = last_run_test(&harness.last_run_dates()?)
                .ok_or_else(|| anyhow!("no test has been run yet"))?;
            vec![last]
        }
        AnalyseTarget::All => harness.registry.names(),
    };
    names
        .into_iter()
        .map(|name| {
            let passed = analyse_one(harness, &name)?;
            Ok(Verdict { name, passed })
        })
        .collect()
}

/// Load the results of `name` and ask the test whether they pass.
pub fn analyse_one(harness: &Harness, name: &str) -> Result<bool> {
    let test = harness.registry.get(name)?;
    let results = harness.store.load(name)?;
    let passed = test
        .analyse(&results)
        .with_context(|| format!("analyse {name}"))?;
    debug!(test = %name, runs = results.len(), passed, "analysed");
    Ok(passed)
}
