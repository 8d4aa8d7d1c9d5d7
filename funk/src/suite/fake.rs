//! Cheap tests with known answers, used to exercise the harness itself.

use anyhow::Result;
use rand::Rng;

use super::{FunctionalTest, PlotSpec, RunContext, assert_not_deviated_from};
use crate::io::store::{ResultSet, keys, status};

/// Records `y = 1 + U(-0.25, 0.25)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Test1;

impl FunctionalTest for Test1 {
    fn name(&self) -> &str {
        "test1"
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let y = 1.0 + ctx.rng.gen_range(-0.25..0.25);
        ctx.results.set("y", y)
    }

    fn analyse(&self, results: &ResultSet) -> Result<bool> {
        Ok(assert_not_deviated_from(1.0, 0.1, results, "y"))
    }

    fn plots(&self) -> Vec<PlotSpec> {
        vec![PlotSpec::new("y", "Fake test 1")]
    }
}

/// Records nothing of its own; passes while its latest run completed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Test2;

impl FunctionalTest for Test2 {
    fn name(&self) -> &str {
        "test2"
    }

    fn run(&self, _ctx: &mut RunContext<'_>) -> Result<()> {
        Ok(())
    }

    fn analyse(&self, results: &ResultSet) -> Result<bool> {
        let Some(latest) = results.records().last() else {
            return Ok(true);
        };
        Ok(latest.get(keys::STATUS).and_then(|v| v.as_str()) == Some(status::DONE))
    }

    fn plots(&self) -> Vec<PlotSpec> {
        Vec::new()
    }
}
