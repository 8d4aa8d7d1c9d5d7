//! Orchestration for `funk plot`.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, instrument};

use crate::harness::Harness;
use crate::io::host::now;
use crate::io::plot::{PlotRequest, write_plots};
use crate::suite::FunctionalTest;

/// Regenerate the plots of one test from its stored results.
#[instrument(skip_all, fields(test = test.name()))]
pub fn plot_test(harness: &Harness, test: &dyn FunctionalTest) -> Result<Vec<PathBuf>> {
    let results = harness.store.load(test.name())?;
    let specs = test.plots();
    let requests: Vec<PlotRequest<'_>> = specs
        .iter()
        .map(|spec| PlotRequest {
            variable: &spec.variable,
            title: &spec.title,
        })
        .collect();
    let written = write_plots(
        &harness.paths.plots_dir,
        test.name(),
        &now(),
        &results,
        &requests,
    )?;
    info!(plots = written.len(), runs = results.len(), "plots written");
    Ok(written)
}

/// Plot `name`, or every registered test.
pub fn plot_tests(harness: &Harness, name: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    match name {
        Some(name) => written.extend(plot_test(harness, harness.registry.get(name)?)?),
        None => {
            for test in harness.registry.tests() {
                written.extend(plot_test(harness, test)?);
            }
        }
    }
    Ok(written)
}
