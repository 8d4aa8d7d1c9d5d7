//! Orchestration for `funk report`.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::analyse::analyse_one;
use crate::harness::Harness;
use crate::io::host::now;
use crate::io::report::{ReportEntry, latest_plots, plot_link, render_report, write_report};

/// Write the markdown report for every registered test. Returns its path.
#[instrument(skip_all)]
pub fn write_test_report(harness: &Harness) -> Result<PathBuf> {
    let dates = harness.last_run_dates()?;
    let mut entries = Vec::with_capacity(dates.len());
    for (name, last_run) in &dates {
        let passed = match analyse_one(harness, name) {
            Ok(passed) => passed,
            Err(err) => {
                warn!(test = %name, "analysis error: {err:#}");
                false
            }
        };
        let plots = latest_plots(&harness.paths.plots_dir, name)?
            .iter()
            .map(|plot| plot_link(plot, &harness.paths.report_path, &harness.config.plot_url_base))
            .collect();
        entries.push(ReportEntry::new(name, last_run.as_ref(), passed, plots));
    }

    let contents = render_report(&now(), &entries)?;
    write_report(&harness.paths.report_path, &contents)?;
    info!(path = %harness.paths.report_path.display(), tests = entries.len(), "report written");
    Ok(harness.paths.report_path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::FunkConfig;
    use crate::io::store::{ResultSet, ResultWriter};
    use crate::suite::{FunctionalTest, PlotSpec, Registry, RunContext};
    use crate::test_support::ScriptedTest;

    struct Broken;

    impl FunctionalTest for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn run(&self, _ctx: &mut RunContext<'_>) -> Result<()> {
            Ok(())
        }
        fn analyse(&self, _results: &ResultSet) -> Result<bool> {
            Err(anyhow::anyhow!("cannot analyse"))
        }
        fn plots(&self) -> Vec<PlotSpec> {
            Vec::new()
        }
    }

    #[test]
    fn report_lists_every_test_with_status() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut registry = Registry::new();
        registry
            .add(Box::new(ScriptedTest::passing("alpha", 1.0)))
            .expect("add");
        registry.add(Box::new(Broken)).expect("add");
        let h = Harness::with_registry(temp.path(), FunkConfig::default(), registry)
            .expect("harness");

        let mut writer = ResultWriter::new("alpha", crate::io::host::now());
        writer.set("y", 1.0).expect("set");
        h.store.record(writer.record()).expect("record");
        std::fs::create_dir_all(&h.paths.plots_dir).expect("mkdir");
        std::fs::write(h.paths.plots_dir.join("alpha-2018-01-01-00:00:00.svg"), "").expect("plot");

        let path = write_test_report(&h).expect("report");
        let report = std::fs::read_to_string(path).expect("read");
        assert!(report.starts_with("# Functional testing report"));
        assert!(report.contains("| broken | never | FAILED |"));
        assert!(report.contains("| alpha |"));
        assert!(report.contains("](plots/alpha-2018-01-01-00:00:00.svg)"));
    }
}
