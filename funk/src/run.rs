//! Orchestration for `funk run`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, instrument, warn};

use crate::core::naming::{artifact_name, format_date};
use crate::core::schedule::next_test;
use crate::harness::Harness;
use crate::io::git::{Git, prepare_target};
use crate::io::host::{hostname, now};
use crate::io::paths::unique_path;
use crate::io::store::{ResultWriter, keys, status};
use crate::plot::plot_test;
use crate::suite::{FunctionalTest, RunContext};

/// Which tests `funk run` runs, and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub name: Option<String>,
    /// Re-select the least recently run test before each repetition.
    pub next: bool,
    pub plot: bool,
    pub repeats: u32,
}

/// One finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub name: String,
    /// Where the record was stored.
    pub location: String,
}

/// Run tests as requested in `options`.
///
/// Stops at the first failing run; its record is still stored.
#[instrument(skip_all, fields(next = options.next, repeats = options.repeats))]
pub fn run_tests(harness: &Harness, options: &RunOptions) -> Result<Vec<RunOutcome>> {
    if options.next == options.name.is_some() {
        bail!("give either a test name or --next");
    }
    if options.repeats == 0 {
        bail!("repeats must be > 0");
    }
    if let Some(name) = &options.name {
        harness.registry.get(name)?;
    }

    harness.paths.ensure_dirs()?;
    let target_commit = match prepare_target(&harness.paths, &harness.config)? {
        Some(sha) => sha,
        None => root_commit(harness),
    };
    let funk_commit = root_commit(harness);

    let mut outcomes = Vec::new();
    for repeat in 1..=options.repeats {
        let name = match &options.name {
            Some(name) => name.clone(),
            None => next_test(&harness.last_run_dates()?)?,
        };
        info!(test = %name, repeat, "running test");
        let test = harness.registry.get(&name)?;
        let location = run_test(harness, test, &funk_commit, &target_commit)?;
        outcomes.push(RunOutcome { name, location });
    }

    if options.plot {
        let mut plotted: Vec<&str> = Vec::new();
        for outcome in &outcomes {
            if plotted.contains(&outcome.name.as_str()) {
                continue;
            }
            plotted.push(&outcome.name);
            let test = harness.registry.get(&outcome.name)?;
            plot_test(harness, test)?;
        }
    }
    Ok(outcomes)
}

/// Run `test` once and store its record, whether or not the run succeeds.
pub fn run_test(
    harness: &Harness,
    test: &dyn FunctionalTest,
    funk_commit: &str,
    target_commit: &str,
) -> Result<String> {
    let name = test.name();
    let date = now();
    let seed: u32 = rand::random();

    let mut writer = ResultWriter::new(name, date);
    writer.set_text(keys::STATUS, status::UNINITIALISED)?;
    writer.set_text(keys::DATE, &format_date(&date))?;
    writer.set_text(keys::NAME, name)?;
    writer.set(keys::SEED, seed)?;
    writer.set_text(keys::FUNK_VERSION, env!("CARGO_PKG_VERSION"))?;
    writer.set_text(keys::FUNK_COMMIT, funk_commit)?;
    writer.set_text(keys::TARGET_COMMIT, target_commit)?;
    writer.set_text(keys::HOSTNAME, &hostname())?;

    let log_path = log_path(harness, name, &date);
    let outcome = {
        let mut ctx = RunContext {
            results: &mut writer,
            rng: StdRng::seed_from_u64(u64::from(seed)),
            log_path,
        };
        test.run(&mut ctx)
    };
    let run_status = if outcome.is_ok() {
        status::DONE
    } else {
        status::FAILED
    };
    writer.set_text(keys::STATUS, run_status)?;

    let stored = harness.store.record(writer.record());
    if let Err(err) = outcome {
        if let Err(store_err) = &stored {
            warn!(test = %name, "failed to store record of failed run: {store_err:#}");
        }
        return Err(err.context(format!("run {name}")));
    }
    let location = stored.with_context(|| format!("store results of {name}"))?;
    info!(test = %name, location = %location, "results stored");
    Ok(location)
}

fn log_path(harness: &Harness, name: &str, date: &chrono::NaiveDateTime) -> PathBuf {
    unique_path(&harness.paths.logs_dir.join(artifact_name(name, date, "txt")))
}

/// HEAD of the working directory's repository, or `unknown`.
fn root_commit(harness: &Harness) -> String {
    let git = Git::new(&harness.paths.root);
    if !git.is_repo() {
        return "unknown".to_string();
    }
    git.head_sha().unwrap_or_else(|err| {
        warn!("unable to read HEAD: {err:#}");
        "unknown".to_string()
    })
}
