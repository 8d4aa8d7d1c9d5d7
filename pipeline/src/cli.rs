//! CLI command implementations.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::ExecuteOptions;
use crate::definition::{Condition, PipelineFile};
use crate::execute::run_pipeline;
use crate::outcome::Outcome;
use crate::report::{aggregate, run_dirs};
use crate::results::capture_run;

/// Run a pipeline definition once and record the run.
pub fn run_pipeline_file(pipeline_path: &Path, options: &ExecuteOptions) -> Result<Outcome> {
    let pipeline = PipelineFile::load(pipeline_path)?;
    debug!(steps = pipeline.steps.len(), "pipeline loaded");

    let run = run_pipeline(&pipeline, options).context("run pipeline")?;
    capture_run(&run, pipeline_path, &pipeline.working_directory).context("capture run")?;
    for step in &run.steps {
        println!(
            "step: name={} status={:?} exit_code={} duration_secs={:.2}",
            step.name,
            step.status,
            step.exit_code
                .map_or_else(|| "-".to_string(), |code| code.to_string()),
            step.duration_secs
        );
    }
    println!(
        "run: id={} outcome={:?} results={}",
        run.run_id,
        run.outcome,
        run.run_dir.display()
    );
    Ok(run.outcome)
}

/// Validate a definition and print its steps.
pub fn validate_pipeline(pipeline_path: &Path) -> Result<()> {
    let pipeline = PipelineFile::load(pipeline_path)?;
    println!(
        "valid: pipeline={} branches={} pool={}",
        pipeline_path.display(),
        pipeline.trigger.branches.join(","),
        pipeline.pool.name
    );
    for step in &pipeline.steps {
        let condition = match step.condition {
            Condition::Succeeded => "succeeded",
            Condition::Always => "always",
        };
        let timeout = step
            .timeout_minutes
            .map_or_else(|| "default".to_string(), |minutes| format!("{minutes}m"));
        println!(
            "step: name={} condition={} fail_on_stderr={} timeout={} workdir={} command={}",
            step.name,
            condition,
            step.fail_on_stderr,
            timeout,
            step.effective_workdir(&pipeline).display(),
            step.command.join(" ")
        );
    }
    Ok(())
}

/// Write the canonical functional testing pipeline to `path`.
pub fn init_pipeline(path: &Path) -> Result<()> {
    PipelineFile::default_funk().write_new(path)?;
    println!("init: pipeline={}", path.display());
    Ok(())
}

/// Show aggregated results of stored runs.
pub fn report_runs(results_dir: &Path) -> Result<()> {
    let (summary, warnings) = aggregate(results_dir)?;
    println!("report: runs={}", summary.runs);
    println!(
        "report: succeeded={} failed={}",
        summary.succeeded, summary.failed
    );
    if let Some(avg) = summary.avg_duration_secs {
        println!("report: avg_duration_secs={:.2}", avg);
    }
    for (step, tally) in &summary.steps {
        println!("report: step {} {}/{}", step, tally.passed, tally.ran);
    }
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

/// Remove stored runs.
pub fn clean_runs(results_dir: &Path) -> Result<()> {
    let runs = run_dirs(results_dir)?;
    for run_dir in &runs {
        fs::remove_dir_all(run_dir).with_context(|| format!("remove {}", run_dir.display()))?;
    }
    info!(removed = runs.len(), "runs removed");
    println!(
        "clean: results={} removed={}",
        results_dir.display(),
        runs.len()
    );
    Ok(())
}
