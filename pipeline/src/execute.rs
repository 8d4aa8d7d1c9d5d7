//! Sequential step execution.
//!
//! Steps run strictly in order on the current machine, each waiting for the
//! previous one. A failed step never stops the run: later steps are skipped
//! unless their condition is `always`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use funk::io::git::Git;
use funk::io::process::{CommandLimits, run_command_with_timeout};

use crate::config::ExecuteOptions;
use crate::definition::{Condition, PipelineFile, StepDef};
use crate::outcome::{Outcome, StepStatus, classify_outcome, classify_step};
use crate::results::{new_run_id, run_dir};

/// Name of the pseudo-step recording the source pull.
pub const CHECKOUT_STEP: &str = "checkout";

/// What happened to one step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Bytes written to stderr, including any dropped past the output limit.
    pub stderr_bytes: usize,
    pub duration_secs: f64,
    /// Why the step could not be run at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRecord {
    fn skipped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Skipped,
            exit_code: None,
            timed_out: false,
            stderr_bytes: 0,
            duration_secs: 0.0,
            error: None,
        }
    }

    fn errored(name: &str, err: &anyhow::Error, started: Instant) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Failed,
            exit_code: None,
            timed_out: false,
            stderr_bytes: 0,
            duration_secs: started.elapsed().as_secs_f64(),
            error: Some(format!("{err:#}")),
        }
    }
}

/// A finished pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: String,
    /// Holds the step logs and `meta.json`.
    pub run_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
    pub outcome: Outcome,
}

impl PipelineRun {
    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Run every step of `pipeline` in order.
///
/// Errors only when the run directory cannot be created; step failures are
/// recorded in the returned run.
#[instrument(skip_all, fields(steps = pipeline.steps.len(), pull = options.pull))]
pub fn run_pipeline(pipeline: &PipelineFile, options: &ExecuteOptions) -> Result<PipelineRun> {
    options.validate()?;
    let started_at = Utc::now();
    let run_id = new_run_id(&started_at);
    let run_dir = run_dir(&options.results_dir, &run_id);
    fs::create_dir_all(&run_dir)
        .with_context(|| format!("create run dir {}", run_dir.display()))?;
    info!(run_id = %run_id, "pipeline run started");

    let mut records = Vec::with_capacity(pipeline.steps.len() + 1);
    let mut failed = false;

    if options.pull {
        let record = pull_sources(&pipeline.working_directory, &run_dir);
        failed |= record.status.is_failure();
        records.push(record);
    }

    for step in &pipeline.steps {
        if failed && step.condition == Condition::Succeeded {
            debug!(step = %step.name, "skipping after earlier failure");
            records.push(StepRecord::skipped(&step.name));
            continue;
        }
        let record = run_step(pipeline, step, options, &run_dir);
        failed |= record.status.is_failure();
        records.push(record);
    }

    let outcome = classify_outcome(records.iter().map(|record| record.status));
    let finished_at = Utc::now();
    info!(run_id = %run_id, outcome = ?outcome, "pipeline run finished");
    Ok(PipelineRun {
        run_id,
        run_dir,
        started_at,
        finished_at,
        steps: records,
        outcome,
    })
}

#[instrument(skip_all, fields(step = %step.name))]
fn run_step(
    pipeline: &PipelineFile,
    step: &StepDef,
    options: &ExecuteOptions,
    run_dir: &Path,
) -> StepRecord {
    let started = Instant::now();
    let log_path = step_log_path(run_dir, &step.name);
    let workdir = step.effective_workdir(pipeline);

    let mut cmd = Command::new(&step.command[0]);
    cmd.args(&step.command[1..]).current_dir(workdir);
    let limits = CommandLimits::new(options.step_timeout(step), options.output_limit_bytes)
        .with_tee(&log_path);

    info!(command = ?step.command, workdir = %workdir.display(), "step started");
    let output = match run_command_with_timeout(cmd, &limits)
        .with_context(|| format!("run step {}", step.name))
    {
        Ok(output) => output,
        Err(err) => {
            warn!("step could not run: {err:#}");
            append_log(&log_path, &format!("error: {err:#}"));
            return StepRecord::errored(&step.name, &err, started);
        }
    };

    let exit_code = output.status.code();
    let status = classify_step(
        exit_code,
        output.timed_out,
        output.wrote_stderr(),
        step.fail_on_stderr,
    );
    if status.is_failure() {
        warn!(status = ?status, exit_code = ?exit_code, "step failed");
    } else {
        info!(duration_secs = output.duration.as_secs_f64(), "step succeeded");
    }
    StepRecord {
        name: step.name.clone(),
        status,
        exit_code,
        timed_out: output.timed_out,
        stderr_bytes: output.stderr_bytes(),
        duration_secs: output.duration.as_secs_f64(),
        error: None,
    }
}

fn pull_sources(workdir: &Path, run_dir: &Path) -> StepRecord {
    let started = Instant::now();
    let log_path = step_log_path(run_dir, CHECKOUT_STEP);
    match Git::new(workdir).pull() {
        Ok(out) => {
            append_log(&log_path, out.trim_end());
            StepRecord {
                name: CHECKOUT_STEP.to_string(),
                status: StepStatus::Succeeded,
                exit_code: Some(0),
                timed_out: false,
                stderr_bytes: 0,
                duration_secs: started.elapsed().as_secs_f64(),
                error: None,
            }
        }
        Err(err) => {
            warn!("pull failed: {err:#}");
            append_log(&log_path, &format!("error: {err:#}"));
            StepRecord::errored(CHECKOUT_STEP, &err, started)
        }
    }
}

pub fn step_log_path(run_dir: &Path, step: &str) -> PathBuf {
    run_dir.join(format!("{step}.log"))
}

fn append_log(path: &Path, line: &str) {
    let written = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| writeln!(file, "{line}"));
    if let Err(err) = written {
        warn!(path = %path.display(), "write step log: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use funk::test_support::TestRepo;

    fn step(name: &str, script: &str) -> StepDef {
        StepDef {
            name: name.to_string(),
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            condition: Condition::Succeeded,
            fail_on_stderr: false,
            timeout_minutes: None,
            working_directory: None,
        }
    }

    fn always(mut step: StepDef) -> StepDef {
        step.condition = Condition::Always;
        step
    }

    fn pipeline(workdir: &Path, steps: Vec<StepDef>) -> PipelineFile {
        let mut pipeline = PipelineFile::default_funk();
        pipeline.working_directory = workdir.to_path_buf();
        pipeline.steps = steps;
        pipeline
    }

    fn options(results: &Path) -> ExecuteOptions {
        ExecuteOptions {
            results_dir: results.to_path_buf(),
            ..ExecuteOptions::default()
        }
    }

    fn statuses(run: &PipelineRun) -> Vec<(&str, StepStatus)> {
        run.steps
            .iter()
            .map(|record| (record.name.as_str(), record.status))
            .collect()
    }

    #[test]
    fn runs_steps_in_order_in_working_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let p = pipeline(
            temp.path(),
            vec![
                step("first", "echo one >> order.txt"),
                step("second", "echo two >> order.txt"),
            ],
        );
        let run = run_pipeline(&p, &options(&temp.path().join("runs"))).expect("run");
        assert_eq!(run.outcome, Outcome::Succeeded);
        let order = fs::read_to_string(temp.path().join("order.txt")).expect("order");
        assert_eq!(order, "one\ntwo\n");
        assert!(run.run_dir.starts_with(temp.path().join("runs")));
    }

    #[test]
    fn failure_skips_succeeded_steps_but_not_always_steps() {
        let temp = tempfile::tempdir().expect("tempdir");
        let p = pipeline(
            temp.path(),
            vec![
                step("run", "exit 3"),
                step("analyse", "true"),
                always(step("report", "true")),
                always(step("commit", "exit 1")),
            ],
        );
        let run = run_pipeline(&p, &options(&temp.path().join("runs"))).expect("run");
        assert_eq!(
            statuses(&run),
            vec![
                ("run", StepStatus::Failed),
                ("analyse", StepStatus::Skipped),
                ("report", StepStatus::Succeeded),
                ("commit", StepStatus::Failed),
            ]
        );
        assert_eq!(run.steps[0].exit_code, Some(3));
        assert_eq!(run.outcome, Outcome::Failed);
    }

    #[test]
    fn stderr_fails_step_when_requested() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut analyse = step("analyse", "echo 'analysis failed: test1' >&2");
        analyse.fail_on_stderr = true;
        let p = pipeline(
            temp.path(),
            vec![
                step("noisy", "echo warning >&2"),
                analyse,
                always(step("report", "true")),
            ],
        );
        let run = run_pipeline(&p, &options(&temp.path().join("runs"))).expect("run");
        assert_eq!(
            statuses(&run),
            vec![
                ("noisy", StepStatus::Succeeded),
                ("analyse", StepStatus::Failed),
                ("report", StepStatus::Succeeded),
            ]
        );
        assert_eq!(run.steps[1].exit_code, Some(0));
        assert_eq!(run.steps[1].stderr_bytes, "analysis failed: test1\n".len());
    }

    #[test]
    fn slow_step_times_out() {
        let temp = tempfile::tempdir().expect("tempdir");
        let p = pipeline(
            temp.path(),
            vec![step("run", "exec sleep 5"), step("analyse", "true")],
        );
        let opts = ExecuteOptions {
            default_timeout: Duration::from_millis(200),
            ..options(&temp.path().join("runs"))
        };
        let run = run_pipeline(&p, &opts).expect("run");
        assert_eq!(
            statuses(&run),
            vec![("run", StepStatus::TimedOut), ("analyse", StepStatus::Skipped)]
        );
        assert!(run.steps[0].timed_out);
    }

    #[test]
    fn missing_program_is_recorded_as_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut missing = step("run", "");
        missing.command = vec!["funk-definitely-not-installed".to_string()];
        let p = pipeline(temp.path(), vec![missing, always(step("report", "true"))]);
        let run = run_pipeline(&p, &options(&temp.path().join("runs"))).expect("run");
        assert_eq!(run.steps[0].status, StepStatus::Failed);
        assert!(run.steps[0].error.is_some());
        assert_eq!(run.steps[1].status, StepStatus::Succeeded);
        let log = fs::read_to_string(step_log_path(&run.run_dir, "run")).expect("log");
        assert!(log.contains("error:"));
    }

    #[test]
    fn step_output_is_logged() {
        let temp = tempfile::tempdir().expect("tempdir");
        let p = pipeline(temp.path(), vec![step("report", "echo hello")]);
        let run = run_pipeline(&p, &options(&temp.path().join("runs"))).expect("run");
        let log = fs::read_to_string(step_log_path(&run.run_dir, "report")).expect("log");
        assert!(log.contains("hello"));
    }

    #[test]
    fn pull_is_recorded_as_checkout_step() {
        let (repo, _remote) = TestRepo::with_remote().expect("repo");
        let results = tempfile::tempdir().expect("tempdir");
        let p = pipeline(repo.path(), vec![step("run", "true")]);
        let opts = ExecuteOptions {
            pull: true,
            ..options(results.path())
        };
        let run = run_pipeline(&p, &opts).expect("run");
        assert_eq!(
            statuses(&run),
            vec![(CHECKOUT_STEP, StepStatus::Succeeded), ("run", StepStatus::Succeeded)]
        );
    }

    #[test]
    fn failed_pull_skips_ordinary_steps() {
        let temp = tempfile::tempdir().expect("tempdir");
        let p = pipeline(
            temp.path(),
            vec![step("run", "true"), always(step("report", "true"))],
        );
        let opts = ExecuteOptions {
            pull: true,
            ..options(&temp.path().join("runs"))
        };
        let run = run_pipeline(&p, &opts).expect("run");
        assert_eq!(
            statuses(&run),
            vec![
                (CHECKOUT_STEP, StepStatus::Failed),
                ("run", StepStatus::Skipped),
                ("report", StepStatus::Succeeded),
            ]
        );
        assert_eq!(run.outcome, Outcome::Failed);
    }
}
