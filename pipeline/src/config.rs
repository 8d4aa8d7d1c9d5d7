//! Execution settings shared by every step of a run.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};

use crate::definition::StepDef;

pub const DEFAULT_RESULTS_DIR: &str = "pipeline-runs";
pub const DEFAULT_STEP_TIMEOUT_MINUTES: u64 = 60;
pub const DEFAULT_OUTPUT_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Each run writes its logs and `meta.json` under `<results_dir>/<run-id>/`.
    pub results_dir: PathBuf,
    /// Timeout for steps without `timeout_minutes`.
    pub default_timeout: Duration,
    /// Bytes of stdout/stderr kept in memory per stream.
    pub output_limit_bytes: usize,
    /// `git pull` the working directory before the first step.
    pub pull: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from(DEFAULT_RESULTS_DIR),
            default_timeout: minutes(DEFAULT_STEP_TIMEOUT_MINUTES),
            output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            pull: false,
        }
    }
}

impl ExecuteOptions {
    pub fn validate(&self) -> Result<()> {
        if self.results_dir.as_os_str().is_empty() {
            bail!("results_dir must be non-empty");
        }
        if self.default_timeout.is_zero() {
            bail!("default step timeout must be > 0");
        }
        if self.output_limit_bytes == 0 {
            bail!("output_limit_bytes must be > 0");
        }
        Ok(())
    }

    pub fn step_timeout(&self, step: &StepDef) -> Duration {
        step.timeout_minutes
            .map_or(self.default_timeout, minutes)
    }
}

/// Minutes as a duration, saturating instead of overflowing.
pub fn minutes(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}
