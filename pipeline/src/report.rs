use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::outcome::{Outcome, StepStatus};
use crate::results::{META_FILE, RunMeta, read_meta};

/// Pass count for one step across runs. Skipped steps do not count as ran.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StepTally {
    pub passed: usize,
    pub ran: usize,
}

#[derive(Debug, Default)]
pub struct ReportSummary {
    pub runs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub avg_duration_secs: Option<f64>,
    pub steps: BTreeMap<String, StepTally>,
}

impl ReportSummary {
    fn from_runs(runs: &[RunMeta]) -> Self {
        let succeeded = runs
            .iter()
            .filter(|meta| meta.outcome == Outcome::Succeeded)
            .count();
        let total_secs: f64 = runs.iter().map(|meta| meta.duration_secs).sum();
        let avg_duration_secs = (!runs.is_empty()).then(|| total_secs / runs.len() as f64);

        let mut steps: BTreeMap<String, StepTally> = BTreeMap::new();
        let ran = runs
            .iter()
            .flat_map(|meta| &meta.steps)
            .filter(|step| step.status != StepStatus::Skipped);
        for step in ran {
            let tally = steps.entry(step.name.clone()).or_default();
            tally.ran += 1;
            tally.passed += usize::from(step.status == StepStatus::Succeeded);
        }

        Self {
            runs: runs.len(),
            succeeded,
            failed: runs.len() - succeeded,
            avg_duration_secs,
            steps,
        }
    }
}

/// Run directories under `results_dir`, sorted by name.
pub fn run_dirs(results_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(results_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read {}", results_dir.display())),
    };
    let mut dirs = entries
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<io::Result<Vec<_>>>()
        .with_context(|| format!("list {}", results_dir.display()))?;
    dirs.retain(|path| path.is_dir());
    dirs.sort();
    Ok(dirs)
}

/// Summarise every readable run; unreadable ones come back as warnings.
pub fn aggregate(results_dir: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let mut runs = Vec::new();
    let mut warnings = Vec::new();
    for run_dir in run_dirs(results_dir)? {
        match read_meta(&run_dir.join(META_FILE)) {
            Ok(meta) => runs.push(meta),
            Err(err) => warnings.push(format!(
                "skip {}: meta.json invalid ({err:#})",
                run_dir.display()
            )),
        }
    }
    Ok((ReportSummary::from_runs(&runs), warnings))
}
