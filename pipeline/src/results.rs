//! Run capture and persistence.
//!
//! Every pipeline run writes `meta.json` next to its step logs so runs can
//! be aggregated later.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use funk::io::git::Git;

use crate::execute::{PipelineRun, StepRecord};
use crate::outcome::Outcome;

pub const META_FILE: &str = "meta.json";

/// Metadata for a pipeline run, persisted to `meta.json`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RunMeta {
    pub run_id: String,
    pub pipeline: String,
    /// SHA-256 of the definition file, to tell edited pipelines apart.
    pub pipeline_hash: String,
    /// HEAD of the working directory, when it is a git repository.
    pub git_sha: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    pub steps: Vec<StepRecord>,
    pub outcome: Outcome,
    /// Non-fatal errors encountered during capture.
    pub errors: Vec<String>,
}

/// `run-YYYYMMDD_HHMMSS-xxxx`, unique enough for runs started in the same second.
pub fn new_run_id(started_at: &DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(char::from)
        .collect();
    format!("run-{}-{}", started_at.format("%Y%m%d_%H%M%S"), suffix)
}

pub fn run_dir(base_dir: &Path, run_id: &str) -> PathBuf {
    base_dir.join(run_id)
}

/// Write `meta.json` for a finished run and return its path.
#[instrument(skip_all, fields(run_id = %run.run_id))]
pub fn capture_run(run: &PipelineRun, pipeline_path: &Path, workdir: &Path) -> Result<PathBuf> {
    let mut errors = Vec::new();

    let pipeline_hash = match file_sha256(pipeline_path) {
        Ok(hash) => hash,
        Err(err) => {
            errors.push(format!("pipeline hash: {err:#}"));
            String::new()
        }
    };

    let git = Git::new(workdir);
    let git_sha = if git.is_repo() {
        match git.head_sha() {
            Ok(sha) => Some(sha),
            Err(err) => {
                errors.push(format!("git sha: {err:#}"));
                None
            }
        }
    } else {
        None
    };

    if !errors.is_empty() {
        warn!(errors = ?errors, "run capture had errors");
    }

    let meta = RunMeta {
        run_id: run.run_id.clone(),
        pipeline: pipeline_path.display().to_string(),
        pipeline_hash,
        git_sha,
        start_time: run.started_at.to_rfc3339(),
        end_time: run.finished_at.to_rfc3339(),
        duration_secs: run.duration_secs(),
        steps: run.steps.clone(),
        outcome: run.outcome,
        errors,
    };
    let path = run.run_dir.join(META_FILE);
    write_meta(&path, &meta)?;
    debug!(path = %path.display(), "run captured");
    Ok(path)
}

pub fn read_meta(path: &Path) -> Result<RunMeta> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

pub fn write_meta(path: &Path, meta: &RunMeta) -> Result<()> {
    let contents = serde_json::to_string_pretty(meta).context("serialize meta")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write meta {}", path.display()))?;
    Ok(())
}

fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    Ok(hex::encode(hasher.finalize()))
}
