//! Pipeline definition parsing and validation.
//!
//! Definitions are TOML files listing the steps a CI worker runs, in order,
//! for every push to a trigger branch. See `pipelines/funk.toml`.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde::{Deserialize, Serialize};

const SCHEMA: &str = include_str!("../schemas/pipeline.schema.json");

/// Longest accepted step timeout: one year.
pub const MAX_TIMEOUT_MINUTES: u64 = 525_600;

/// A parsed pipeline definition.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PipelineFile {
    /// Directory every step runs in unless it names its own.
    pub working_directory: PathBuf,
    pub trigger: Trigger,
    pub pool: Pool,
    pub steps: Vec<StepDef>,
}

/// Branches whose pushes start the pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Trigger {
    pub branches: Vec<String>,
}

/// Worker pool the pipeline is scheduled on.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Pool {
    pub name: String,
}

/// When a step runs.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Only if every earlier step that ran succeeded.
    #[default]
    Succeeded,
    /// Regardless of earlier failures.
    Always,
}

/// One step of the pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct StepDef {
    pub name: String,
    /// Program and arguments, run without a shell.
    pub command: Vec<String>,
    #[serde(default)]
    pub condition: Condition,
    /// Treat any stderr output as failure, whatever the exit code.
    #[serde(default)]
    pub fail_on_stderr: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
}

impl StepDef {
    fn new(name: &str, command: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            command: command.iter().map(|arg| arg.to_string()).collect(),
            condition: Condition::Succeeded,
            fail_on_stderr: false,
            timeout_minutes: None,
            working_directory: None,
        }
    }

    /// Directory the step runs in.
    pub fn effective_workdir<'a>(&'a self, pipeline: &'a PipelineFile) -> &'a Path {
        self.working_directory
            .as_deref()
            .unwrap_or(&pipeline.working_directory)
    }

    fn validate(&self) -> Result<()> {
        validate_step_name(&self.name)?;
        if self.command.is_empty() || self.command[0].trim().is_empty() {
            bail!("command must be a non-empty array");
        }
        match self.timeout_minutes {
            Some(0) => bail!("timeout_minutes must be > 0"),
            Some(minutes) if minutes > MAX_TIMEOUT_MINUTES => {
                bail!("timeout_minutes must be <= {MAX_TIMEOUT_MINUTES}")
            }
            _ => {}
        }
        if let Some(dir) = &self.working_directory
            && !dir.is_absolute()
        {
            bail!("working_directory must be absolute: {}", dir.display());
        }
        Ok(())
    }
}

impl PipelineFile {
    /// Load and validate a pipeline definition from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read pipeline {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("load pipeline {}", path.display()))
    }

    /// Parse and validate a definition from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let raw: toml::Value = toml::from_str(contents).context("parse pipeline")?;
        let json = serde_json::to_value(&raw).context("convert pipeline to json")?;
        validate_schema(&json)?;
        let pipeline: PipelineFile =
            serde_json::from_value(json).context("deserialize pipeline")?;
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Write the definition as TOML, refusing to overwrite an existing file.
    pub fn write_new(&self, path: &Path) -> Result<()> {
        if path.exists() {
            bail!("{} already exists", path.display());
        }
        let contents = toml::to_string(self).context("serialize pipeline")?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(path, contents).with_context(|| format!("write pipeline {}", path.display()))?;
        Ok(())
    }

    /// The canonical functional testing pipeline.
    pub fn default_funk() -> Self {
        let mut run = StepDef::new("run", &["funk", "run", "--next", "--plot", "-r", "5"]);
        run.timeout_minutes = Some(115);
        let mut analyse = StepDef::new("analyse", &["funk", "analyse", "--last"]);
        analyse.fail_on_stderr = true;
        let mut report = StepDef::new("report", &["funk", "report"]);
        report.condition = Condition::Always;
        let mut commit = StepDef::new("commit", &["funk", "commit"]);
        commit.condition = Condition::Always;
        Self {
            working_directory: PathBuf::from("/home/funk/functional-testing"),
            trigger: Trigger {
                branches: vec!["master".to_string()],
            },
            pool: Pool {
                name: "functional-testing".to_string(),
            },
            steps: vec![run, analyse, report, commit],
        }
    }

    #[cfg(test)]
    pub fn step(&self, name: &str) -> Option<&StepDef> {
        self.steps.iter().find(|step| step.name == name)
    }

    fn validate(&self) -> Result<()> {
        if self.trigger.branches.is_empty() {
            bail!("trigger.branches must be non-empty");
        }
        if self.trigger.branches.iter().any(|b| b.trim().is_empty()) {
            bail!("trigger.branches must not contain blank names");
        }
        if self.pool.name.trim().is_empty() {
            bail!("pool.name must be non-empty");
        }
        if !self.working_directory.is_absolute() {
            bail!(
                "working_directory must be absolute: {}",
                self.working_directory.display()
            );
        }
        if self.steps.is_empty() {
            bail!("steps must be a non-empty array");
        }
        let mut seen = BTreeSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            step.validate()
                .with_context(|| format!("steps[{}] invalid", index))?;
            if !seen.insert(step.name.as_str()) {
                bail!("duplicate step name {}", step.name);
            }
        }
        Ok(())
    }
}

fn validate_schema(instance: &serde_json::Value) -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA).context("parse pipeline schema")?;
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile pipeline schema")?;
    let errors: Vec<String> = validator
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !errors.is_empty() {
        bail!("schema validation failed:\n- {}", errors.join("\n- "));
    }
    Ok(())
}

fn validate_step_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("step name must be non-empty");
    }
    if !name
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("step name {} must use [a-z0-9_-] only", name);
    }
    Ok(())
}
