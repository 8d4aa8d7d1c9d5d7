//! Harness configuration stored in `funk.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::naming::validate_name;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "funk.toml";

/// Harness configuration (TOML).
///
/// Relative paths are resolved against the directory holding the config file.
/// Missing fields default to the layout used by the CI worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FunkConfig {
    /// Directory for result records (file store) and the database file.
    pub results_dir: PathBuf,

    /// Directory for per-run log files written by tests.
    pub logs_dir: PathBuf,

    /// Directory for generated SVG plots.
    pub plots_dir: PathBuf,

    /// Markdown report written by `funk report`.
    pub report_path: PathBuf,

    /// URL prefix for plot links in the report. Empty means relative links.
    pub plot_url_base: String,

    /// Result persistence backend.
    pub store: StoreKind,

    /// SQLite database file (relative to `results_dir`) for the sqlite store.
    pub database: PathBuf,

    /// Default wall-clock budget for command tests, in seconds.
    pub command_timeout_secs: u64,

    /// Truncate captured command stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    pub results_repo: RepoConfig,

    /// Repository holding the code under test, refreshed before each run.
    pub target: Option<RepoConfig>,

    pub command_tests: Vec<CommandTestConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Files,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RepoConfig {
    pub path: PathBuf,
    pub branch: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("."),
            branch: "master".to_string(),
        }
    }
}

/// A functional test backed by an external command.
///
/// The command prints `key: value` lines on stdout; `variable` names the key
/// that analysis checks against `expected` and `sigma`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandTestConfig {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    pub variable: String,
    pub expected: f64,
    pub sigma: f64,
}

impl Default for FunkConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            logs_dir: PathBuf::from("logs"),
            plots_dir: PathBuf::from("plots"),
            report_path: PathBuf::from("report.md"),
            plot_url_base: String::new(),
            store: StoreKind::Files,
            database: PathBuf::from("results.db"),
            command_timeout_secs: 60 * 60,
            output_limit_bytes: 1_000_000,
            results_repo: RepoConfig::default(),
            target: None,
            command_tests: Vec::new(),
        }
    }
}

impl FunkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.results_repo.branch.trim().is_empty() {
            return Err(anyhow!("results_repo.branch must be non-empty"));
        }
        if let Some(target) = &self.target
            && target.branch.trim().is_empty()
        {
            return Err(anyhow!("target.branch must be non-empty"));
        }
        for (index, test) in self.command_tests.iter().enumerate() {
            test.validate()
                .with_context(|| format!("command_tests[{index}] invalid"))?;
        }
        Ok(())
    }
}

impl CommandTestConfig {
    fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if self.command.is_empty() || self.command[0].trim().is_empty() {
            return Err(anyhow!("command must be a non-empty array"));
        }
        if self.timeout_secs == Some(0) {
            return Err(anyhow!("timeout_secs must be > 0"));
        }
        if self.variable.trim().is_empty() {
            return Err(anyhow!("variable must be non-empty"));
        }
        if !(self.sigma.is_finite() && self.sigma >= 0.0) {
            return Err(anyhow!("sigma must be a finite value >= 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FunkConfig::default()`.
pub fn load_config(path: &Path) -> Result<FunkConfig> {
    if !path.exists() {
        let cfg = FunkConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FunkConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, FunkConfig::default());
    }

    #[test]
    fn serialized_config_loads_back() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("funk.toml");
        let cfg = FunkConfig {
            store: StoreKind::Sqlite,
            target: Some(RepoConfig {
                path: PathBuf::from("../pints"),
                branch: "main".to_string(),
            }),
            command_tests: vec![CommandTestConfig {
                name: "echo_y".to_string(),
                command: vec!["sh".to_string(), "-c".to_string(), "echo y: 1.0".to_string()],
                workdir: None,
                timeout_secs: Some(5),
                variable: "y".to_string(),
                expected: 1.0,
                sigma: 0.1,
            }],
            ..FunkConfig::default()
        };
        let contents = toml::to_string_pretty(&cfg).expect("serialize");
        fs::write(&path, contents).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn parses_partial_file_with_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("funk.toml");
        fs::write(
            &path,
            "store = \"sqlite\"\n\n[results_repo]\nbranch = \"results\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.store, StoreKind::Sqlite);
        assert_eq!(cfg.results_repo.branch, "results");
        assert_eq!(cfg.results_repo.path, PathBuf::from("."));
        assert_eq!(cfg.results_dir, PathBuf::from("results"));
    }

    #[test]
    fn rejects_invalid_command_test() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("funk.toml");
        fs::write(
            &path,
            "[[command_tests]]\nname = \"bad-name\"\ncommand = [\"true\"]\nvariable = \"y\"\nexpected = 1.0\nsigma = 0.1\n",
        )
        .expect("write");
        let err = load_config(&path).expect_err("invalid name");
        assert!(format!("{err:#}").contains("command_tests[0]"));
    }
}
