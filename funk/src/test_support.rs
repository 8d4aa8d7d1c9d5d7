//! Test-only helpers: scratch git repositories and scripted functional tests.

use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use tempfile::TempDir;

use crate::io::store::{ResultRecord, ResultSet, ResultWriter, keys};
use crate::suite::{FunctionalTest, PlotSpec, RunContext};

/// A throwaway git repository with one initial commit.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp dir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q"])?;
        repo.git(&["config", "user.email", "funk@example.com"])?;
        repo.git(&["config", "user.name", "funk"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        fs::write(repo.path().join(".gitkeep"), "").context("write .gitkeep")?;
        repo.git(&["add", "-A"])?;
        repo.git(&["commit", "-q", "-m", "initial"])?;
        Ok(repo)
    }

    /// A repository whose branch tracks a bare `origin`, so pull and push work.
    ///
    /// The bare remote is returned alongside and must outlive the repository.
    pub fn with_remote() -> Result<(Self, TempDir)> {
        let remote = tempfile::tempdir().context("create remote dir")?;
        let status = Command::new("git")
            .args(["init", "-q", "--bare"])
            .current_dir(remote.path())
            .status()
            .context("spawn git init --bare")?;
        if !status.success() {
            return Err(anyhow!("git init --bare failed"));
        }
        let repo = Self::new()?;
        let url = remote.path().to_string_lossy().to_string();
        repo.git(&["remote", "add", "origin", &url])?;
        repo.git(&["push", "-q", "-u", "origin", "HEAD"])?;
        Ok((repo, remote))
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Run git in the repository, failing on a non-zero exit.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Name of the branch checked out after `git init`.
    pub fn branch(&self) -> Result<String> {
        Ok(self
            .git(&["rev-parse", "--abbrev-ref", "HEAD"])?
            .trim()
            .to_string())
    }
}

/// A functional test whose run result and analysis verdict are fixed.
pub struct ScriptedTest {
    pub name: String,
    pub value: f64,
    pub fail_run: bool,
    pub passes: bool,
}

impl ScriptedTest {
    pub fn passing(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            fail_run: false,
            passes: true,
        }
    }
}

impl FunctionalTest for ScriptedTest {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        ctx.results.set("y", self.value)?;
        if self.fail_run {
            return Err(anyhow!("scripted failure"));
        }
        Ok(())
    }

    fn analyse(&self, _results: &ResultSet) -> Result<bool> {
        Ok(self.passes)
    }

    fn plots(&self) -> Vec<PlotSpec> {
        vec![PlotSpec::new("y", "Scripted value")]
    }
}

/// A stored record for `name` with a commit and a single `y` value.
pub fn record_with(name: &str, date: NaiveDateTime, commit: &str, y: f64) -> ResultRecord {
    let mut writer = ResultWriter::new(name, date);
    writer
        .set_text(keys::TARGET_COMMIT, commit)
        .expect("valid commit text");
    writer.set("y", y).expect("valid key");
    writer.set_text(keys::STATUS, "done").expect("valid status");
    writer.into_record()
}
