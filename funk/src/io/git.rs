//! Git adapter for the results and target repositories.
//!
//! A small, explicit wrapper around `git` subprocess calls; every command runs
//! in the wrapper's working directory and failures carry git's stderr.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use super::config::FunkConfig;
use super::host::{hostname, now};
use super::paths::FunkPaths;
use crate::core::naming::display_date;

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// True if the working directory is inside a git work tree.
    pub fn is_repo(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Full SHA of HEAD.
    pub fn head_sha(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Checkout an existing branch, commit or tree.
    #[instrument(skip_all, fields(target = reference))]
    pub fn checkout(&self, reference: &str) -> Result<()> {
        debug!("checking out");
        self.run_checked(&["checkout", reference])?;
        Ok(())
    }

    /// Pull from the configured upstream. Returns git's stdout.
    #[instrument(skip_all)]
    pub fn pull(&self) -> Result<String> {
        let out = self.run_capture(&["pull"])?;
        info!(output = %out.trim(), "git pull");
        Ok(out)
    }

    /// Push to the configured upstream.
    #[instrument(skip_all)]
    pub fn push(&self) -> Result<()> {
        self.run_checked(&["push"])?;
        Ok(())
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// True if there are modified, staged or untracked files.
    pub fn is_dirty(&self) -> Result<bool> {
        Ok(!self.status_porcelain()?.is_empty())
    }

    /// Stage everything under `path` (respects .gitignore).
    pub fn add_path(&self, path: &Path) -> Result<()> {
        let arg = path.to_string_lossy();
        self.run_checked(&["add", "-A", "--", arg.as_ref()])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Hashes of the last `n` commits on `branch`, oldest first.
    #[cfg(test)]
    pub fn latest_commits(&self, branch: &str, n: usize) -> Result<Vec<String>> {
        if n == 0 {
            return Err(anyhow!("commit count must be > 0"));
        }
        let count = format!("--max-count={n}");
        let out = self.run_capture(&["rev-list", &count, branch])?;
        let mut commits: Vec<String> = out.lines().map(|line| line.trim().to_string()).collect();
        commits.reverse();
        Ok(commits)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

/// Bring the target repository up to date and return its HEAD.
///
/// Returns `None` when no target repository is configured.
#[instrument(skip_all)]
pub fn prepare_target(paths: &FunkPaths, cfg: &FunkConfig) -> Result<Option<String>> {
    let (Some(target), Some(path)) = (&cfg.target, &paths.target_repo) else {
        debug!("no target repository configured");
        return Ok(None);
    };
    let git = Git::new(path);
    git.checkout(&target.branch)
        .with_context(|| format!("checkout target branch {}", target.branch))?;
    git.pull().context("pull target repository")?;
    let sha = git.head_sha()?;
    info!(commit = %sha, "target repository ready");
    Ok(Some(sha))
}

/// What [`commit_results`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    NoChanges,
    Pushed { message: String },
}

/// Commit everything new in the results repository and push it upstream.
#[instrument(skip_all)]
pub fn commit_results(paths: &FunkPaths, cfg: &FunkConfig) -> Result<CommitOutcome> {
    let git = Git::new(&paths.results_repo);
    git.checkout(&cfg.results_repo.branch)
        .with_context(|| format!("checkout results branch {}", cfg.results_repo.branch))?;
    if !git.is_dirty()? {
        info!("no changes");
        return Ok(CommitOutcome::NoChanges);
    }
    git.pull().context("pull results repository")?;
    git.add_path(Path::new("."))?;
    let message = format!("New results ({} {})", hostname(), display_date(&now()));
    if !git.commit_staged(&message)? {
        info!("no changes");
        return Ok(CommitOutcome::NoChanges);
    }
    git.push().context("push results")?;
    info!(message = %message, "results pushed");
    Ok(CommitOutcome::Pushed { message })
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? results/test1.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "results/test1.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn dirty_commit_and_history() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.path());
        assert!(git.is_repo());
        assert!(!git.is_dirty().expect("status"));

        std::fs::write(repo.path().join("a.txt"), "a").expect("write");
        assert!(git.is_dirty().expect("status"));
        git.add_path(repo.path()).expect("add");
        assert!(git.commit_staged("add a").expect("commit"));
        assert!(!git.commit_staged("nothing").expect("empty commit"));

        let head = git.head_sha().expect("head");
        let latest = git.latest_commits("HEAD", 5).expect("latest");
        assert_eq!(latest.len(), 2);
        assert_eq!(latest.last(), Some(&head));
    }

    fn config_for(repo: &TestRepo) -> FunkConfig {
        let mut cfg = FunkConfig::default();
        cfg.results_repo.branch = repo.branch().expect("branch");
        cfg
    }

    #[test]
    fn commit_results_without_changes_does_nothing() {
        let (repo, _remote) = TestRepo::with_remote().expect("repo");
        let cfg = config_for(&repo);
        let paths = FunkPaths::new(repo.path(), &cfg);
        assert_eq!(
            commit_results(&paths, &cfg).expect("commit"),
            CommitOutcome::NoChanges
        );
    }

    #[test]
    fn commit_results_commits_and_pushes() {
        let (repo, remote) = TestRepo::with_remote().expect("repo");
        let cfg = config_for(&repo);
        let paths = FunkPaths::new(repo.path(), &cfg);
        std::fs::create_dir_all(repo.path().join("results")).expect("mkdir");
        std::fs::write(repo.path().join("results/test1.txt"), "y: 1\n").expect("write");

        let outcome = commit_results(&paths, &cfg).expect("commit");
        let CommitOutcome::Pushed { message } = outcome else {
            panic!("expected a push");
        };
        assert!(message.starts_with("New results ("));

        let git = Git::new(repo.path());
        assert!(!git.is_dirty().expect("status"));
        let remote_head = Git::new(remote.path())
            .latest_commits(&cfg.results_repo.branch, 1)
            .expect("remote log");
        assert_eq!(remote_head, vec![git.head_sha().expect("head")]);
    }

    #[test]
    fn prepare_target_reports_head() {
        let (target, _remote) = TestRepo::with_remote().expect("target");
        let mut cfg = FunkConfig::default();
        cfg.target = Some(crate::io::config::RepoConfig {
            path: target.path().to_path_buf(),
            branch: target.branch().expect("branch"),
        });
        let root = tempfile::tempdir().expect("root");
        let paths = FunkPaths::new(root.path(), &cfg);
        let sha = prepare_target(&paths, &cfg).expect("prepare");
        assert_eq!(sha, Some(Git::new(target.path()).head_sha().expect("head")));

        let untargeted = FunkConfig::default();
        let paths = FunkPaths::new(root.path(), &untargeted);
        assert_eq!(prepare_target(&paths, &untargeted).expect("prepare"), None);
    }
}
