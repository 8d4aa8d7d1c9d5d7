//! Canonical harness paths for a working directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use super::config::FunkConfig;

/// All harness paths, resolved against the root directory.
#[derive(Debug, Clone)]
pub struct FunkPaths {
    pub root: PathBuf,
    pub results_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub plots_dir: PathBuf,
    pub report_path: PathBuf,
    pub database_path: PathBuf,
    pub results_repo: PathBuf,
    pub target_repo: Option<PathBuf>,
}

impl FunkPaths {
    pub fn new(root: impl Into<PathBuf>, cfg: &FunkConfig) -> Self {
        let root = root.into();
        let results_dir = root.join(&cfg.results_dir);
        Self {
            database_path: results_dir.join(&cfg.database),
            results_dir,
            logs_dir: root.join(&cfg.logs_dir),
            plots_dir: root.join(&cfg.plots_dir),
            report_path: root.join(&cfg.report_path),
            results_repo: root.join(&cfg.results_repo.path),
            target_repo: cfg.target.as_ref().map(|target| root.join(&target.path)),
            root,
        }
    }

    /// Create the results, log and plot directories if they are missing.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.results_dir, &self.logs_dir, &self.plots_dir] {
            if !dir.is_dir() {
                info!(dir = %dir.display(), "creating directory");
                fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
            }
        }
        Ok(())
    }
}

/// Return `path` if nothing exists there, else the first free
/// `<stem>-<n>.<ext>` with `n` counting from 2.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let mut n = 2u32;
    loop {
        let candidate = parent.join(format!("{stem}-{n}{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_against_root() {
        let cfg = FunkConfig::default();
        let paths = FunkPaths::new("/work", &cfg);
        assert_eq!(paths.results_dir, PathBuf::from("/work/results"));
        assert_eq!(paths.database_path, PathBuf::from("/work/results/results.db"));
        assert_eq!(paths.report_path, PathBuf::from("/work/report.md"));
        assert!(paths.target_repo.is_none());
    }

    #[test]
    fn unique_path_counts_from_two() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("test1-2018-01-01-00:00:00.txt");
        assert_eq!(unique_path(&path), path);

        fs::write(&path, "").expect("write");
        let second = unique_path(&path);
        assert_eq!(
            second,
            temp.path().join("test1-2018-01-01-00:00:00-2.txt")
        );

        fs::write(&second, "").expect("write");
        assert_eq!(
            unique_path(&path),
            temp.path().join("test1-2018-01-01-00:00:00-3.txt")
        );
    }
}
