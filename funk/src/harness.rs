//! The loaded state every funk command works against.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::debug;

use crate::core::schedule::last_run_dates;
use crate::io::config::{CONFIG_FILE, FunkConfig, load_config};
use crate::io::paths::FunkPaths;
use crate::io::store::{ResultStore, open_store};
use crate::suite::{Registry, default_registry};

/// Config, paths, result store and test registry for one working directory.
pub struct Harness {
    pub config: FunkConfig,
    pub paths: FunkPaths,
    pub store: Box<dyn ResultStore>,
    pub registry: Registry,
}

impl Harness {
    /// Load `config_path` (default `<cwd>/funk.toml`) and register the suite.
    ///
    /// The working directory is the directory holding the config file.
    pub fn open(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => std::env::current_dir()
                .context("read current dir")?
                .join(CONFIG_FILE),
        };
        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from("."));
        let config = load_config(&config_path)?;
        let registry = default_registry(&config)?;
        debug!(root = %root.display(), tests = registry.len(), "harness loaded");
        Self::with_registry(&root, config, registry)
    }

    /// Build a harness around an explicit registry.
    pub fn with_registry(root: &Path, config: FunkConfig, registry: Registry) -> Result<Self> {
        let paths = FunkPaths::new(root, &config);
        let store = open_store(&paths, &config)?;
        Ok(Self {
            config,
            paths,
            store,
            registry,
        })
    }

    /// Last run date of every registered test.
    pub fn last_run_dates(&self) -> Result<BTreeMap<String, Option<NaiveDateTime>>> {
        let recorded = self.store.run_dates()?;
        let names = self.registry.names();
        Ok(last_run_dates(names.iter().map(String::as_str), &recorded))
    }
}
