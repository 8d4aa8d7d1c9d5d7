//! Result records and the stores that persist them.
//!
//! A [`ResultStore`] keeps one record per test run. Two backends exist: plain
//! results files (one per run, see [`super::result_file`]) and a SQLite table
//! (see [`super::result_db`]). Commands pick one through `funk.toml`.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;

use super::config::{FunkConfig, StoreKind};
use super::paths::FunkPaths;
use super::result_db::SqliteStore;
use super::result_file::FileStore;
use crate::core::value::{ResultValue, is_valid_key};

/// Keys every run records in addition to test-specific results.
pub mod keys {
    pub const STATUS: &str = "status";
    pub const DATE: &str = "date";
    pub const NAME: &str = "name";
    pub const SEED: &str = "seed";
    pub const FUNK_VERSION: &str = "funk_version";
    pub const FUNK_COMMIT: &str = "funk_commit";
    pub const TARGET_COMMIT: &str = "target_commit";
    pub const HOSTNAME: &str = "hostname";
    pub const METHOD: &str = "method";
}

/// Values of the `status` key.
pub mod status {
    pub const UNINITIALISED: &str = "uninitialised";
    pub const DONE: &str = "done";
    pub const FAILED: &str = "failed";
}

/// All results of one test run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub name: String,
    pub date: NaiveDateTime,
    pub values: BTreeMap<String, ResultValue>,
}

impl ResultRecord {
    pub fn get(&self, key: &str) -> Option<&ResultValue> {
        self.values.get(key)
    }
}

/// Collects key/value results for a run before they are persisted.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    record: ResultRecord,
}

impl ResultWriter {
    pub fn new(name: &str, date: NaiveDateTime) -> Self {
        Self {
            record: ResultRecord {
                name: name.to_string(),
                date,
                values: BTreeMap::new(),
            },
        }
    }

    /// Store `value` under `key`, replacing any earlier value.
    pub fn set(&mut self, key: &str, value: impl Into<ResultValue>) -> Result<()> {
        if !is_valid_key(key) {
            bail!("invalid key: {key}");
        }
        self.record.values.insert(key.to_string(), value.into());
        Ok(())
    }

    /// Store a single-line text value.
    pub fn set_text(&mut self, key: &str, value: &str) -> Result<()> {
        let value = ResultValue::text(value).with_context(|| format!("set {key}"))?;
        self.set(key, value)
    }

    pub fn get(&self, key: &str) -> Option<&ResultValue> {
        self.record.get(key)
    }

    pub fn record(&self) -> &ResultRecord {
        &self.record
    }

    pub fn into_record(self) -> ResultRecord {
        self.record
    }
}

/// Every stored run of a single test, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    records: Vec<ResultRecord>,
}

impl ResultSet {
    pub fn new(mut records: Vec<ResultRecord>) -> Self {
        records.sort_by(|left, right| left.date.cmp(&right.date));
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    /// Values of `key` from every record that has it.
    pub fn column(&self, key: &str) -> Vec<&ResultValue> {
        self.records.iter().filter_map(|r| r.get(key)).collect()
    }

    /// Aligned values for `keys`, taken only from records holding all of them.
    pub fn columns(&self, keys: &[&str]) -> Vec<Vec<&ResultValue>> {
        let mut out: Vec<Vec<&ResultValue>> = keys.iter().map(|_| Vec::new()).collect();
        for record in &self.records {
            let row: Option<Vec<&ResultValue>> = keys.iter().map(|k| record.get(k)).collect();
            let Some(row) = row else {
                continue;
            };
            for (column, value) in out.iter_mut().zip(row) {
                column.push(value);
            }
        }
        out
    }

    /// Pair the commit of each run with a numeric result variable.
    ///
    /// Runs whose value is not numeric are dropped.
    pub fn commit_series(&self, variable: &str) -> (Vec<String>, Vec<f64>) {
        let columns = self.columns(&[keys::TARGET_COMMIT, variable]);
        let mut commits = Vec::new();
        let mut values = Vec::new();
        for (commit, value) in columns[0].iter().zip(&columns[1]) {
            let (Some(commit), Some(value)) = (commit.as_str(), value.as_f64()) else {
                continue;
            };
            commits.push(commit.to_string());
            values.push(value);
        }
        (commits, values)
    }
}

/// Persistence backend for result records.
pub trait ResultStore {
    /// Persist a finished record. Returns a human-readable location.
    fn record(&self, record: &ResultRecord) -> Result<String>;

    /// Load every stored run of `test`.
    fn load(&self, test: &str) -> Result<ResultSet>;

    /// Dates of all stored runs, keyed by test name.
    fn run_dates(&self) -> Result<BTreeMap<String, Vec<NaiveDateTime>>>;
}

/// Open the store selected in `cfg`.
pub fn open_store(paths: &FunkPaths, cfg: &FunkConfig) -> Result<Box<dyn ResultStore>> {
    match cfg.store {
        StoreKind::Files => Ok(Box::new(FileStore::new(&paths.results_dir))),
        StoreKind::Sqlite => Ok(Box::new(SqliteStore::open(&paths.database_path)?)),
    }
}
