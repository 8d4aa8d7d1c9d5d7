//! Flat-file result store: one `<test>-<date>.txt` results file per run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::debug;

use super::paths::unique_path;
use super::store::{ResultRecord, ResultSet, ResultStore};
use crate::core::naming::{artifact_name, parse_artifact_name};
use crate::core::value::{parse_results, render_results};

const EXTENSION: &str = "txt";

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Results files in the store, with the test and date parsed from their names.
    fn entries(&self) -> Result<Vec<(PathBuf, String, NaiveDateTime)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in
            fs::read_dir(&self.dir).with_context(|| format!("read {}", self.dir.display()))?
        {
            let entry = entry.context("read entry")?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            match parse_artifact_name(&file_name) {
                Some(parsed) => entries.push((path, parsed.test, parsed.date)),
                None => debug!(file = %file_name, "skipping file in results dir"),
            }
        }
        entries.sort();
        Ok(entries)
    }
}

impl ResultStore for FileStore {
    fn record(&self, record: &ResultRecord) -> Result<String> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create results dir {}", self.dir.display()))?;
        let path = unique_path(
            &self
                .dir
                .join(artifact_name(&record.name, &record.date, EXTENSION)),
        );
        fs::write(&path, render_results(&record.values))
            .with_context(|| format!("write result {}", path.display()))?;
        Ok(path.display().to_string())
    }

    fn load(&self, test: &str) -> Result<ResultSet> {
        let mut records = Vec::new();
        for (path, name, date) in self.entries()? {
            if name != test {
                continue;
            }
            records.push(read_record(&path, name, date)?);
        }
        Ok(ResultSet::new(records))
    }

    fn run_dates(&self) -> Result<BTreeMap<String, Vec<NaiveDateTime>>> {
        let mut dates: BTreeMap<String, Vec<NaiveDateTime>> = BTreeMap::new();
        for (_, name, date) in self.entries()? {
            dates.entry(name).or_default().push(date);
        }
        Ok(dates)
    }
}

fn read_record(path: &Path, name: String, date: NaiveDateTime) -> Result<ResultRecord> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read result {}", path.display()))?;
    let parsed = parse_results(&contents);
    for message in &parsed.skipped {
        debug!(file = %path.display(), "{message}");
    }
    Ok(ResultRecord {
        name,
        date,
        values: parsed.values,
    })
}
