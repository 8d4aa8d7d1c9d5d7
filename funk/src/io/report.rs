//! Markdown report rendering.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::naming::{display_date, parse_artifact_name};

const REPORT_TEMPLATE: &str = include_str!("templates/report.md");

/// One row of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub name: String,
    /// Display date of the last run, or `never`.
    pub last_run: String,
    /// `ok` or `FAILED`.
    pub status: String,
    /// Links to the most recent plots.
    pub plots: Vec<String>,
}

impl ReportEntry {
    pub fn new(name: &str, last_run: Option<&NaiveDateTime>, passed: bool, plots: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            last_run: last_run.map_or_else(|| "never".to_string(), display_date),
            status: if passed { "ok" } else { "FAILED" }.to_string(),
            plots,
        }
    }
}

pub fn render_report(generated: &NaiveDateTime, entries: &[ReportEntry]) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("report", REPORT_TEMPLATE)
        .expect("report template should be valid");
    let template = env.get_template("report")?;
    let mut rendered = template.render(context! {
        generated => display_date(generated),
        tests => entries,
    })?;
    if !rendered.ends_with('\n') {
        rendered.push('\n');
    }
    Ok(rendered)
}

/// Plot files of `test` from its most recent plotting run, sorted by index.
pub fn latest_plots(plots_dir: &Path, test: &str) -> Result<Vec<PathBuf>> {
    if !plots_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut found: Vec<(NaiveDateTime, u32, PathBuf)> = Vec::new();
    for entry in
        fs::read_dir(plots_dir).with_context(|| format!("read {}", plots_dir.display()))?
    {
        let path = entry.context("read entry")?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("svg") {
            continue;
        }
        let Some(file_name) = path.file_name().map(|name| name.to_string_lossy().to_string())
        else {
            continue;
        };
        let Some(parsed) = parse_artifact_name(&file_name) else {
            continue;
        };
        if parsed.test == test {
            found.push((parsed.date, parsed.index.unwrap_or(0), path));
        }
    }
    let Some(latest) = found.iter().map(|(date, _, _)| *date).max() else {
        return Ok(Vec::new());
    };
    found.retain(|(date, _, _)| *date == latest);
    found.sort();
    Ok(found.into_iter().map(|(_, _, path)| path).collect())
}

/// Link to a plot: under `url_base` when set, else relative to the report.
pub fn plot_link(plot: &Path, report_path: &Path, url_base: &str) -> String {
    let file_name = plot
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    if !url_base.is_empty() {
        return format!("{}/{}", url_base.trim_end_matches('/'), file_name);
    }
    let report_dir = report_path.parent().unwrap_or_else(|| Path::new(""));
    match plot.strip_prefix(report_dir) {
        Ok(relative) => relative.to_string_lossy().replace('\\', "/"),
        Err(_) => plot.to_string_lossy().to_string(),
    }
}

/// Write the report atomically.
pub fn write_report(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("md.tmp");
    fs::write(&tmp_path, contents).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
