//! SVG error-bar plots of a result variable per commit.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use minijinja::{Environment, context};
use serde::Serialize;

use super::paths::unique_path;
use super::store::{ResultSet, keys};
use crate::core::naming::{display_date, format_date};
use crate::core::stats::{CommitStatistics, gather_statistics_per_commit, mean};
use crate::core::value::ResultValue;

const PLOT_TEMPLATE: &str = include_str!("templates/plot.svg");

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 420.0;
const LEFT: f64 = 70.0;
const RIGHT: f64 = WIDTH - 20.0;
const TOP: f64 = 50.0;
const BOTTOM: f64 = HEIGHT - 70.0;
const Y_TICKS: usize = 5;

#[derive(Debug, Clone, Serialize)]
struct Point {
    x: f64,
    y: f64,
    y_low: f64,
    y_high: f64,
    commit: String,
    label: String,
    mean: String,
    std: String,
}

#[derive(Debug, Clone, Serialize)]
struct Tick {
    y: f64,
    label: String,
}

/// Numeric series of `variable` paired with the commit of each run.
///
/// Arrays are reduced to their mean; runs without a commit or a numeric value
/// are left out.
pub fn plot_series(results: &ResultSet, variable: &str) -> (Vec<String>, Vec<f64>) {
    let columns = results.columns(&[keys::TARGET_COMMIT, variable]);
    let mut commits = Vec::new();
    let mut values = Vec::new();
    for (commit, value) in columns[0].iter().zip(&columns[1]) {
        let Some(commit) = commit.as_str() else {
            continue;
        };
        let value = match value {
            ResultValue::IntArray(items) if !items.is_empty() => {
                let items: Vec<f64> = items.iter().map(|v| *v as f64).collect();
                mean(&items)
            }
            ResultValue::FloatArray(items) if !items.is_empty() => mean(items),
            other => match other.as_f64() {
                Some(v) => v,
                None => continue,
            },
        };
        if value.is_finite() {
            commits.push(commit.to_string());
            values.push(value);
        }
    }
    (commits, values)
}

/// Render per-commit mean and standard deviation as an SVG document.
pub fn render_error_bars(title: &str, subtitle: &str, ylabel: &str, stats: &CommitStatistics) -> Result<String> {
    let lows: Vec<f64> = stats.mean.iter().zip(&stats.std).map(|(m, s)| m - s).collect();
    let highs: Vec<f64> = stats.mean.iter().zip(&stats.std).map(|(m, s)| m + s).collect();
    let (mut y_min, mut y_max) = lows
        .iter()
        .chain(&highs)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    if !y_min.is_finite() || !y_max.is_finite() {
        y_min = 0.0;
        y_max = 1.0;
    }
    if y_max - y_min < 1e-12 {
        let pad = if y_min == 0.0 { 1.0 } else { y_min.abs() * 0.1 };
        y_min -= pad;
        y_max += pad;
    }
    let pad = (y_max - y_min) * 0.05;
    y_min -= pad;
    y_max += pad;
    let scale_y = |v: f64| BOTTOM - (v - y_min) / (y_max - y_min) * (BOTTOM - TOP);

    let n = stats.commits.len();
    let scale_x = |i: usize| {
        if n <= 1 {
            (LEFT + RIGHT) / 2.0
        } else {
            LEFT + 20.0 + i as f64 * (RIGHT - LEFT - 40.0) / (n - 1) as f64
        }
    };

    let points: Vec<Point> = (0..n)
        .map(|i| Point {
            x: scale_x(i),
            y: scale_y(stats.mean[i]),
            y_low: scale_y(lows[i]),
            y_high: scale_y(highs[i]),
            commit: escape(&stats.commits[i]),
            label: escape(&stats.commits[i].chars().take(7).collect::<String>()),
            mean: format!("{:.4}", stats.mean[i]),
            std: format!("{:.4}", stats.std[i]),
        })
        .collect();
    let yticks: Vec<Tick> = (0..Y_TICKS)
        .map(|i| {
            let value = y_min + (y_max - y_min) * i as f64 / (Y_TICKS - 1) as f64;
            Tick {
                y: scale_y(value),
                label: format!("{value:.3}"),
            }
        })
        .collect();

    let mut env = Environment::new();
    env.add_template("plot", PLOT_TEMPLATE)
        .expect("plot template should be valid");
    let template = env.get_template("plot")?;
    let rendered = template.render(context! {
        width => WIDTH,
        height => HEIGHT,
        left => LEFT,
        right => RIGHT,
        top => TOP,
        bottom => BOTTOM,
        title => escape(title),
        subtitle => escape(subtitle),
        ylabel => escape(ylabel),
        yticks => yticks,
        points => points,
    })?;
    Ok(rendered)
}

/// One plot to write for a test.
#[derive(Debug, Clone)]
pub struct PlotRequest<'a> {
    pub variable: &'a str,
    pub title: &'a str,
}

/// Write one SVG per request into `dir`, named `<test>-<date>[-<index>].svg`.
///
/// A single plot gets no index; several are numbered from 1.
pub fn write_plots(
    dir: &Path,
    test: &str,
    date: &NaiveDateTime,
    results: &ResultSet,
    requests: &[PlotRequest<'_>],
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("create plot dir {}", dir.display()))?;
    let stamp = format_date(date);
    let mut written = Vec::with_capacity(requests.len());
    for (index, request) in requests.iter().enumerate() {
        let (commits, values) = plot_series(results, request.variable);
        let stats = gather_statistics_per_commit(&commits, &values);
        let svg = render_error_bars(
            request.title,
            &display_date(date),
            &format!("{} (mean and std)", request.variable),
            &stats,
        )?;
        let file_name = if requests.len() == 1 {
            format!("{test}-{stamp}.svg")
        } else {
            format!("{test}-{stamp}-{}.svg", index + 1)
        };
        let path = unique_path(&dir.join(file_name));
        fs::write(&path, svg).with_context(|| format!("write plot {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
