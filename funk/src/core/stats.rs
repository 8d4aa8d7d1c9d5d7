//! Statistics used to judge functional test results.

/// Relative tolerance applied on top of the sigma band, matching the usual
/// `allclose` semantics.
const RELATIVE_TOLERANCE: f64 = 1e-5;

/// Number of most recent commits considered by [`not_deviated_from`].
pub const RECENT_COMMITS: usize = 3;

/// Per-commit summary of a result variable, ordered by first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitStatistics {
    pub commits: Vec<String>,
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

/// Group `values` by the commit they were recorded against.
///
/// `commits` and `values` are aligned; commits keep the order in which they
/// first appear. `std` is the population standard deviation.
pub fn gather_statistics_per_commit(commits: &[String], values: &[f64]) -> CommitStatistics {
    let mut order: Vec<String> = Vec::new();
    let mut groups: Vec<Vec<f64>> = Vec::new();
    for (commit, value) in commits.iter().zip(values) {
        match order.iter().position(|seen| seen == commit) {
            Some(index) => groups[index].push(*value),
            None => {
                order.push(commit.clone());
                groups.push(vec![*value]);
            }
        }
    }
    let mut stats = CommitStatistics {
        commits: order,
        ..CommitStatistics::default()
    };
    for group in &groups {
        stats.mean.push(mean(group));
        stats.std.push(std_dev(group));
    }
    stats
}

/// True if the means of the last [`RECENT_COMMITS`] commits all lie within
/// three sigma of `expected`. An empty history passes.
pub fn not_deviated_from(expected: f64, sigma: f64, means: &[f64]) -> bool {
    let start = means.len().saturating_sub(RECENT_COMMITS);
    let tolerance = 3.0 * sigma + RELATIVE_TOLERANCE * expected.abs();
    means[start..]
        .iter()
        .all(|value| (value - expected).abs() <= tolerance)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Effective sample size of each column of `chain` (rows are samples).
///
/// Autocorrelations are summed from lag 1 until the first negative value.
pub fn effective_sample_size(chain: &[Vec<f64>]) -> Vec<f64> {
    let Some(first) = chain.first() else {
        return Vec::new();
    };
    (0..first.len())
        .map(|dim| {
            let column: Vec<f64> = chain.iter().map(|row| row[dim]).collect();
            effective_sample_size_single(&column)
        })
        .collect()
}

fn effective_sample_size_single(samples: &[f64]) -> f64 {
    let n = samples.len();
    if n < 2 {
        return n as f64;
    }
    let m = mean(samples);
    let centered: Vec<f64> = samples.iter().map(|v| v - m).collect();
    let c0: f64 = centered.iter().map(|v| v * v).sum::<f64>();
    if c0 == 0.0 {
        return n as f64;
    }
    let mut rho_sum = 0.0;
    for lag in 1..n {
        let c: f64 = centered[..n - lag]
            .iter()
            .zip(&centered[lag..])
            .map(|(a, b)| a * b)
            .sum();
        let rho = c / c0;
        if rho < 0.0 {
            break;
        }
        rho_sum += rho;
    }
    n as f64 / (1.0 + 2.0 * rho_sum)
}
