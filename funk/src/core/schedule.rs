//! Deterministic choice of which test to run next.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use chrono::NaiveDateTime;

/// Map every registered test to the date it last ran (`None` if never).
///
/// Dates recorded for unregistered tests are ignored.
pub fn last_run_dates<'a>(
    registered: impl IntoIterator<Item = &'a str>,
    recorded: &BTreeMap<String, Vec<NaiveDateTime>>,
) -> BTreeMap<String, Option<NaiveDateTime>> {
    registered
        .into_iter()
        .map(|name| {
            let last = recorded
                .get(name)
                .and_then(|dates| dates.iter().max().copied());
            (name.to_string(), last)
        })
        .collect()
}

/// The test that has gone unrun for longest.
///
/// Never-run tests sort before any date; ties go to the smallest name.
pub fn next_test(dates: &BTreeMap<String, Option<NaiveDateTime>>) -> Result<String> {
    // BTreeMap iterates in name order and `min_by_key` keeps the first minimum.
    dates
        .iter()
        .min_by_key(|(_, date)| **date)
        .map(|(name, _)| name.clone())
        .ok_or_else(|| anyhow!("no tests registered"))
}

/// The test with the most recent run, if any test has run.
pub fn last_run_test(dates: &BTreeMap<String, Option<NaiveDateTime>>) -> Option<String> {
    dates
        .iter()
        .filter_map(|(name, date)| date.map(|date| (name, date)))
        .max_by_key(|(_, date)| *date)
        .map(|(name, _)| name.clone())
}

/// Tests ordered oldest-run first (never-run first, then by name).
pub fn by_last_run(
    dates: &BTreeMap<String, Option<NaiveDateTime>>,
) -> Vec<(String, Option<NaiveDateTime>)> {
    let mut ordered: Vec<_> = dates
        .iter()
        .map(|(name, date)| (name.clone(), *date))
        .collect();
    ordered.sort_by(|left, right| left.1.cmp(&right.1).then_with(|| left.0.cmp(&right.0)));
    ordered
}
