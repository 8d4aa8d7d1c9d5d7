//! Orchestration for `funk list`.

use anyhow::Result;
use chrono::NaiveDateTime;

use crate::core::schedule::by_last_run;
use crate::harness::Harness;

/// Registered tests with their last run date, least recently run first.
pub fn list_tests(harness: &Harness) -> Result<Vec<(String, Option<NaiveDateTime>)>> {
    Ok(by_last_run(&harness.last_run_dates()?))
}
