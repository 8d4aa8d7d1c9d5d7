//! Test names, run dates and the file names derived from them.
//!
//! Every artifact of a run is named `<test>-<date>[-<index>].<ext>`. Test
//! names cannot contain `-`, so the first dash always separates name and date.

use std::sync::LazyLock;

use anyhow::{Result, bail};
use chrono::NaiveDateTime;
use regex::Regex;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z]\w*$").unwrap());

/// Run date format used in file names and records.
pub const DATE_FORMAT: &str = "%Y-%m-%d-%H:%M:%S";

/// Human-facing date format used in listings and reports.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reject names that would not survive the `<name>-<date>` file convention.
pub fn validate_name(name: &str) -> Result<()> {
    if !NAME_RE.is_match(name) {
        bail!("invalid test name: {name}");
    }
    Ok(())
}

pub fn format_date(date: &NaiveDateTime) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn display_date(date: &NaiveDateTime) -> String {
    date.format(DISPLAY_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> Result<NaiveDateTime> {
    match NaiveDateTime::parse_from_str(raw, DATE_FORMAT) {
        Ok(date) => Ok(date),
        Err(err) => bail!("invalid date '{raw}': {err}"),
    }
}

/// `<name>-<date>.<ext>`
pub fn artifact_name(name: &str, date: &NaiveDateTime, ext: &str) -> String {
    format!("{name}-{}.{ext}", format_date(date))
}

/// A file name split into its test name, run date and optional index suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub test: String,
    pub date: NaiveDateTime,
    pub index: Option<u32>,
}

/// Split `file_name` into test name and date.
///
/// Returns `None` when the name has no dash or the date part does not parse.
pub fn parse_artifact_name(file_name: &str) -> Option<ArtifactName> {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => file_name,
    };
    let (test, stamp) = stem.split_once('-')?;
    if test.is_empty() {
        return None;
    }

    // An index suffix is a dash after the time part (the last `:`).
    let time_start = stamp.rfind(':').unwrap_or(0);
    let (stamp, index) = match stamp[time_start..].find('-') {
        Some(offset) => {
            let split = time_start + offset;
            let index = stamp[split + 1..].parse::<u32>().ok()?;
            (&stamp[..split], Some(index))
        }
        None => (stamp, None),
    };

    let date = NaiveDateTime::parse_from_str(stamp, DATE_FORMAT).ok()?;
    Some(ArtifactName {
        test: test.to_string(),
        date,
        index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2018, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 7)
            .unwrap()
    }

    #[test]
    fn validates_names() {
        assert!(validate_name("opt_fn_Snes_100").is_ok());
        assert!(validate_name("test1").is_ok());
        assert!(validate_name("1test").is_err());
        assert!(validate_name("bad-name").is_err());
        assert!(validate_name("").is_err());
    }

    #[test]
    fn artifact_name_uses_date_format() {
        assert_eq!(
            artifact_name("test1", &date(), "txt"),
            "test1-2018-03-09-14:05:07.txt"
        );
    }

    #[test]
    fn parses_plain_and_indexed_names() {
        let parsed = parse_artifact_name("test1-2018-03-09-14:05:07.txt").expect("parse");
        assert_eq!(parsed.test, "test1");
        assert_eq!(parsed.date, date());
        assert_eq!(parsed.index, None);

        let parsed = parse_artifact_name("mcmc_normal_x-2018-03-09-14:05:07-3.svg").expect("parse");
        assert_eq!(parsed.test, "mcmc_normal_x");
        assert_eq!(parsed.index, Some(3));
    }

    #[test]
    fn rejects_unparseable_names() {
        assert!(parse_artifact_name("README.md").is_none());
        assert!(parse_artifact_name("test1-yesterday.txt").is_none());
        assert!(parse_artifact_name("-2018-03-09-14:05:07.txt").is_none());
    }
}
