//! SQLite result store.
//!
//! Runs live in a single `test_results` table. The identifying keys get their
//! own columns so they can be queried directly; every other key is kept in the
//! `json` column as an object of encoded values.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDateTime;
use rusqlite::types::Value;
use rusqlite::{Connection, params};
use tracing::debug;

use super::store::{ResultRecord, ResultSet, ResultStore, keys};
use crate::core::naming::{format_date, parse_date};
use crate::core::value::ResultValue;

/// Keys stored as dedicated columns, in column order.
const COLUMNS: [&str; 6] = [
    keys::STATUS,
    keys::SEED,
    keys::FUNK_COMMIT,
    keys::TARGET_COMMIT,
    keys::METHOD,
    keys::HOSTNAME,
];

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS test_results (
    name TEXT NOT NULL,
    date TEXT NOT NULL,
    seq INTEGER NOT NULL,
    status TEXT,
    seed INTEGER,
    funk_commit TEXT,
    target_commit TEXT,
    method TEXT,
    hostname TEXT,
    json TEXT,
    PRIMARY KEY (name, date, seq)
)";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create database dir {}", parent.display()))?;
        }
        let store = Self {
            path: path.to_path_buf(),
        };
        let conn = store.connect()?;
        conn.execute(SCHEMA, []).context("create test_results table")?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.path)
            .with_context(|| format!("open database {}", self.path.display()))
    }
}

impl ResultStore for SqliteStore {
    fn record(&self, record: &ResultRecord) -> Result<String> {
        let conn = self.connect()?;
        let date = format_date(&record.date);

        // Runs of one test within the same second are told apart by `seq`.
        let seq: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM test_results WHERE name = ?1 AND date = ?2",
                params![record.name, date],
                |row| row.get(0),
            )
            .context("count existing rows")?;

        let mut extra = serde_json::Map::new();
        for (key, value) in &record.values {
            if !COLUMNS.contains(&key.as_str()) {
                extra.insert(key.clone(), serde_json::Value::String(value.encode()));
            }
        }
        let json = serde_json::to_string(&extra).context("serialize extra results")?;

        let column_values: Vec<Value> = COLUMNS
            .iter()
            .map(|key| to_sql(record.get(key)))
            .collect();

        conn.execute(
            "INSERT INTO test_results
                (name, date, seq, status, seed, funk_commit, target_commit, method, hostname, json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                record.name,
                date,
                seq,
                column_values[0],
                column_values[1],
                column_values[2],
                column_values[3],
                column_values[4],
                column_values[5],
                json,
            ],
        )
        .with_context(|| format!("insert result {} {}", record.name, date))?;

        debug!(name = %record.name, date = %date, seq, "result row inserted");
        Ok(format!("{}#{}/{}/{}", self.path.display(), record.name, date, seq))
    }

    fn load(&self, test: &str) -> Result<ResultSet> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, status, seed, funk_commit, target_commit, method, hostname, json
                 FROM test_results WHERE name = ?1 ORDER BY date, seq",
            )
            .context("prepare result query")?;
        let rows = stmt
            .query_map(params![test], |row| {
                let date: String = row.get(0)?;
                let mut columns = Vec::with_capacity(COLUMNS.len());
                for index in 0..COLUMNS.len() {
                    columns.push(row.get::<_, Value>(index + 1)?);
                }
                let json: Option<String> = row.get(COLUMNS.len() + 1)?;
                Ok((date, columns, json))
            })
            .context("query results")?;

        let mut records = Vec::new();
        for row in rows {
            let (date, columns, json) = row.context("read result row")?;
            let date = parse_date(&date)?;
            let mut values = BTreeMap::new();
            for (key, value) in COLUMNS.iter().zip(columns) {
                if let Some(value) = from_sql(value) {
                    values.insert(key.to_string(), value);
                }
            }
            if let Some(json) = json {
                decode_extra(&json, &mut values)
                    .with_context(|| format!("decode json for {test} {date}"))?;
            }
            records.push(ResultRecord {
                name: test.to_string(),
                date,
                values,
            });
        }
        Ok(ResultSet::new(records))
    }

    fn run_dates(&self) -> Result<BTreeMap<String, Vec<NaiveDateTime>>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare("SELECT name, date FROM test_results")
            .context("prepare date query")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .context("query dates")?;
        let mut dates: BTreeMap<String, Vec<NaiveDateTime>> = BTreeMap::new();
        for row in rows {
            let (name, date) = row.context("read date row")?;
            match parse_date(&date) {
                Ok(date) => dates.entry(name).or_default().push(date),
                Err(err) => debug!(name = %name, "skipping row: {err}"),
            }
        }
        Ok(dates)
    }
}

fn to_sql(value: Option<&ResultValue>) -> Value {
    match value {
        None => Value::Null,
        Some(ResultValue::Int(v)) => Value::Integer(*v),
        Some(ResultValue::Float(v)) => Value::Real(*v),
        Some(ResultValue::Text(v)) => Value::Text(v.clone()),
        Some(other) => Value::Text(other.encode()),
    }
}

fn from_sql(value: Value) -> Option<ResultValue> {
    match value {
        Value::Null | Value::Blob(_) => None,
        Value::Integer(v) => Some(ResultValue::Int(v)),
        Value::Real(v) => Some(ResultValue::Float(v)),
        Value::Text(v) => Some(ResultValue::Text(v)),
    }
}

fn decode_extra(json: &str, values: &mut BTreeMap<String, ResultValue>) -> Result<()> {
    let extra: BTreeMap<String, String> = serde_json::from_str(json).context("parse json")?;
    for (key, raw) in extra {
        let value = ResultValue::decode(&raw).map_err(|err| anyhow!("{key}: {err}"))?;
        values.insert(key, value);
    }
    Ok(())
}
