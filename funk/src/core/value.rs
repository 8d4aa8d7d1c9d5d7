//! Result values and the line-oriented results file grammar.
//!
//! A results file holds one `key: value` pair per line, sorted by key. Values
//! are typed by their textual shape: quoted text, bracketed arrays, floats
//! (anything with a `.`, an exponent, or a non-finite marker) and integers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use anyhow::{Result, anyhow, bail};
use regex::Regex;

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z]\w*$").unwrap());

/// Number of fractional digits written for floats.
const FLOAT_DIGITS: usize = 17;

/// A single stored result.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Int(i64),
    Float(f64),
    Text(String),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
}

impl ResultValue {
    /// Build a text value, rejecting embedded line breaks.
    pub fn text(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.contains('\n') || value.contains('\r') {
            bail!("multi-line strings are not supported");
        }
        Ok(Self::Text(value))
    }

    /// Numeric view of scalar values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Encode in results file form (the part after `key: `).
    pub fn encode(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => format_float(*v),
            Self::Text(v) => format!("\"{v}\""),
            Self::IntArray(values) => {
                let items: Vec<String> = values.iter().map(i64::to_string).collect();
                format!("[{}]", items.join(", "))
            }
            Self::FloatArray(values) => {
                let items: Vec<String> = values.iter().copied().map(format_float).collect();
                format!("[{}]", items.join(", "))
            }
        }
    }

    /// Decode a value in results file form.
    pub fn decode(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Some(inner) = raw.strip_prefix('[') {
            let inner = inner.strip_suffix(']').unwrap_or(inner).trim();
            if inner.is_empty() {
                return Ok(Self::FloatArray(Vec::new()));
            }
            let items = inner.split(',').map(str::trim);
            if looks_like_float(inner) {
                let values = items
                    .map(|item| item.parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|err| anyhow!("unable to parse float array: {err}"))?;
                return Ok(Self::FloatArray(values));
            }
            let values = items
                .map(|item| item.parse::<i64>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| anyhow!("unable to parse int array: {err}"))?;
            return Ok(Self::IntArray(values));
        }
        if let Some(inner) = raw.strip_prefix('"') {
            return Ok(Self::Text(inner.strip_suffix('"').unwrap_or(inner).to_string()));
        }
        if looks_like_float(raw) {
            let value = raw
                .parse::<f64>()
                .map_err(|err| anyhow!("unable to parse float: {err}"))?;
            return Ok(Self::Float(value));
        }
        let value = raw
            .parse::<i64>()
            .map_err(|err| anyhow!("unable to parse int: {err}"))?;
        Ok(Self::Int(value))
    }
}

impl fmt::Display for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<i64> for ResultValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for ResultValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for ResultValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<f64>> for ResultValue {
    fn from(value: Vec<f64>) -> Self {
        Self::FloatArray(value)
    }
}

impl From<&[f64]> for ResultValue {
    fn from(value: &[f64]) -> Self {
        Self::FloatArray(value.to_vec())
    }
}

impl From<Vec<i64>> for ResultValue {
    fn from(value: Vec<i64>) -> Self {
        Self::IntArray(value)
    }
}

/// True if `key` is a valid result key (`^[a-zA-Z]\w*$`).
pub fn is_valid_key(key: &str) -> bool {
    KEY_RE.is_match(key)
}

/// Format a float as ` 1.23450000000000000e+00` (sign column, 17 digits,
/// signed two-digit exponent).
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return " nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { " inf" } else { "-inf" }.to_string();
    }
    let raw = format!("{:.*e}", FLOAT_DIGITS, value);
    let (mantissa, exponent) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let pad = if mantissa.starts_with('-') { "" } else { " " };
    format!("{pad}{mantissa}e{sign}{:02}", exponent.abs())
}

fn looks_like_float(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    lower.contains('.') || lower.contains('e') || lower.contains("inf") || lower.contains("nan")
}

/// Outcome of parsing a results document: the pairs that parsed, plus one
/// message per skipped line.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParsedResults {
    pub values: BTreeMap<String, ResultValue>,
    pub skipped: Vec<String>,
}

/// Parse a results document. Malformed lines are skipped and reported, never fatal.
pub fn parse_results(contents: &str) -> ParsedResults {
    let mut parsed = ParsedResults::default();
    for (index, line) in contents.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, raw)) = line.split_once(':') else {
            parsed.skipped.push(format!("unable to parse line {line_no}"));
            continue;
        };
        if !is_valid_key(key) {
            parsed
                .skipped
                .push(format!("invalid key \"{key}\" on line {line_no}"));
            continue;
        }
        match ResultValue::decode(raw) {
            Ok(value) => {
                parsed.values.insert(key.to_string(), value);
            }
            Err(err) => parsed
                .skipped
                .push(format!("{err} for {key} on line {line_no}")),
        }
    }
    parsed
}

/// Render values as a results document (sorted keys, trailing newline).
pub fn render_results(values: &BTreeMap<String, ResultValue>) -> String {
    let mut out = String::new();
    for (key, value) in values {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&value.encode());
        out.push('\n');
    }
    out
}
