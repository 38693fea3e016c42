//! Parse functions - decode upstream pages and normalize cell values

use crate::ingestion::types::{PagePayload, Record};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// Canonical timestamp layout for the `dataTime` column
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Why a page body could not be turned into records
#[derive(Debug, Error)]
pub enum PageError {
    #[error("response is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
}

impl PagePayload {
    /// Decode a response body into one of the two accepted shapes
    pub fn decode(body: &str) -> Result<Self, PageError> {
        let value: Value = serde_json::from_str(body)?;
        PagePayload::try_from(value)
    }

    /// The page's record list: the list itself, or the first list-valued
    /// field of a wrapping object
    pub fn into_items(self) -> Result<Vec<Value>, PageError> {
        match self {
            PagePayload::List(items) => Ok(items),
            PagePayload::Wrapped(map) => {
                let keys: Vec<String> = map.keys().cloned().collect();
                map.into_iter()
                    .find_map(|(_, value)| match value {
                        Value::Array(items) => Some(items),
                        _ => None,
                    })
                    .ok_or_else(|| {
                        PageError::UnexpectedShape(format!(
                            "object without a list field (keys: {})",
                            keys.join(", ")
                        ))
                    })
            }
        }
    }
}

impl TryFrom<Value> for PagePayload {
    type Error = PageError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(items) => Ok(PagePayload::List(items)),
            Value::Object(map) => Ok(PagePayload::Wrapped(map)),
            other => Err(PageError::UnexpectedShape(format!(
                "expected list or object, got {}",
                json_type_name(&other)
            ))),
        }
    }
}

/// Keep object items as records; anything else is skipped
pub fn items_to_records(items: Vec<Value>) -> Vec<Record> {
    let total = items.len();
    let records: Vec<Record> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();

    if records.len() < total {
        warn!(
            "Skipped {} non-object items in page",
            total - records.len()
        );
    }

    records
}

/// Convert an upstream date value into `YYYY-MM-DD HH:MM:SS`.
///
/// Accepts the nested date object the API emits (`year`, `monthValue`,
/// `dayOfMonth`, `hour`, `minute`, `second`), the same object rendered as a
/// JSON or Python-style dict string, or an already formatted timestamp.
/// Anything malformed yields `None`.
pub fn normalize_timestamp(value: &Value) -> Option<String> {
    parse_timestamp(value).map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

pub fn parse_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::Object(map) => date_from_parts(map),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.starts_with('{') {
                let parsed: Value = serde_json::from_str(trimmed)
                    .or_else(|_| serde_json::from_str(&python_literal_to_json(trimmed)))
                    .ok()?;
                match parsed {
                    Value::Object(map) => date_from_parts(&map),
                    _ => None,
                }
            } else {
                parse_timestamp_str(trimmed)
            }
        }
        _ => None,
    }
}

/// Year of a canonical (or otherwise parseable) timestamp
pub fn timestamp_year(value: &Value) -> Option<i32> {
    parse_timestamp(value).map(|dt| dt.year())
}

fn date_from_parts(map: &Map<String, Value>) -> Option<NaiveDateTime> {
    let part = |key: &str| map.get(key).and_then(whole_number);

    let year = i32::try_from(part("year")?).ok()?;
    let month = u32::try_from(part("monthValue")?).ok()?;
    let day = u32::try_from(part("dayOfMonth")?).ok()?;
    let hour = u32::try_from(part("hour")?).ok()?;
    let minute = u32::try_from(part("minute")?).ok()?;
    let second = u32::try_from(part("second")?).ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

fn whole_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<NaiveDateTime> {
    const LAYOUTS: [&str; 4] = [
        TIMESTAMP_FORMAT,
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ];

    for layout in LAYOUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, layout) {
            return Some(dt);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Rewrite a Python dict literal (`{'year': 2020, 'ok': True}`) as JSON
fn python_literal_to_json(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' => {
                let quote = c;
                out.push('"');
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                if escaped == '\'' {
                                    out.push('\'');
                                } else {
                                    out.push('\\');
                                    out.push(escaped);
                                }
                            }
                        }
                        '"' if quote == '\'' => out.push_str("\\\""),
                        q if q == quote => break,
                        other => out.push(other),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        word.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.as_str() {
                    "True" => out.push_str("true"),
                    "False" => out.push_str("false"),
                    "None" => out.push_str("null"),
                    _ => out.push_str(&word),
                }
            }
            other => out.push(other),
        }
    }

    out
}

/// Numeric view of a cell; numeric strings are accepted
pub fn parse_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Trimmed, non-empty station code of a cell
pub fn station_code(value: &Value) -> Option<String> {
    let code = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!code.is_empty()).then_some(code)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
