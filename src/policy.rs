//! Column policies applied to a finished table before it is written
//!
//! Each policy takes the table by value and hands back the rewritten table.
//! Zero-row tables pass through untouched, even when the named columns do
//! not exist.

use crate::error::{Error, Result};
use crate::types::{canonical_string, Table};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Integer literal, optionally written with a zero fraction (`"7.0"`).
static INTEGER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?\d+)(\.0*)?$").unwrap()
});

/// Output format of [`normalize_timestamps`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Cast each named column to nullable 64-bit integers.
pub fn force_integer(table: Table, columns: &[String]) -> Result<Table> {
    if table.is_empty() {
        return Ok(table);
    }
    columns.iter().try_fold(table, |table, column| {
        table.map_column(column, |value| to_integer(column, value))
    })
}

fn to_integer(column: &str, value: Value) -> Result<Value> {
    let parsed = match &value {
        Value::Null => return Ok(Value::Null),
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => INTEGER_REGEX
            .captures(s.trim())
            .and_then(|caps| caps[1].parse::<i64>().ok()),
        _ => None,
    };

    parsed.map(Value::from).ok_or_else(|| Error::TypeCoercion {
        column: column.to_string(),
        value: value.to_string(),
        target: "integer",
    })
}

/// Replace every value of each named column with the hex SHA-256 of its
/// canonical string form. Nulls become the empty string.
pub fn anonymize(table: Table, columns: &[String]) -> Result<Table> {
    if table.is_empty() {
        return Ok(table);
    }
    columns.iter().try_fold(table, |table, column| {
        table.map_column(column, |value| Ok(Value::String(digest_value(&value))))
    })
}

/// Lowercase hex SHA-256 of a value, or `""` for null.
pub fn digest_value(value: &Value) -> String {
    if value.is_null() {
        return String::new();
    }
    sha256_hex(canonical_string(value).as_bytes())
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Rewrite timestamp columns as UTC text in [`TIMESTAMP_FORMAT`].
///
/// Values carrying an offset keep it; naive values are read in
/// `assume_offset`. Mongo-style `{"$date": ...}` wrappers are unwrapped.
pub fn normalize_timestamps(
    table: Table,
    columns: &[String],
    assume_offset: FixedOffset,
) -> Result<Table> {
    if table.is_empty() {
        return Ok(table);
    }
    columns.iter().try_fold(table, |table, column| {
        table.map_column(column, |value| {
            if value.is_null() {
                return Ok(Value::Null);
            }
            parse_timestamp(&value, assume_offset)
                .map(|ts| Value::String(ts.format(TIMESTAMP_FORMAT).to_string()))
                .ok_or_else(|| Error::TypeCoercion {
                    column: column.to_string(),
                    value: value.to_string(),
                    target: "timestamp",
                })
        })
    })
}

/// Parse a timestamp value into UTC. Accepts RFC 3339, naive date-times
/// (read in `assume_offset`), epoch milliseconds and `{"$date": ...}`.
pub fn parse_timestamp(value: &Value, assume_offset: FixedOffset) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .and_then(|naive| assume_offset.from_local_datetime(&naive).single())
                .map(|ts| ts.with_timezone(&Utc))
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(obj) => obj
            .get("$date")
            .and_then(|inner| parse_timestamp(inner, assume_offset)),
        _ => None,
    }
}
