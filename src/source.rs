//! Document sources
//!
//! A source returns every document whose timestamp lies inside an
//! extraction window. The bundled [`JsonFileSource`] reads an exported
//! collection (a JSON array or newline-delimited JSON) from disk.

use crate::error::{Error, Result};
use crate::policy::parse_timestamp;
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Closed time interval a run extracts documents for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// From the first instant of `start` to the last microsecond of `end`.
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if end < start {
            return Err(Error::Config(format!(
                "window end {} is before start {}",
                end, start
            )));
        }
        let bounds = start
            .and_hms_opt(0, 0, 0)
            .zip(end.and_hms_micro_opt(23, 59, 59, 999_999))
            .ok_or_else(|| Error::Config(format!("invalid window {}..{}", start, end)))?;

        Ok(Window {
            start: bounds.0.and_utc(),
            end: bounds.1.and_utc(),
        })
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start <= *ts && *ts <= self.end
    }

    /// Date used to name the artifacts of a run.
    pub fn as_of(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

/// Anything that can produce the document batch for a window.
pub trait DocumentSource {
    fn fetch(&mut self, window: &Window) -> Result<Vec<Value>>;
}

/// Reads a collection export from a file and filters it by window.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
    timestamp_field: String,
    assume_offset: FixedOffset,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileSource {
            path: path.into(),
            timestamp_field: String::from("request_time"),
            assume_offset: Utc.fix(),
        }
    }

    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    /// Offset applied to timestamps that carry none.
    pub fn with_assumed_offset(mut self, offset: FixedOffset) -> Self {
        self.assume_offset = offset;
        self
    }

    fn read_all(&self) -> Result<Vec<Value>> {
        let content = std::fs::read(&self.path).map_err(|e| Error::io(&self.path, e))?;

        // simd-json parses in place, so keep the original bytes for the fallback
        let mut scratch = content.clone();
        let documents = match simd_json::serde::from_slice::<Value>(&mut scratch) {
            Ok(Value::Array(items)) => items,
            Ok(single @ Value::Object(_)) => vec![single],
            Ok(other) => {
                return Err(Error::Config(format!(
                    "{}: expected documents, found {}",
                    self.path.display(),
                    other
                )))
            }
            Err(_) => {
                debug!(path = %self.path.display(), "not a single JSON value, reading as NDJSON");
                let text = String::from_utf8_lossy(&content);
                text.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(serde_json::from_str::<Value>)
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        Ok(documents.into_iter().map(unwrap_extended_json).collect())
    }
}

impl DocumentSource for JsonFileSource {
    fn fetch(&mut self, window: &Window) -> Result<Vec<Value>> {
        let documents = self.read_all()?;
        let total = documents.len();

        let mut selected = Vec::with_capacity(total);
        for (index, document) in documents.into_iter().enumerate() {
            let ts = document
                .get(&self.timestamp_field)
                .and_then(|v| parse_timestamp(v, self.assume_offset));
            match ts {
                Some(ts) if window.contains(&ts) => selected.push(document),
                Some(_) => {}
                None => warn!(
                    index,
                    field = %self.timestamp_field,
                    "document has no usable timestamp, skipping"
                ),
            }
        }

        info!(
            path = %self.path.display(),
            total,
            selected = selected.len(),
            "documents extracted"
        );
        Ok(selected)
    }
}

/// Collapse MongoDB extended-JSON wrappers into plain values: object ids
/// and dates become strings, wrapped numbers become numbers.
pub fn unwrap_extended_json(value: Value) -> Value {
    match value {
        Value::Object(obj) => {
            if obj.len() == 1 {
                if let Some((key, inner)) = obj.iter().next() {
                    if let Some(plain) = unwrap_wrapper(key, inner) {
                        return plain;
                    }
                }
            }
            Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, unwrap_extended_json(v)))
                    .collect::<Map<_, _>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(unwrap_extended_json).collect()),
        other => other,
    }
}

fn unwrap_wrapper(key: &str, inner: &Value) -> Option<Value> {
    match (key, inner) {
        ("$oid", Value::String(id)) => Some(Value::String(id.clone())),
        ("$date", _) => {
            let inner = match inner {
                Value::Object(_) => unwrap_extended_json(inner.clone()),
                other => other.clone(),
            };
            parse_timestamp(&inner, Utc.fix())
                .map(|ts| Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true)))
        }
        ("$numberLong" | "$numberInt", Value::String(n)) => n.parse::<i64>().ok().map(Value::from),
        ("$numberDouble", Value::String(n)) => n
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn window() -> Window {
        Window::from_dates(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_window_is_closed() {
        let w = window();
        assert!(w.contains(&"2024-01-01T00:00:00Z".parse().unwrap()));
        assert!(w.contains(&"2024-01-02T23:59:59.999999Z".parse().unwrap()));
        assert!(!w.contains(&"2024-01-03T00:00:00Z".parse().unwrap()));
        assert_eq!(w.as_of(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_window_rejects_reversed_dates() {
        let err = Window::from_dates(
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_json_array_file_is_filtered_by_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.json");
        std::fs::write(
            &path,
            json!([
                {"_id": {"$oid": "a1"}, "request_time": {"$date": "2024-01-01T10:00:00Z"}},
                {"_id": {"$oid": "a2"}, "request_time": "2024-01-05T10:00:00Z"},
                {"_id": {"$oid": "a3"}}
            ])
            .to_string(),
        )
        .unwrap();

        let docs = JsonFileSource::new(&path).fetch(&window()).unwrap();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["_id"], "a1");
        assert_eq!(docs[0]["request_time"], "2024-01-01T10:00:00.000000Z");
    }

    #[test]
    fn test_ndjson_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        std::fs::write(
            &path,
            "{\"_id\": \"a\", \"request_time\": \"2024-01-01 08:00:00\"}\n\n{\"_id\": \"b\", \"request_time\": \"2024-01-02T08:00:00Z\"}\n",
        )
        .unwrap();

        let docs = JsonFileSource::new(&path).fetch(&window()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["_id"], "b");
    }

    #[test]
    fn test_unwrap_extended_json_numbers() {
        let value = unwrap_extended_json(json!({
            "n": {"$numberLong": "42"},
            "nested": [{"d": {"$numberDouble": "1.5"}}]
        }));
        assert_eq!(value, json!({"n": 42, "nested": [{"d": 1.5}]}));
    }
}
