use crate::error::{Error, Result};
use crate::types::{FlatRecord, Table, KEY_REQUEST_ID, PATH_SEPARATOR};
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use std::io;
use tracing::debug;

static NULL: Value = Value::Null;

/// Configuration for flattening a document batch
#[derive(Debug, Clone)]
pub struct FlattenConfig {
    /// Top-level field holding the document identifier
    pub identifier: String,

    /// Separator placed between path segments of nested fields
    pub separator: String,
}

impl Default for FlattenConfig {
    fn default() -> Self {
        FlattenConfig {
            identifier: String::from("_id"),
            separator: String::from(PATH_SEPARATOR),
        }
    }
}

/// Turns a batch of nested documents into one flat table
pub struct Flattener {
    config: FlattenConfig,
}

impl Flattener {
    pub fn new(config: FlattenConfig) -> Self {
        Flattener { config }
    }

    pub fn config(&self) -> &FlattenConfig {
        &self.config
    }

    /// Flatten every document into one row, in input order.
    ///
    /// Nested objects become path-joined columns; arrays are kept as opaque
    /// values for a later explode. Each row also gets `key_request_id`.
    pub fn normalize(&self, batch: &[Value]) -> Result<Table> {
        let records = batch
            .iter()
            .enumerate()
            .map(|(index, document)| self.normalize_document(index, document))
            .collect::<Result<Vec<_>>>()?;

        let table = if records.is_empty() {
            Table::new(vec![KEY_REQUEST_ID.to_string()])
        } else {
            Table::from_records(records)
        };

        debug!(
            rows = table.len(),
            columns = table.columns().len(),
            "normalized document batch"
        );
        Ok(table)
    }

    fn normalize_document(&self, index: usize, document: &Value) -> Result<FlatRecord> {
        let missing = || Error::MissingIdentifier {
            index,
            field: self.config.identifier.clone(),
        };
        let Value::Object(obj) = document else {
            return Err(missing());
        };
        let id = obj.get(&self.config.identifier).cloned().ok_or_else(missing)?;

        let mut record = Map::new();
        flatten_into(obj, None, &self.config.separator, &mut record);
        record.insert(KEY_REQUEST_ID.to_string(), id);
        Ok(record)
    }

    /// One row per document holding the sub-tree at `path` as JSON text in
    /// `column`, rendered by [`spaced_ascii_json`]. A missing sub-tree is
    /// stored as `"null"`.
    pub fn embed_json(&self, batch: &[Value], path: &[&str], column: &str) -> Result<Table> {
        let mut table = Table::new(vec![KEY_REQUEST_ID.to_string(), column.to_string()]);
        for (index, document) in batch.iter().enumerate() {
            let id = self.identifier_of(index, document)?.clone();
            let subtree = path
                .iter()
                .try_fold(document, |node, segment| node.get(segment))
                .unwrap_or(&NULL);
            table.push_row(vec![id, Value::String(spaced_ascii_json(subtree)?)]);
        }
        Ok(table)
    }

    fn identifier_of<'a>(&self, index: usize, document: &'a Value) -> Result<&'a Value> {
        document
            .get(&self.config.identifier)
            .ok_or_else(|| Error::MissingIdentifier {
                index,
                field: self.config.identifier.clone(),
            })
    }
}

/// JSON text with `", "` and `": "` separators and every non-ASCII
/// character escaped as `\uXXXX` (UTF-16 units, lowercase hex).
pub fn spaced_ascii_json(value: &Value) -> Result<String> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, SpacedAsciiFormatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

struct SpacedAsciiFormatter;

impl Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Recursively copy the fields of `obj` into `out`, joining nested object
/// keys onto `prefix` with `separator`. Arrays and scalars are leaves.
pub(crate) fn flatten_into(
    obj: &Map<String, Value>,
    prefix: Option<&str>,
    separator: &str,
    out: &mut FlatRecord,
) {
    for (key, value) in obj {
        let name = match prefix {
            Some(p) => format!("{}{}{}", p, separator, key),
            None => key.clone(),
        };

        match value {
            Value::Object(nested) => flatten_into(nested, Some(&name), separator, out),
            _ => {
                out.insert(name, value.clone());
            }
        }
    }
}
