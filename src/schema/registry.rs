//! Column schemas loaded from external JSON definitions
//!
//! A definition is an ordered array of field descriptors. Only `name` is
//! read; the order of the array is the order of the output columns.

use crate::error::{Error, Result};
use crate::types::{Table, KEY_REQUEST_ID};
use serde_json::Value;
use std::path::Path;

/// Ordered, immutable list of the columns one table must have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    names: Vec<String>,
}

impl Schema {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Schema {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Load a schema definition file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Schema {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text).map_err(|reason| Error::Schema {
            path: path.to_path_buf(),
            reason,
        })
    }

    fn parse(text: &str) -> std::result::Result<Self, String> {
        let definition: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let Value::Array(fields) = definition else {
            return Err("expected an array of field descriptors".to_string());
        };

        let names = fields
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                field
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| format!("field {} has no string 'name'", idx))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Schema { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Reshape `table` to exactly this schema's columns and order.
    pub fn reindex(&self, table: &Table) -> Table {
        if table.columns() == self.names.as_slice() {
            return table.clone();
        }
        table.select(&self.names)
    }

    /// Schema columns that take part in the all-null row test.
    pub(crate) fn payload_columns(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .map(String::as_str)
            .filter(|n| *n != KEY_REQUEST_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn write_definition(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_keeps_file_order() {
        let file = write_definition(
            r#"[{"name": "key_request_id", "type": "STRING"},
                {"name": "b", "type": "INTEGER"},
                {"name": "a", "mode": "NULLABLE"}]"#,
        );

        let schema = Schema::load(file.path()).unwrap();
        assert_eq!(schema.names(), ["key_request_id", "b", "a"]);
    }

    #[test]
    fn test_load_rejects_nameless_field() {
        let file = write_definition(r#"[{"name": "a"}, {"type": "STRING"}]"#);
        let err = Schema::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Schema { reason, .. } if reason.contains("field 1")));
    }

    #[test]
    fn test_load_rejects_non_array_and_missing_file() {
        let file = write_definition(r#"{"name": "a"}"#);
        assert!(matches!(Schema::load(file.path()), Err(Error::Schema { .. })));
        assert!(matches!(
            Schema::load("/nonexistent/schema.json"),
            Err(Error::Schema { .. })
        ));
    }

    #[test]
    fn test_reindex_is_exact_and_idempotent() {
        let schema = Schema::new(["a", "b"]);
        let table = Table::from_records(vec![serde_json::from_value(
            json!({"key_request_id": "1", "a": 1, "c": 2}),
        )
        .unwrap()]);

        let once = schema.reindex(&table);
        assert_eq!(once.columns(), schema.names());
        assert_eq!(once.rows()[0], vec![json!(1), Value::Null]);

        let twice = schema.reindex(&once);
        assert_eq!(once, twice);
    }
}
