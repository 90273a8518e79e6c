use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Identifier of the source document, carried by every table.
pub const KEY_REQUEST_ID: &str = "key_request_id";

/// Link from a second-level list row to the row it was exploded from.
pub const KEY_PARENT_ID: &str = "key_parent_id";

/// Synthetic per-row identifier of an exploded table that has children.
pub const KEY_ID: &str = "key_id";

/// Separator used while a document is being flattened.
pub const PATH_SEPARATOR: &str = "->";

/// Separator used in final column names.
pub const COLUMN_JOIN: &str = "_";

/// One flattened row: path-joined name to scalar (or opaque array) value.
pub type FlatRecord = Map<String, Value>;

/// A named-column, row-major table. Every row has exactly one value per
/// column; `Value::Null` is the null.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// An empty table with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Table {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from flat records. Columns appear in first-seen order
    /// across all records; a record missing a column gets a null there.
    pub fn from_records(records: Vec<FlatRecord>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        {
            let mut seen: HashSet<&str> = HashSet::new();
            for key in records.iter().flat_map(|record| record.keys()) {
                if seen.insert(key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|c| record.remove(c).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();

        Table { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Value at `row` for column `name`, if both exist.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// All values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len(), "ragged row");
        self.rows.push(row);
    }

    /// Reshape to exactly `columns`, in that order. Columns this table does
    /// not have come back as nulls; columns not listed are dropped.
    pub fn select(&self, columns: &[String]) -> Table {
        let sources: Vec<Option<usize>> =
            columns.iter().map(|c| self.column_index(c)).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                sources
                    .iter()
                    .map(|src| src.map_or(Value::Null, |i| row[i].clone()))
                    .collect()
            })
            .collect();

        Table {
            columns: columns.to_vec(),
            rows,
        }
    }

    /// Keep the rows for which `keep` returns true.
    pub fn retain_rows(mut self, mut keep: impl FnMut(&[String], &[Value]) -> bool) -> Table {
        let columns = &self.columns;
        self.rows.retain(|row| keep(columns, row));
        self
    }

    /// Rewrite every value of one column through `f`. The first error
    /// returned by `f` is propagated and the table is dropped.
    pub fn map_column(
        mut self,
        name: &str,
        mut f: impl FnMut(Value) -> Result<Value>,
    ) -> Result<Table> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))?;
        for row in &mut self.rows {
            let value = std::mem::take(&mut row[idx]);
            row[idx] = f(value)?;
        }
        Ok(self)
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.to_string();
        }
    }

    /// Append a column. `values` must hold one value per row.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.rows.len(), "column length mismatch");
        self.columns.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }
}

/// The string form a value takes in CSV cells, digests and synthetic keys.
pub fn canonical_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
