//! One-to-many explosion of array columns into child tables
//!
//! Every element of the array becomes one child row that carries the
//! parent's key columns. Rows with no elements still produce a single
//! placeholder row; binding a schema removes those placeholders again.

use crate::error::{Error, Result};
use crate::melt::normalize::flatten_into;
use crate::schema::Schema;
use crate::types::{canonical_string, FlatRecord, Table, COLUMN_JOIN, KEY_REQUEST_ID};
use serde_json::{Map, Value};
use tracing::debug;

static NULL: Value = Value::Null;

/// Explode `array_column` of `parent` into a child table.
///
/// `additional_keys` names the parent columns copied onto every child row;
/// when empty, only `key_request_id` is copied. Without a schema the child
/// table has the key columns first and then the union of element fields.
/// With a schema the result is passed through [`bind_schema`].
pub fn explode_list(
    parent: &Table,
    array_column: &str,
    schema: Option<&Schema>,
    additional_keys: &[&str],
) -> Table {
    let keys: Vec<&str> = if additional_keys.is_empty() {
        vec![KEY_REQUEST_ID]
    } else {
        additional_keys.to_vec()
    };

    let key_idx: Vec<Option<usize>> = keys.iter().map(|k| parent.column_index(k)).collect();
    let array_idx = parent.column_index(array_column);

    let mut records: Vec<FlatRecord> = Vec::new();
    for row in parent.rows() {
        let array = array_idx.map_or(&NULL, |i| &row[i]);
        for element in elements(array) {
            let mut record = Map::new();
            for (key, idx) in keys.iter().zip(&key_idx) {
                let value = idx.map_or(Value::Null, |i| row[i].clone());
                record.insert(key.to_string(), value);
            }
            let mut fields = Map::new();
            match element {
                Value::Object(obj) => flatten_into(obj, None, COLUMN_JOIN, &mut fields),
                Value::Null => {}
                scalar => {
                    fields.insert("value".to_string(), scalar.clone());
                }
            }
            // parent keys win over element fields of the same name
            for (name, value) in fields {
                record.entry(name).or_insert(value);
            }
            records.push(record);
        }
    }

    let table = if records.is_empty() {
        Table::new(keys.iter().map(|k| k.to_string()).collect())
    } else {
        Table::from_records(records)
    };

    debug!(
        column = array_column,
        parents = parent.len(),
        rows = table.len(),
        "exploded list"
    );

    match schema {
        Some(schema) => bind_schema(&table, schema),
        None => table,
    }
}

/// Elements of one array cell. Empty and absent arrays yield a single null
/// placeholder so the parent still produces one row.
fn elements(array: &Value) -> Vec<&Value> {
    match array {
        Value::Array(items) if !items.is_empty() => items.iter().collect(),
        Value::Array(_) | Value::Null => vec![&NULL],
        other => vec![other],
    }
}

/// Reindex `table` to `schema`, then drop rows whose schema columns other
/// than `key_request_id` are all null. A schema with no other column
/// therefore keeps no rows.
pub fn bind_schema(table: &Table, schema: &Schema) -> Table {
    let shaped = schema.reindex(table);
    let payload: Vec<usize> = schema
        .payload_columns()
        .filter_map(|name| shaped.column_index(name))
        .collect();

    shaped.retain_rows(|_, row| payload.iter().any(|&i| !row[i].is_null()))
}

/// Append `column` holding a row identifier built from `base` and the
/// row's position: `"{base}_{index}"`.
pub fn with_row_key(mut table: Table, base: &str, column: &str) -> Result<Table> {
    let values = table
        .column(base)
        .ok_or_else(|| Error::MissingColumn(base.to_string()))?
        .into_iter()
        .enumerate()
        .map(|(idx, value)| Value::String(format!("{}_{}", canonical_string(value), idx)))
        .collect();

    table.push_column(column, values);
    Ok(table)
}
