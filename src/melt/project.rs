//! Sub-object projection
//!
//! Picks the columns under one object path out of a normalized table and
//! renames them relative to that path. Matching is done on whole path
//! segments, so `["app"]` never picks up `application->name`.

use crate::types::{Table, COLUMN_JOIN, KEY_REQUEST_ID, PATH_SEPARATOR};
use serde_json::Value;
use tracing::debug;

/// Project `path` out of a table produced with the default separator.
pub fn project_object(flat: &Table, path: &[&str]) -> Table {
    project_object_with(flat, path, PATH_SEPARATOR)
}

/// Project `path` out of a flat table whose nested columns were joined with
/// `separator`.
///
/// The result keeps `key_request_id` and every column strictly below
/// `path`, with the prefix removed and the remaining segments joined by
/// `_`. An empty path keeps every column. When nothing lies below the path
/// the result is an empty table holding only `key_request_id`.
pub fn project_object_with(flat: &Table, path: &[&str], separator: &str) -> Table {
    let mut columns: Vec<String> = Vec::new();
    let mut mapping: Vec<(usize, usize)> = Vec::new();
    let mut matched = false;

    for (src, name) in flat.columns().iter().enumerate() {
        let target = if name == KEY_REQUEST_ID {
            Some(name.clone())
        } else {
            let relative = strip_path(name, path, separator);
            matched |= relative.is_some();
            relative
        };

        if let Some(target) = target {
            let dst = match columns.iter().position(|c| *c == target) {
                Some(dst) => dst,
                None => {
                    columns.push(target);
                    columns.len() - 1
                }
            };
            mapping.push((src, dst));
        }
    }

    if !matched {
        debug!(path = %path.join("."), "no columns under path");
        return Table::new(vec![KEY_REQUEST_ID.to_string()]);
    }

    let mut table = Table::new(columns);
    for row in flat.rows() {
        let mut out = vec![Value::Null; table.columns().len()];
        // later source columns overwrite earlier ones that renamed the same
        for &(src, dst) in &mapping {
            out[dst] = row[src].clone();
        }
        table.push_row(out);
    }
    table
}

/// `Some(relative name)` when `column` lies strictly below `path`.
fn strip_path(column: &str, path: &[&str], separator: &str) -> Option<String> {
    let segments: Vec<&str> = column.split(separator).collect();
    if segments.len() <= path.len() || !segments.starts_with(path) {
        return None;
    }
    Some(segments[path.len()..].join(COLUMN_JOIN))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::melt::normalize::{FlattenConfig, Flattener};
    use crate::schema::Schema;
    use serde_json::json;

    fn flat(batch: Vec<Value>) -> Table {
        Flattener::new(FlattenConfig::default()).normalize(&batch).unwrap()
    }

    #[test]
    fn test_project_and_reindex() {
        let table = flat(vec![json!({"_id": "1", "x": {"a": 1, "c": 2}})]);
        let projected = project_object(&table, &["x"]);
        let shaped = Schema::new(["a", "b"]).reindex(&projected);

        assert_eq!(shaped.len(), 1);
        assert_eq!(shaped.columns(), ["a", "b"]);
        assert_eq!(shaped.rows()[0], vec![json!(1), Value::Null]);
    }

    #[test]
    fn test_deep_path_joins_remaining_segments() {
        let table = flat(vec![json!({
            "_id": "1",
            "in": {"app": {"info": {"first": "A", "last": "B"}, "age": 3}}
        })]);
        let projected = project_object(&table, &["in", "app"]);

        assert_eq!(projected.columns(), ["info_first", "info_last", "age", "key_request_id"]);
        assert_eq!(projected.get(0, "info_last").unwrap(), "B");
    }

    #[test]
    fn test_segment_prefix_is_not_a_match() {
        let table = flat(vec![json!({
            "_id": "1",
            "app": {"a": 1},
            "application": {"b": 2}
        })]);
        let projected = project_object(&table, &["app"]);

        assert_eq!(projected.columns(), ["a", "key_request_id"]);
    }

    #[test]
    fn test_missing_path_yields_key_only_empty_table() {
        let table = flat(vec![json!({"_id": "1", "x": {"a": 1}})]);
        let projected = project_object(&table, &["y"]);

        assert!(projected.is_empty());
        assert_eq!(projected.columns(), [KEY_REQUEST_ID]);
    }

    #[test]
    fn test_documents_without_the_object_keep_a_null_row() {
        let table = flat(vec![
            json!({"_id": "1", "x": {"a": 1}}),
            json!({"_id": "2"}),
        ]);
        let projected = project_object(&table, &["x"]);

        assert_eq!(projected.len(), 2);
        assert_eq!(projected.get(1, "a").unwrap(), &Value::Null);
        assert_eq!(projected.get(1, "key_request_id").unwrap(), "2");
    }

    #[test]
    fn test_renamed_collision_takes_last_value() {
        let table = flat(vec![json!({"_id": "1", "x": {"a_b": 1, "a": {"b": 2}}})]);
        let projected = project_object(&table, &["x"]);

        assert_eq!(projected.columns(), ["a_b", "key_request_id"]);
        assert_eq!(projected.get(0, "a_b").unwrap(), 2);
    }
}
