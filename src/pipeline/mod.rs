//! Run orchestration
//!
//! The batch is normalized once. Datasets then run strictly in plan order;
//! all tables of a dataset are built before any of them is written, and the
//! first error stops the run.

pub mod plan;

pub use plan::{DatasetMode, DatasetPlan, ListPlan, ListShape, PipelinePlan, PolicyPlan};

use crate::error::Result;
use crate::melt::{bind_schema, explode_list, project_object_with, with_row_key, FlattenConfig, Flattener};
use crate::output::{StorageSink, TableWriter, WrittenTable};
use crate::policy::{anonymize, force_integer, normalize_timestamps};
use crate::schema::Schema;
use crate::source::{DocumentSource, Window};
use crate::types::{Table, KEY_ID, KEY_PARENT_ID, KEY_REQUEST_ID};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info};

/// A table ready to be written
struct PendingTable {
    name: String,
    schema_path: PathBuf,
    table: Table,
}

/// What one run produced
#[derive(Debug, Default)]
pub struct RunSummary {
    pub documents: usize,
    pub tables: Vec<WrittenTable>,
}

impl RunSummary {
    pub fn total_records(&self) -> usize {
        self.tables.iter().map(|t| t.manifest.total_records).sum()
    }
}

pub struct Pipeline<S: StorageSink> {
    plan: PipelinePlan,
    flattener: Flattener,
    writer: TableWriter<S>,
}

impl<S: StorageSink> Pipeline<S> {
    pub fn new(plan: PipelinePlan, writer: TableWriter<S>) -> Self {
        let flattener = Flattener::new(FlattenConfig {
            identifier: plan.identifier.clone(),
            ..FlattenConfig::default()
        });
        Pipeline {
            plan,
            flattener,
            writer,
        }
    }

    /// Fetch the window's documents from `source` and run every dataset.
    pub fn run_window(&mut self, source: &mut dyn DocumentSource, window: &Window) -> Result<RunSummary> {
        let batch = source.fetch(window)?;
        self.run(&batch)
    }

    /// Run every dataset of the plan over `batch`.
    pub fn run(&mut self, batch: &[Value]) -> Result<RunSummary> {
        let flat = self.flattener.normalize(batch)?;
        let builder = TableBuilder {
            plan: &self.plan,
            flattener: &self.flattener,
        };
        let mut summary = RunSummary {
            documents: batch.len(),
            tables: Vec::new(),
        };

        for dataset in &self.plan.datasets {
            info!(dataset = %dataset.name, "processing dataset");

            for table in builder.dataset(&flat, batch, dataset)? {
                let written = self
                    .writer
                    .write(&table.table, &table.schema_path, &table.name)?;
                summary.tables.push(written);
            }
        }

        info!(
            documents = summary.documents,
            tables = summary.tables.len(),
            records = summary.total_records(),
            "run complete"
        );
        Ok(summary)
    }
}

/// Builds the tables of one dataset without writing anything.
struct TableBuilder<'a> {
    plan: &'a PipelinePlan,
    flattener: &'a Flattener,
}

impl TableBuilder<'_> {
    fn dataset(&self, flat: &Table, batch: &[Value], dataset: &DatasetPlan) -> Result<Vec<PendingTable>> {
        let schema_path = self.plan.schema_path(&dataset.schema);
        let schema = Schema::load(&schema_path)?;
        let path = dataset.path_segments();

        let base = match dataset.mode {
            DatasetMode::Project => {
                project_object_with(flat, &path, &self.flattener.config().separator)
            }
            DatasetMode::Embed => {
                self.flattener
                    .embed_json(batch, &path, dataset.embed_column())?
            }
        };

        let mut pending = vec![PendingTable {
            name: dataset.name.clone(),
            schema_path,
            table: apply_policy(schema.reindex(&base), &dataset.policy)?,
        }];

        for list in &dataset.lists {
            self.list(&base, list, &[], KEY_REQUEST_ID, &mut pending)?;
        }
        Ok(pending)
    }

    /// Explode `list` out of `parent`, then recurse into its own lists.
    /// `keys` are the parent columns copied onto each child row and
    /// `row_key_base` seeds the `key_id` of rows that have children.
    fn list(
        &self,
        parent: &Table,
        list: &ListPlan,
        keys: &[&str],
        row_key_base: &str,
        pending: &mut Vec<PendingTable>,
    ) -> Result<()> {
        let schema_path = self.plan.schema_path(&list.schema);
        let schema = Schema::load(&schema_path)?;

        let mut exploded = explode_list(parent, &list.key, None, keys);
        if !list.lists.is_empty() {
            exploded = with_row_key(exploded, row_key_base, KEY_ID)?;
        }

        let shaped = match list.shape {
            ListShape::Bound => bind_schema(&exploded, &schema),
            ListShape::Reindex => schema.reindex(&exploded),
        };
        debug!(table = %list.table, rows = shaped.len(), "list table built");

        pending.push(PendingTable {
            name: list.table.clone(),
            schema_path,
            table: apply_policy(shaped, &list.policy)?,
        });

        if !list.lists.is_empty() {
            exploded.rename_column(KEY_ID, KEY_PARENT_ID);
            for child in &list.lists {
                self.list(&exploded, child, &[KEY_PARENT_ID], KEY_PARENT_ID, pending)?;
            }
        }
        Ok(())
    }
}

/// Timestamps, then integers, then digests.
fn apply_policy(table: Table, policy: &PolicyPlan) -> Result<Table> {
    if policy.is_empty() {
        return Ok(table);
    }
    let table = normalize_timestamps(table, &policy.timestamps, policy.timestamp_offset()?)?;
    let table = force_integer(table, &policy.integer)?;
    anonymize(table, &policy.hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::DryRunSink;
    use chrono::NaiveDate;
    use serde_json::json;
    use std::path::Path;

    fn write_schema(dir: &Path, file: &str, names: &[&str]) {
        let fields: Vec<_> = names.iter().map(|n| json!({"name": n, "type": "STRING"})).collect();
        std::fs::write(dir.join(file), serde_json::to_string(&fields).unwrap()).unwrap();
    }

    fn pipeline(dir: &Path, plan: &str) -> Pipeline<DryRunSink> {
        let plan = PipelinePlan::parse(plan, dir).unwrap();
        let writer = TableWriter::new(
            dir.join("out"),
            "kw",
            NaiveDate::from_ymd_opt(2023, 5, 1).unwrap(),
            DryRunSink,
        );
        Pipeline::new(plan, writer)
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[test]
    fn test_two_level_lists_link_by_parent_key() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(dir.path(), "tdg.json", &["key_request_id", "status"]);
        write_schema(dir.path(), "results.json", &["key_request_id", "key_id", "total_score"]);
        write_schema(dir.path(), "scores.json", &["key_parent_id", "product", "scores_score_100"]);

        let mut pipeline = pipeline(
            dir.path(),
            r#"
            [[dataset]]
            name = "tdg"
            path = ["input", "tdg"]
            schema = "tdg.json"

            [[dataset.lists]]
            key = "results"
            table = "tdg_results"
            schema = "results.json"
            shape = "reindex"
            policy = { integer = ["total_score"] }

            [[dataset.lists.lists]]
            key = "product_scores"
            table = "tdg_results_product_scores"
            schema = "scores.json"
            policy = { integer = ["scores_score_100"] }
            "#,
        );

        let batch = vec![
            json!({"_id": "r1", "input": {"tdg": {"status": "ok", "results": [
                {"total_score": "10", "product_scores": [{"product": "p1", "scores": {"score_100": "55"}}]},
                {"total_score": "20", "product_scores": []}
            ]}}}),
            json!({"_id": "r2", "input": {"tdg": {"status": "none", "results": []}}}),
        ];

        let summary = pipeline.run(&batch).unwrap();
        let names: Vec<_> = summary.tables.iter().map(|t| t.table_name.as_str()).collect();
        assert_eq!(names, vec!["tdg", "tdg_results", "tdg_results_product_scores"]);

        let results = read(summary.tables[1].data_file.as_ref().unwrap());
        assert_eq!(
            results,
            "key_request_id,key_id,total_score\nr1,r1_0,10\nr1,r1_1,20\nr2,r2_2,\n"
        );

        let scores = read(summary.tables[2].data_file.as_ref().unwrap());
        assert_eq!(
            scores,
            "key_parent_id,product,scores_score_100\nr1_0,p1,55\nr1_1,,\nr2_2,,\n"
        );
    }

    #[test]
    fn test_policies_and_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(dir.path(), "wl.json", &["key_request_id", "mobile", "limit"]);
        write_schema(dir.path(), "missing.json", &["key_request_id", "x"]);

        let mut pipeline = pipeline(
            dir.path(),
            r#"
            [[dataset]]
            name = "financial_whitelist"
            path = ["input", "whitelist"]
            schema = "wl.json"
            policy = { hash = ["mobile"], integer = ["limit"] }

            [[dataset]]
            name = "bankruptcy"
            path = ["input", "bankruptcy"]
            schema = "missing.json"
            policy = { integer = ["x"] }
            "#,
        );

        let batch = vec![json!({"_id": "r1", "input": {"whitelist": {"mobile": "0811111111", "limit": "5000"}}})];
        let summary = pipeline.run(&batch).unwrap();

        let whitelist = read(summary.tables[0].data_file.as_ref().unwrap());
        let row = whitelist.lines().nth(1).unwrap();
        let cells: Vec<_> = row.split(',').collect();
        assert_eq!(cells[0], "r1");
        assert_eq!(cells[1], crate::policy::digest_value(&json!("0811111111")));
        assert_eq!(cells[2], "5000");

        let bankruptcy = &summary.tables[1];
        assert!(bankruptcy.data_file.is_none());
        assert_eq!(bankruptcy.manifest.total_records, 0);
    }

    #[test]
    fn test_coercion_failure_aborts_before_later_datasets() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(dir.path(), "a.json", &["key_request_id", "n"]);

        let mut pipeline = pipeline(
            dir.path(),
            r#"
            [[dataset]]
            name = "first"
            path = ["a"]
            schema = "a.json"
            policy = { integer = ["n"] }

            [[dataset]]
            name = "second"
            path = ["a"]
            schema = "a.json"
            "#,
        );

        let batch = vec![json!({"_id": "r1", "a": {"n": "abc"}})];
        let err = pipeline.run(&batch).unwrap_err();

        assert!(matches!(err, crate::Error::TypeCoercion { .. }));
        assert!(!dir.path().join("out/kw/second").exists());
        assert!(!dir.path().join("out/kw/first").exists());
    }

    #[test]
    fn test_list_output_follows_schema_not_elements() {
        let dir = tempfile::tempdir().unwrap();
        write_schema(dir.path(), "a.json", &["key_request_id"]);
        write_schema(dir.path(), "items.json", &["key_request_id", "v"]);

        let mut pipeline = pipeline(
            dir.path(),
            r#"
            [[dataset]]
            name = "a"
            schema = "a.json"

            [[dataset.lists]]
            key = "items"
            table = "a_items"
            schema = "items.json"
            shape = "reindex"
            "#,
        );

        let batch = vec![
            json!({"_id": "r1", "items": [{"extra": 2, "v": 1}]}),
            json!({"_id": "r2", "items": []}),
        ];
        let summary = pipeline.run(&batch).unwrap();

        assert_eq!(
            read(summary.tables[1].data_file.as_ref().unwrap()),
            "key_request_id,v\nr1,1\nr2,\n"
        );
    }
}
