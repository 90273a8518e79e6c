//! Declarative pipeline plans
//!
//! A plan lists, in run order, every dataset to extract from a document
//! batch: which object to project, which schema shapes it, which column
//! policies apply and which of its array fields become child tables.
//! Unknown keys are rejected, so a misspelled policy never goes unnoticed.
//!
//! ```toml
//! identifier = "_id"
//!
//! [[dataset]]
//! name = "tdg"
//! path = ["decision_input_data", "tdg"]
//! schema = "schema/tdg/tdg_schema.json"
//!
//! [[dataset.lists]]
//! key = "results"
//! table = "tdg_results"
//! schema = "schema/tdg/tdg_results_schema.json"
//! shape = "reindex"
//! policy = { integer = ["total_score"] }
//!
//! [[dataset.lists.lists]]
//! key = "product_scores"
//! table = "tdg_results_product_scores"
//! schema = "schema/tdg/tdg_results_product_scores_schema.json"
//! ```

use crate::error::{Error, Result};
use crate::types::{KEY_ID, KEY_PARENT_ID, KEY_REQUEST_ID};
use chrono::FixedOffset;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn default_identifier() -> String {
    String::from("_id")
}

/// The full set of datasets for one run, in run order
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelinePlan {
    /// Top-level document field holding the document identifier
    #[serde(default = "default_identifier")]
    pub identifier: String,

    #[serde(rename = "dataset", default)]
    pub datasets: Vec<DatasetPlan>,

    /// Directory that relative schema paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// How a dataset's top-level table is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetMode {
    /// Project the object at `path` into columns
    #[default]
    Project,
    /// Store the sub-tree at `path` as one JSON text column
    Embed,
}

/// How an exploded list's own table is shaped before writing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListShape {
    /// Reindex to the schema and drop rows from empty lists
    #[default]
    Bound,
    /// Reindex to the schema, keeping rows from empty lists
    Reindex,
}

/// Column policies for one table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyPlan {
    /// Columns cast to nullable integers
    #[serde(default)]
    pub integer: Vec<String>,

    /// Columns replaced by their SHA-256 digest
    #[serde(default)]
    pub hash: Vec<String>,

    /// Columns rewritten as UTC timestamps
    #[serde(default)]
    pub timestamps: Vec<String>,

    /// Offset, in hours, of timestamps written without one
    #[serde(default)]
    pub timestamp_offset_hours: i32,
}

impl PolicyPlan {
    pub fn is_empty(&self) -> bool {
        self.integer.is_empty() && self.hash.is_empty() && self.timestamps.is_empty()
    }

    pub fn timestamp_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.timestamp_offset_hours * 3600).ok_or_else(|| {
            Error::Config(format!(
                "timestamp offset of {} hours is out of range",
                self.timestamp_offset_hours
            ))
        })
    }

    /// Key columns link tables together and must reach the output as is.
    fn check(&self, table: &str) -> Result<()> {
        self.timestamp_offset()?;
        let named = self.integer.iter().chain(&self.hash).chain(&self.timestamps);
        for column in named {
            if [KEY_REQUEST_ID, KEY_PARENT_ID, KEY_ID].contains(&column.as_str()) {
                return Err(Error::Config(format!(
                    "table '{}': key column '{}' cannot take a column policy",
                    table, column
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetPlan {
    /// Table name of the dataset's top-level table
    pub name: String,

    /// Object path inside each document; empty for the document root
    #[serde(default)]
    pub path: Vec<String>,

    pub schema: PathBuf,

    #[serde(default)]
    pub mode: DatasetMode,

    /// Column name for [`DatasetMode::Embed`]; defaults to the last path segment
    #[serde(default)]
    pub column: Option<String>,

    #[serde(default)]
    pub policy: PolicyPlan,

    #[serde(default)]
    pub lists: Vec<ListPlan>,
}

impl DatasetPlan {
    pub fn path_segments(&self) -> Vec<&str> {
        self.path.iter().map(String::as_str).collect()
    }

    pub fn embed_column(&self) -> &str {
        self.column
            .as_deref()
            .or_else(|| self.path.last().map(String::as_str))
            .unwrap_or(self.name.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListPlan {
    /// Array column of the parent table
    pub key: String,

    /// Output table name
    pub table: String,

    pub schema: PathBuf,

    #[serde(default)]
    pub shape: ListShape,

    #[serde(default)]
    pub policy: PolicyPlan,

    /// Lists nested in this list's elements, linked by `key_parent_id`
    #[serde(default)]
    pub lists: Vec<ListPlan>,
}

impl PipelinePlan {
    /// Load a plan file. Relative schema paths resolve against the plan's
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&text, base_dir)
    }

    pub fn parse(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut plan: PipelinePlan =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        plan.base_dir = base_dir.into();
        plan.validate()?;
        Ok(plan)
    }

    pub fn schema_path(&self, schema: &Path) -> PathBuf {
        if schema.is_absolute() {
            schema.to_path_buf()
        } else {
            self.base_dir.join(schema)
        }
    }

    /// Every output table name, in write order.
    pub fn table_names(&self) -> Vec<&str> {
        fn walk<'a>(lists: &'a [ListPlan], out: &mut Vec<&'a str>) {
            for list in lists {
                out.push(&list.table);
                walk(&list.lists, out);
            }
        }

        let mut names = Vec::new();
        for dataset in &self.datasets {
            names.push(dataset.name.as_str());
            walk(&dataset.lists, &mut names);
        }
        names
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for name in self.table_names() {
            if !seen.insert(name) {
                return Err(Error::Config(format!("table '{}' is declared twice", name)));
            }
        }

        for dataset in &self.datasets {
            if dataset.mode == DatasetMode::Embed && !dataset.lists.is_empty() {
                return Err(Error::Config(format!(
                    "dataset '{}' embeds JSON and cannot have lists",
                    dataset.name
                )));
            }
            dataset.policy.check(&dataset.name)?;
            validate_lists(&dataset.lists)?;
        }
        Ok(())
    }
}

fn validate_lists(lists: &[ListPlan]) -> Result<()> {
    for list in lists {
        list.policy.check(&list.table)?;
        validate_lists(&list.lists)?;
    }
    Ok(())
}
