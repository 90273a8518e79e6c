//! # Kiln - Document Flattening Toolkit
//!
//! Turns windowed batches of nested JSON documents into flat, schema-bound
//! tables and writes each table as CSV with a schema copy and a SHA-256
//! manifest.
//!
//! ## Modules
//!
//! - **schema**: Ordered column lists loaded from schema files
//! - **melt**: Normalize, project and explode nested documents into tables
//! - **policy**: Integer coercion, anonymization and timestamp normalisation
//! - **output**: CSV writer, manifests and storage sinks
//! - **pipeline**: Plan-driven runs over a document batch
//! - **source** / **secrets**: Document and secret collaborators
//!
//! ## Quick Start
//!
//! ```rust
//! use kiln::melt::{explode_list, project_object, FlattenConfig, Flattener};
//! use serde_json::json;
//!
//! # fn main() -> kiln::Result<()> {
//! let batch = vec![json!({
//!     "_id": "r1",
//!     "input": {"application": {"name": "Alice", "items": [{"v": 10}, {"v": 20}]}}
//! })];
//!
//! let flat = Flattener::new(FlattenConfig::default()).normalize(&batch)?;
//! let application = project_object(&flat, &["input", "application"]);
//! let items = explode_list(&application, "items", None, &[]);
//!
//! assert_eq!(items.columns(), ["key_request_id", "v"]);
//! assert_eq!(items.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod melt;
pub mod output;
pub mod pipeline;
pub mod policy;
pub mod schema;
pub mod secrets;
pub mod source;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use melt::{bind_schema, explode_list, project_object, FlattenConfig, Flattener};
pub use output::{DryRunSink, Manifest, MirrorSink, StorageSink, TableWriter, WrittenTable};
pub use pipeline::{Pipeline, PipelinePlan, RunSummary};
pub use policy::{anonymize, force_integer, normalize_timestamps};
pub use schema::Schema;
pub use source::{DocumentSource, JsonFileSource, Window};
pub use types::{Table, KEY_PARENT_ID, KEY_REQUEST_ID};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_basic_flattening() {
        let batch = vec![json!({
            "_id": "r1",
            "app": {"name": "Alice", "posts": [{"id": 10}, {"id": 11}]}
        })];

        let flat = Flattener::new(FlattenConfig::default()).normalize(&batch).unwrap();
        let app = project_object(&flat, &["app"]);
        let posts = explode_list(&app, "posts", None, &[]);

        assert_eq!(app.get(0, "name"), Some(&json!("Alice")));
        assert_eq!(posts.len(), 2);
    }
}
