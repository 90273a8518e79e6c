//! JSON melting - flatten nested documents into relational tables
//!
//! A batch is first normalized into one wide table with one row per
//! document. Sub-objects are then projected into their own tables and
//! array fields are exploded into child tables linked by key columns.
//!
//! ## Keys
//!
//! Every normalized row carries `key_request_id`. Exploded lists that have
//! lists of their own get a synthetic `key_id`, which their children carry
//! as `key_parent_id`.

pub mod explode;
pub mod normalize;
pub mod project;

pub use explode::{bind_schema, explode_list, with_row_key};
pub use normalize::{FlattenConfig, Flattener};
pub use project::{project_object, project_object_with};
