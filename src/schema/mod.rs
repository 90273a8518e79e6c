//! Externally declared table schemas
//!
//! Schemas are the single source of truth for the column set and column
//! order of every table the pipeline writes.

pub mod registry;

pub use registry::Schema;
