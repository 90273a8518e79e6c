//! Table output: CSV data files, schema copies, manifests and sinks

pub mod manifest;
pub mod sink;
pub mod writer;

pub use manifest::{Manifest, ManifestEntry};
pub use sink::{DryRunSink, MirrorSink, StorageSink};
pub use writer::{TableWriter, WrittenTable};
