//! Storage sinks receiving finished artifacts

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Destination for files produced by the table writer. An upload error is
/// fatal to the run.
pub trait StorageSink {
    /// Hand over `local_path`, to be stored under `object_key`
    /// (`{bucket}/{table}/{year}/{file}`).
    fn upload(&mut self, local_path: &Path, object_key: &str) -> Result<()>;
}

impl<S: StorageSink + ?Sized> StorageSink for &mut S {
    fn upload(&mut self, local_path: &Path, object_key: &str) -> Result<()> {
        (**self).upload(local_path, object_key)
    }
}

impl<S: StorageSink + ?Sized> StorageSink for Box<S> {
    fn upload(&mut self, local_path: &Path, object_key: &str) -> Result<()> {
        (**self).upload(local_path, object_key)
    }
}

/// Copies every artifact below a destination root, keyed by object key.
/// Stands in for an object store mounted or synced as a directory.
#[derive(Debug, Clone)]
pub struct MirrorSink {
    root: PathBuf,
}

impl MirrorSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MirrorSink { root: root.into() }
    }
}

impl StorageSink for MirrorSink {
    fn upload(&mut self, local_path: &Path, object_key: &str) -> Result<()> {
        let target = self.root.join(object_key);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::ExternalService {
                service: "storage sink",
                reason: format!("{}: {}", parent.display(), e),
            })?;
        }
        std::fs::copy(local_path, &target).map_err(|e| Error::ExternalService {
            service: "storage sink",
            reason: format!("{} -> {}: {}", local_path.display(), target.display(), e),
        })?;

        info!(object = object_key, "uploaded");
        Ok(())
    }
}

/// Logs what would be uploaded and keeps files in the staging area only.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunSink;

impl StorageSink for DryRunSink {
    fn upload(&mut self, local_path: &Path, object_key: &str) -> Result<()> {
        info!(
            object = object_key,
            local = %local_path.display(),
            "dry run, skipping upload"
        );
        Ok(())
    }
}
