//! Integrity manifests
//!
//! One manifest accompanies every written table:
//!
//! ```text
//! <sha256> <data file>        (only when a data file was written)
//! <sha256> <schema file>
//! total_records <n>
//! ```

use crate::error::{Error, Result};
use crate::policy::sha256_hex;
use std::fmt;
use std::path::Path;

const TOTAL_RECORDS: &str = "total_records";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub digest: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
    pub total_records: usize,
}

impl Manifest {
    pub fn new(total_records: usize) -> Self {
        Manifest {
            entries: Vec::new(),
            total_records,
        }
    }

    /// Record the digest of the file at `path` under its file name.
    pub fn add_file(&mut self, path: &Path) -> Result<&ManifestEntry> {
        let digest = file_digest(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.entries.push(ManifestEntry { digest, file_name });
        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn digest_of(&self, file_name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.file_name == file_name)
            .map(|e| e.digest.as_str())
    }

    pub fn parse(text: &str) -> Result<Self> {
        let invalid = |reason: String| Error::Integrity {
            file: "manifest".to_string(),
            reason,
        };

        let mut manifest = Manifest::default();
        let mut total = None;
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let (left, right) = line
                .split_once(' ')
                .ok_or_else(|| invalid(format!("malformed line '{}'", line)))?;
            if left == TOTAL_RECORDS {
                let n = right
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("bad record count '{}'", right)))?;
                total = Some(n);
            } else {
                manifest.entries.push(ManifestEntry {
                    digest: left.to_string(),
                    file_name: right.to_string(),
                });
            }
        }

        manifest.total_records = total.ok_or_else(|| invalid("no total_records line".to_string()))?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::parse(&text)
    }

    /// Recompute the digest of every listed file found in `dir`.
    pub fn verify(&self, dir: &Path) -> Result<()> {
        for entry in &self.entries {
            let actual = file_digest(&dir.join(&entry.file_name))?;
            if actual != entry.digest {
                return Err(Error::Integrity {
                    file: entry.file_name.clone(),
                    reason: format!("expected {}, found {}", entry.digest, actual),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{} {}", entry.digest, entry.file_name)?;
        }
        writeln!(f, "{} {}", TOTAL_RECORDS, self.total_records)
    }
}

pub fn file_digest(path: &Path) -> Result<String> {
    let content = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(sha256_hex(&content))
}
