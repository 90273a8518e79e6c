use crate::error::{Error, Result};
use crate::output::manifest::Manifest;
use crate::output::sink::StorageSink;
use crate::types::{canonical_string, Table};
use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Paths and manifest of one written table
#[derive(Debug, Clone)]
pub struct WrittenTable {
    pub table_name: String,
    pub directory: PathBuf,
    pub data_file: Option<PathBuf>,
    pub schema_file: PathBuf,
    pub manifest_file: PathBuf,
    pub manifest: Manifest,
}

/// Writes tables as CSV plus schema copy plus manifest into a staging area
/// laid out as `{staging}/{bucket}/{table}/{year}/`, then hands every file
/// to a [`StorageSink`].
pub struct TableWriter<S: StorageSink> {
    staging_root: PathBuf,
    bucket: String,
    as_of: NaiveDate,
    sink: S,
}

impl<S: StorageSink> TableWriter<S> {
    pub fn new(
        staging_root: impl Into<PathBuf>,
        bucket: impl Into<String>,
        as_of: NaiveDate,
        sink: S,
    ) -> Self {
        TableWriter {
            staging_root: staging_root.into(),
            bucket: bucket.into(),
            as_of,
            sink,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Write one table. The data file is skipped for a zero-row table; the
    /// schema copy and the manifest are always written.
    pub fn write(&mut self, table: &Table, schema_path: &Path, table_name: &str) -> Result<WrittenTable> {
        let year = self.as_of.year().to_string();
        let date = self.as_of.format("%Y%m%d").to_string();
        let key_prefix = format!("{}/{}/{}", self.bucket, table_name, year);

        let directory = self.staging_root.join(&self.bucket).join(table_name).join(&year);
        std::fs::create_dir_all(&directory).map_err(|e| Error::io(&directory, e))?;

        let mut manifest = Manifest::new(table.len());

        let data_file = if table.is_empty() {
            debug!(table = table_name, "no rows, skipping data file");
            None
        } else {
            let path = directory.join(format!("{}_{}_1.csv", table_name, date));
            write_csv(table, &path)?;
            manifest.add_file(&path)?;
            Some(path)
        };

        let schema_file = directory.join(format!("{}_{}.schema", table_name, date));
        std::fs::copy(schema_path, &schema_file).map_err(|e| Error::io(schema_path, e))?;
        manifest.add_file(&schema_file)?;

        let manifest_file = directory.join(format!("{}_{}.sha256", table_name, date));
        std::fs::write(&manifest_file, manifest.to_string())
            .map_err(|e| Error::io(&manifest_file, e))?;

        let uploads = data_file
            .iter()
            .chain([&schema_file, &manifest_file]);
        for path in uploads {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.sink.upload(path, &format!("{}/{}", key_prefix, file_name))?;
        }

        info!(table = table_name, rows = table.len(), "table written");

        Ok(WrittenTable {
            table_name: table_name.to_string(),
            directory,
            data_file,
            schema_file,
            manifest_file,
            manifest,
        })
    }
}

/// Serialize `table` as CSV: a header of its columns, nulls as empty fields.
pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(canonical_string))?;
    }
    writer.flush().map_err(|e| Error::io(path, e))
}
