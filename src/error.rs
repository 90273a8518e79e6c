use std::path::PathBuf;
use thiserror::Error;

/// Everything that can abort a run. There is no recoverable variant: the
/// pipeline stops at the first error it sees.
#[derive(Error, Debug)]
pub enum Error {
    #[error("schema definition {path}: {reason}")]
    Schema { path: PathBuf, reason: String },

    #[error("column '{column}': cannot coerce {value} to {target}")]
    TypeCoercion {
        column: String,
        value: String,
        target: &'static str,
    },

    #[error("document {index} has no '{field}' identifier")]
    MissingIdentifier { index: usize, field: String },

    #[error("column '{0}' is not present in the table")]
    MissingColumn(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("integrity check of {file} failed: {reason}")]
    Integrity { file: String, reason: String },

    #[error("{service} failed: {reason}")]
    ExternalService { service: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
