//! Error taxonomy for the ingest pipeline (spec.md §7)

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("storage error: {0}")]
    Storage(#[from] trr_storage::StorageError),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedded-db package error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Anything that aborts the pipeline before staging completes and
    /// routes the package to quarantine (spec.md §4.4 "Quarantine").
    #[error("{0}")]
    Fatal(String),
}

impl From<IngestError> for trr_core::Error {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Storage(s) => s.into(),
            other => trr_core::Error::InvalidInput(other.to_string()),
        }
    }
}
