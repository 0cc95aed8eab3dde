//! Error taxonomy for the sync boundary (spec.md §7)

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("storage error: {0}")]
    Storage(#[from] trr_storage::StorageError),

    #[error("ingest error: {0}")]
    Ingest(#[from] trr_ingest::IngestError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad or expired token")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),
}

impl From<SyncError> for trr_core::Error {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Unauthorized => trr_core::Error::Unauthorized("bad or expired token".into()),
            SyncError::Storage(s) => s.into(),
            SyncError::Ingest(i) => i.into(),
            other => trr_core::Error::InvalidInput(other.to_string()),
        }
    }
}
