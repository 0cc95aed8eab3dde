use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for trr_core::Error {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(id) => trr_core::Error::NotFound(id),
            other => trr_core::Error::Storage(other.to_string()),
        }
    }
}
