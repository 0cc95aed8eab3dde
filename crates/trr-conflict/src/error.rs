use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConflictError>;

#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("storage error: {0}")]
    Storage(#[from] trr_storage::StorageError),
    #[error("conflict not found: {0}")]
    NotFound(uuid::Uuid),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}
