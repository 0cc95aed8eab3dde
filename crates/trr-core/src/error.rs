//! Error taxonomy shared across the TRRCMS core (spec.md §7)

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error kinds. Every downstream crate's error type either wraps one
/// of these via `#[from]` or is itself wrapped into this at a component
/// boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input that the caller can fix and retry.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Lookup by an ID that does not exist. Never fatal.
    #[error("not found: {0}")]
    NotFound(String),

    /// A state conflict, e.g. a duplicate package id or a commit-time
    /// referential failure. Ingest treats duplicate package ids as an
    /// idempotent success rather than surfacing this.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Bad or expired bearer token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// I/O failure or transaction abort in the storage layer.
    #[error("storage error: {0}")]
    Storage(String),
}
