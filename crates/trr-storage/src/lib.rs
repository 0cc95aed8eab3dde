//! Transactional storage contract consumed by the ingest pipeline, conflict
//! engine, and spatial query service (spec.md §6.1). Sled is the concrete
//! realization; the contract itself is the `Store` type's public API plus
//! `spatial::IndexedBackend`.

pub mod error;
pub mod spatial;
pub mod store;

pub use error::{Result, StorageError};
pub use store::{PendingWrite, Store};
