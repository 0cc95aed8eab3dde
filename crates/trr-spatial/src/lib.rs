//! Geometry codec, spherical predicates, and the spatial query contract
//! (spec.md §4.1 C1, §4.2 C2). No storage I/O happens here; `trr-storage`
//! provides the indexed backend on top of these primitives.

pub mod error;
pub mod geometry;
pub mod predicates;
pub mod query;
pub mod validation;

pub use error::{GeomError, Result};
