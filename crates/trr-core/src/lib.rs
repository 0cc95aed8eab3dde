//! Entity types, error taxonomy, and callback ports shared by every
//! TRRCMS core crate. No I/O happens here.

pub mod error;
pub mod ports;
pub mod types;

pub use error::{Error, Result};
