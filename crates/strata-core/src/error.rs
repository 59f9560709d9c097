//! Error Types for Strata Core
//!
//! Only validation failures of core value types live here. Device, admission
//! and object storage failures are defined by `strata-storage`, which wraps
//! this error via `#[from]`.
//!
//! ## Usage
//! ```ignore
//! use strata_core::{DataBlockIndex, StreamRange};
//!
//! let range = StreamRange::new(100, 50)?; // Err(Error::InvalidStreamRange { .. })
//! ```

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid stream range: start offset {start} must be below end offset {end}")]
    InvalidStreamRange { start: u64, end: u64 },

    #[error("Invalid data block: {0}")]
    InvalidBlock(String),
}

pub type Result<T> = std::result::Result<T, Error>;
