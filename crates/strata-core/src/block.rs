//! Stream Data Block Metadata
//!
//! Stream data uploaded to object storage is packed into objects, and each
//! object is split into data blocks. A block is the unit a reader fetches,
//! caches, and accounts against the inflight read budget.
//!
//! ## Layout
//!
//! ```text
//! object 42
//! ┌───────────────┬───────────────┬───────────────┬─────────┐
//! │ block 0       │ block 1       │ block 2       │ index   │
//! │ stream 7      │ stream 7      │ stream 9      │         │
//! │ offsets 0-99  │ offsets 100-  │ offsets 0-49  │         │
//! └───────────────┴───────────────┴───────────────┴─────────┘
//! ▲ start_position              ▲ start_position + size
//! ```
//!
//! - [`DataBlockIndex`] locates a block inside its object (physical view)
//! - [`StreamRange`] is the half-open logical offset range `[start, end)` of
//!   one stream covered by a block

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Location of a data block inside an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataBlockIndex {
    /// Block number within the object
    pub block_id: u32,

    /// Byte position of the block within the object
    pub start_position: u64,

    /// Block length in bytes
    pub size: u32,

    /// Number of records stored in the block
    pub record_count: u32,
}

impl DataBlockIndex {
    pub fn new(block_id: u32, start_position: u64, size: u32, record_count: u32) -> Result<Self> {
        if start_position.checked_add(size as u64).is_none() {
            return Err(Error::InvalidBlock(format!(
                "block {} at position {} with size {} overflows the object",
                block_id, start_position, size
            )));
        }
        Ok(Self {
            block_id,
            start_position,
            size,
            record_count,
        })
    }

    /// Byte position one past the end of the block.
    pub fn end_position(&self) -> u64 {
        self.start_position + self.size as u64
    }
}

/// Half-open offset range `[start_offset, end_offset)` of a single stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamRange {
    pub start_offset: u64,
    pub end_offset: u64,
}

impl StreamRange {
    /// Create a range, rejecting empty or inverted ones.
    pub fn new(start_offset: u64, end_offset: u64) -> Result<Self> {
        if end_offset <= start_offset {
            return Err(Error::InvalidStreamRange {
                start: start_offset,
                end: end_offset,
            });
        }
        Ok(Self {
            start_offset,
            end_offset,
        })
    }

    /// Number of offsets covered.
    pub fn len(&self) -> u64 {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start_offset && offset < self.end_offset
    }
}
