//! Stream Data Block
//!
//! A [`StreamDataBlock`] is one block of one object, seen from the stream it
//! belongs to. It carries the block's identity and a single data slot that is
//! filled once by whoever fetches the block and observed by any number of
//! readers.
//!
//! ## Data State
//!
//! ```text
//!            complete(bytes)
//!  Pending ──────────────────► Ready(bytes) ──free()──► Released
//!     │  fail(msg) / cancel()
//!     └──────────────────────► Failed / Cancelled
//! ```
//!
//! Only a pending block can be settled; the first writer wins. `free` may be
//! called at any point, any number of times. If the data is not there yet it
//! is dropped as soon as it arrives.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use strata_core::{DataBlockIndex, StreamRange};
use tokio::sync::watch;

/// Data slot of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockData {
    Pending,
    Ready(Bytes),
    Failed(String),
    Cancelled,
    Released,
}

impl BlockData {
    pub fn is_pending(&self) -> bool {
        matches!(self, BlockData::Pending)
    }
}

#[derive(Debug)]
pub struct StreamDataBlock {
    stream_id: u64,
    range: StreamRange,
    object_id: u64,
    index: DataBlockIndex,
    state: watch::Sender<BlockData>,
    freed: AtomicBool,
}

impl StreamDataBlock {
    /// Create a pending block. `end_offset` must be greater than `start_offset`.
    pub fn new(
        stream_id: u64,
        start_offset: u64,
        end_offset: u64,
        object_id: u64,
        index: DataBlockIndex,
    ) -> Result<Self> {
        let range = StreamRange::new(start_offset, end_offset)?;
        let (state, _) = watch::channel(BlockData::Pending);

        Ok(Self {
            stream_id,
            range,
            object_id,
            index,
            state,
            freed: AtomicBool::new(false),
        })
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    pub fn start_offset(&self) -> u64 {
        self.range.start_offset
    }

    pub fn end_offset(&self) -> u64 {
        self.range.end_offset
    }

    pub fn stream_range(&self) -> StreamRange {
        self.range
    }

    pub fn stream_range_size(&self) -> u64 {
        self.range.len()
    }

    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    pub fn data_block_index(&self) -> &DataBlockIndex {
        &self.index
    }

    pub fn block_id(&self) -> u32 {
        self.index.block_id
    }

    pub fn block_start_position(&self) -> u64 {
        self.index.start_position
    }

    pub fn block_end_position(&self) -> u64 {
        self.index.end_position()
    }

    pub fn block_size(&self) -> u32 {
        self.index.size
    }

    pub fn record_count(&self) -> u32 {
        self.index.record_count
    }

    /// Fill the block with fetched data. Returns false if it was already settled.
    pub fn complete(&self, data: Bytes) -> bool {
        self.state.send_if_modified(|state| {
            if !state.is_pending() {
                return false;
            }
            // Freed before the data arrived: drop it right away
            *state = if self.freed.load(Ordering::Acquire) {
                BlockData::Released
            } else {
                BlockData::Ready(data)
            };
            true
        })
    }

    /// Settle a pending block with a fetch error.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.settle(BlockData::Failed(message))
    }

    /// Settle a pending block with no data.
    pub fn cancel(&self) -> bool {
        self.settle(BlockData::Cancelled)
    }

    fn settle(&self, outcome: BlockData) -> bool {
        self.state.send_if_modified(|state| {
            if !state.is_pending() {
                return false;
            }
            *state = outcome;
            true
        })
    }

    /// Wait for the block to settle and return its data.
    pub async fn data(&self) -> Result<Bytes> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|state| !state.is_pending())
            .await
            .map_err(|_| Error::BlockCancelled)?;

        match &*state {
            BlockData::Ready(data) => Ok(data.clone()),
            BlockData::Failed(message) => Err(Error::BlockLoadFailed(message.clone())),
            BlockData::Released => Err(Error::BlockReleased),
            BlockData::Cancelled | BlockData::Pending => Err(Error::BlockCancelled),
        }
    }

    /// Snapshot of the data slot.
    pub fn state(&self) -> BlockData {
        self.state.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), BlockData::Ready(_))
    }

    pub fn is_freed(&self) -> bool {
        self.freed.load(Ordering::Acquire)
    }

    /// Release the block's data. Safe to call more than once, and before
    /// or without the data ever arriving.
    pub fn free(&self) {
        if self.freed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.send_if_modified(|state| {
            if matches!(state, BlockData::Ready(_)) {
                *state = BlockData::Released;
                true
            } else {
                false
            }
        });
    }

    /// Logical stream order: by stream, then start offset.
    pub fn cmp_by_stream_offset(a: &Self, b: &Self) -> CmpOrdering {
        (a.stream_id, a.range.start_offset).cmp(&(b.stream_id, b.range.start_offset))
    }

    /// Physical order within an object: by block start position.
    pub fn cmp_by_block_position(a: &Self, b: &Self) -> CmpOrdering {
        a.index.start_position.cmp(&b.index.start_position)
    }
}

impl PartialEq for StreamDataBlock {
    fn eq(&self, other: &Self) -> bool {
        self.stream_id == other.stream_id
            && self.range == other.range
            && self.object_id == other.object_id
            && self.index == other.index
    }
}

impl Eq for StreamDataBlock {}

impl Hash for StreamDataBlock {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stream_id.hash(state);
        self.range.hash(state);
        self.object_id.hash(state);
        self.index.hash(state);
    }
}

impl fmt::Display for StreamDataBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StreamDataBlock{{stream_id={}, offsets=[{}, {}), object_id={}, position={}, size={}}}",
            self.stream_id,
            self.range.start_offset,
            self.range.end_offset,
            self.object_id,
            self.index.start_position,
            self.index.size
        )
    }
}
