//! WAL Device Channel
//!
//! Low-level positional I/O for the write-ahead log. The WAL lives on a raw
//! block device (or a preallocated file standing in for one) and is accessed
//! with direct I/O, so every transfer must be block aligned.
//!
//! ## Architecture
//!
//! ```text
//! WAL writer (external)
//!     │ write(bytes, position)        position issued by the log sequencer
//!     ▼
//! ┌──────────────────────┐
//! │ BlockDeviceChannel   │
//! │ - capacity checks    │  ◄── CapacityReader (header owned externally)
//! │ - staging buffers    │
//! └──────────┬───────────┘
//!            │ pwrite/pread, aligned, O_DIRECT
//!            ▼
//!     /dev/nvme0n1  or  /data/wal.img
//! ```
//!
//! ## Open vs Recovery
//!
//! - **Fresh init** (`recovery_mode = false`): the requested capacity is
//!   authoritative. A file is created and sized to it; an existing file or
//!   device must agree with it.
//! - **Recovery** (`recovery_mode = true`): the WAL must already exist. The
//!   on-disk size (file) or the persisted header (block device) decides the
//!   capacity.
//!
//! ## Usage
//!
//! ```ignore
//! use strata_storage::wal::{BlockDeviceChannel, WalChannel};
//! use strata_storage::WalChannelConfig;
//!
//! let mut channel = BlockDeviceChannel::new("/dev/nvme0n1", 1 << 30, WalChannelConfig::default())?;
//! channel.open(Some(&header_reader))?;
//!
//! channel.write(&record_block, 0)?;
//! let mut buf = vec![0u8; 100];
//! channel.read(&mut buf, 10)?;
//!
//! channel.close();
//! ```

mod block_device;
mod staging;

pub use block_device::{BlockDeviceChannel, DeviceKind};
pub use staging::AlignedBuffer;

use crate::error::Result;
use std::path::Path;

/// Positional, block-aligned access to WAL storage.
///
/// Writers issue positions; the channel does not serialize them. Transfers
/// to disjoint ranges may run concurrently from different threads.
pub trait WalChannel: Send + Sync {
    /// Open the underlying storage and resolve its capacity.
    fn open(&mut self, reader: Option<&dyn CapacityReader>) -> Result<()>;

    /// Release the underlying handle. Errors are swallowed.
    fn close(&mut self);

    /// Negotiated capacity in bytes. Always `Some` after a successful open.
    fn capacity(&self) -> Option<u64>;

    fn path(&self) -> &Path;

    /// Write `src` at a block-aligned `position`. The tail is zero padded
    /// up to the next block boundary.
    fn write(&self, src: &[u8], position: u64) -> Result<()>;

    /// Fill `dst` from `position`. Position and length need not be aligned.
    fn read(&self, dst: &mut [u8], position: u64) -> Result<usize>;

    /// Make completed writes durable.
    fn flush(&self) -> Result<()>;
}

/// Reads the capacity recorded in a WAL's persisted header.
///
/// Returns `Ok(None)` when the WAL has no header yet.
pub trait CapacityReader: Send + Sync {
    fn capacity(&self, channel: &dyn WalChannel) -> Result<Option<u64>>;
}

impl<F> CapacityReader for F
where
    F: Fn(&dyn WalChannel) -> Result<Option<u64>> + Send + Sync,
{
    fn capacity(&self, channel: &dyn WalChannel) -> Result<Option<u64>> {
        self(channel)
    }
}
