//! Storage Error Types
//!
//! This module defines all error types that can occur on the data path.
//!
//! ## Error Categories
//!
//! ### WAL Channel Errors
//! - `NotInitialized`: Recovery requested against a WAL that was never initialized
//! - `CapacityMismatch`: Requested, on-disk and header capacities disagree
//! - `InvalidCapacity`: Requested capacity is zero or not block aligned
//! - `Misaligned` / `OutOfBounds`: Write or read rejected before touching the device
//! - `StagingBufferTooLarge`: Request exceeds the configured staging buffer cap
//! - `Io`: Device level failure during a transfer
//!
//! ### Admission Errors
//! - `AdmissionRejected`: A single read is larger than the whole inflight budget
//! - `DuplicateReadId`: The read id already holds or awaits a quota
//! - `ReadAbandoned`: The read was released before its quota was granted
//! - `ThrottleShutdown`: The throttle was shut down
//!
//! ### Data Block Errors
//! - `BlockLoadFailed` / `BlockCancelled` / `BlockReleased`: Block data is unavailable
//! - `BlockAlreadySettled`: A load was started for a block that already has an outcome
//! - `ObjectStoreError`: Object storage fetch failed
//!
//! ## Usage
//!
//! Every failure is terminal for the operation in hand. Nothing here is
//! retried internally beyond completing a short device transfer.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("WAL not initialized: {path:?}: {reason}")]
    NotInitialized { path: PathBuf, reason: String },

    #[error("WAL capacity mismatch: {path:?}: want {want}, actual {actual}")]
    CapacityMismatch {
        path: PathBuf,
        want: u64,
        actual: u64,
    },

    #[error("Invalid WAL capacity {0}: must be positive and block aligned")]
    InvalidCapacity(u64),

    #[error("Position {0} is not block aligned")]
    Misaligned(u64),

    #[error("Range [{start}, {end}) exceeds WAL capacity {capacity}")]
    OutOfBounds { start: u64, end: u64, capacity: u64 },

    #[error("WAL channel is not open: {0:?}")]
    NotOpen(PathBuf),

    #[error("Staging buffer of {requested} bytes exceeds limit {limit}")]
    StagingBufferTooLarge { requested: u64, limit: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Read size {requested} exceeds max inflight read size {max}")]
    AdmissionRejected { requested: u64, max: u64 },

    #[error("Read id {0} already has an outstanding quota")]
    DuplicateReadId(Uuid),

    #[error("Read {0} was released before its quota was granted")]
    ReadAbandoned(Uuid),

    #[error("Inflight read throttle is shut down")]
    ThrottleShutdown,

    #[error("Data block load failed: {0}")]
    BlockLoadFailed(String),

    #[error("Data block load was cancelled")]
    BlockCancelled,

    #[error("Data block was already released")]
    BlockReleased,

    #[error("Data block is already loaded or settled")]
    BlockAlreadySettled,

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),

    #[error("Core error: {0}")]
    Core(#[from] strata_core::Error),
}
