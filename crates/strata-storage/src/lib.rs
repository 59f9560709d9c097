//! Strata Storage Data Path
//!
//! This crate implements the durability and read-admission layer of Strata's
//! tiered log storage: a local write-ahead log on a raw block device for
//! low-latency commits, and bounded reads of stream data blocks from object
//! storage.
//!
//! ## Architecture Overview
//!
//! ```text
//!  produce                                  fetch
//!     │                                       │
//!     ▼                                       ▼
//! ┌────────────────────┐          ┌─────────────────────┐
//! │ BlockDeviceChannel │          │   DataBlockLoader   │
//! │ - aligned I/O      │          │ - one quota / block │
//! │ - O_DIRECT         │          └──────────┬──────────┘
//! └─────────┬──────────┘                     │ acquire / release
//!           │                     ┌──────────▼──────────┐
//!           ▼                     │ InflightReadThrottle│
//!     /dev/nvme0n1                │ - byte budget       │
//!                                 │ - FIFO, head-of-line│
//!                                 └──────────┬──────────┘
//!                                            │ GET range
//!                                            ▼
//!                                      object storage
//!                                            │
//!                                            ▼
//!                                     StreamDataBlock
//!                                   (data slot + free)
//! ```
//!
//! ## Main Components
//!
//! ### BlockDeviceChannel
//! Positional reads and writes against the WAL device. Every transfer is
//! staged through a block-aligned buffer so it can use direct I/O.
//! Capacity is negotiated on open between the requested size, the device
//! and the persisted header.
//!
//! ### InflightReadThrottle
//! Caps the bytes held by in-flight object-storage reads. Reads that do
//! not fit wait in arrival order.
//!
//! ### StreamDataBlock
//! One block of stream data with a single-writer, many-reader data slot and
//! an idempotent `free`.
//!
//! ### DataBlockLoader
//! Ties the three together on the read path: admission, ranged GET,
//! block completion, and quota release when the caller is done.
//!
//! ## Metrics
//!
//! Counters, gauges and histograms live in the process-wide registry of
//! `strata-observability`. This crate updates them but never registers them;
//! call `strata_observability::init()` once at startup to have them exported.
//! The inflight read gauges are not per throttle: with more than one
//! [`InflightReadThrottle`] they report whichever changed state last.
//!
//! ## Usage Example
//!
//! ```ignore
//! use strata_storage::{DataBlockLoader, InflightReadThrottle, StorageConfig};
//! use std::sync::Arc;
//!
//! strata_observability::init();
//! let config = StorageConfig::default();
//! let throttle = Arc::new(InflightReadThrottle::from_config(&config.inflight_read));
//! let loader = DataBlockLoader::from_config(object_store, throttle, &config);
//!
//! let loaded = loader.load(block).await?;
//! serve(loaded.data());
//! loaded.release();
//! ```

pub mod block_loader;
pub mod config;
pub mod data_block;
pub mod error;
pub mod inflight;
pub mod wal;

pub use block_loader::{DataBlockLoader, LoadedBlock};
pub use config::{InflightReadConfig, StorageConfig, WalChannelConfig};
pub use data_block::{BlockData, StreamDataBlock};
pub use error::{Error, Result};
pub use inflight::InflightReadThrottle;
pub use wal::{BlockDeviceChannel, CapacityReader, DeviceKind, WalChannel};
