//! Data Block Loader
//!
//! Fetches stream data blocks from object storage under the inflight read
//! budget.
//!
//! ## Load Flow
//!
//! ```text
//! load(block)
//!     ↓
//! acquire(read_id, block.size)   ← may wait for budget
//!     ↓
//! GET object [start_position, end_position)
//!     ↓
//! block.complete(bytes)  /  block.fail(error) + release
//!     ↓
//! LoadedBlock  ──release() or drop──► block.free() + throttle.release(read_id)
//! ```
//!
//! The quota is held for as long as the caller holds the [`LoadedBlock`], so
//! the budget tracks memory actually in use rather than fetches in progress.
//!
//! A block is loaded at most once. Loading a block that already has an
//! outcome, or losing a race to another load of the same block, fails with
//! [`Error::BlockAlreadySettled`] and leaves the budget untouched. Other
//! readers wait on [`StreamDataBlock::data`] instead.
//!
//! ## Usage
//!
//! ```ignore
//! use strata_storage::{DataBlockLoader, InflightReadThrottle};
//!
//! let loader = DataBlockLoader::new(object_store, Arc::new(InflightReadThrottle::default()), "data");
//!
//! let loaded = loader.load(block.clone()).await?;
//! decode_records(loaded.data());
//! loaded.release();
//! ```

use crate::config::StorageConfig;
use crate::data_block::StreamDataBlock;
use crate::error::{Error, Result};
use crate::inflight::InflightReadThrottle;
use bytes::Bytes;
use object_store::path::Path;
use object_store::ObjectStore;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use strata_observability::metrics::{
    BLOCK_LOAD_BYTES_TOTAL, BLOCK_LOAD_ERRORS_TOTAL, BLOCK_LOAD_LATENCY,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Loads data blocks from object storage, one admission quota per block.
pub struct DataBlockLoader {
    object_store: Arc<dyn ObjectStore>,
    throttle: Arc<InflightReadThrottle>,
    key_prefix: String,
}

impl DataBlockLoader {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        throttle: Arc<InflightReadThrottle>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            object_store,
            throttle,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn from_config(
        object_store: Arc<dyn ObjectStore>,
        throttle: Arc<InflightReadThrottle>,
        config: &StorageConfig,
    ) -> Self {
        Self::new(object_store, throttle, config.object_key_prefix.clone())
    }

    pub fn throttle(&self) -> &Arc<InflightReadThrottle> {
        &self.throttle
    }

    /// Object key for `object_id`, e.g. `data/00000000000000000042`.
    pub fn object_path(&self, object_id: u64) -> Path {
        Path::from(format!("{}/{:020}", self.key_prefix, object_id))
    }

    /// Fetch `block` and complete it.
    ///
    /// Waits for admission first. If the returned future is dropped before
    /// it finishes, the quota is given back.
    pub async fn load(&self, block: Arc<StreamDataBlock>) -> Result<LoadedBlock> {
        if block.is_freed() || !block.state().is_pending() {
            return Err(Error::BlockAlreadySettled);
        }

        let started = Instant::now();
        let read_id = Uuid::new_v4();
        let mut admission = AdmissionGuard {
            throttle: self.throttle.clone(),
            read_id,
            armed: true,
        };

        if let Err(e) = self.throttle.acquire(read_id, block.block_size() as u64).await {
            block.fail(e.to_string());
            return Err(e);
        }

        let path = self.object_path(block.object_id());
        let range = byte_range(&block)?;
        debug!(
            read_id = %read_id,
            path = %path,
            start = range.start,
            end = range.end,
            "Loading data block"
        );

        let data = match self.object_store.get_range(&path, range).await {
            Ok(data) => data,
            Err(e) => {
                BLOCK_LOAD_ERRORS_TOTAL.inc();
                warn!(
                    object_id = block.object_id(),
                    block_id = block.block_id(),
                    error = %e,
                    "Failed to load data block"
                );
                block.fail(e.to_string());
                return Err(e.into());
            }
        };

        BLOCK_LOAD_BYTES_TOTAL.inc_by(data.len() as u64);
        BLOCK_LOAD_LATENCY.observe(started.elapsed().as_secs_f64());
        if !block.complete(data.clone()) {
            debug!(read_id = %read_id, block = %block, "Data block settled by another load");
            return Err(Error::BlockAlreadySettled);
        }
        if !block.is_ready() {
            // Freed while the fetch was in flight
            return Err(Error::BlockReleased);
        }

        // LoadedBlock owns the quota from here
        admission.armed = false;
        Ok(LoadedBlock {
            block,
            data,
            read_id,
            throttle: self.throttle.clone(),
            released: false,
        })
    }
}

fn byte_range(block: &StreamDataBlock) -> Result<Range<usize>> {
    let to_usize = |position: u64| {
        usize::try_from(position)
            .map_err(|_| Error::BlockLoadFailed(format!("position {} out of range", position)))
    };
    Ok(to_usize(block.block_start_position())?..to_usize(block.block_end_position())?)
}

/// Returns the quota unless disarmed.
struct AdmissionGuard {
    throttle: Arc<InflightReadThrottle>,
    read_id: Uuid,
    armed: bool,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        if self.armed {
            self.throttle.release(self.read_id);
        }
    }
}

/// A fetched block holding its admission quota.
///
/// Releasing (explicitly or on drop) frees the block and returns the quota,
/// exactly once.
pub struct LoadedBlock {
    block: Arc<StreamDataBlock>,
    data: Bytes,
    read_id: Uuid,
    throttle: Arc<InflightReadThrottle>,
    released: bool,
}

impl LoadedBlock {
    pub fn block(&self) -> &Arc<StreamDataBlock> {
        &self.block
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn read_id(&self) -> Uuid {
        self.read_id
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.block.free();
        self.throttle.release(self.read_id);
    }
}

impl Drop for LoadedBlock {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for LoadedBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedBlock")
            .field("block", &self.block.to_string())
            .field("read_id", &self.read_id)
            .field("len", &self.data.len())
            .finish()
    }
}
