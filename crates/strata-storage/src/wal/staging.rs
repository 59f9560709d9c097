//! Block-aligned staging buffers.
//!
//! `O_DIRECT` transfers need the memory address, the length and the device
//! offset to be block aligned. Caller data rarely is, so every WAL transfer
//! goes through a staging buffer allocated with block alignment.
//!
//! Buffers are owned per worker thread and held in thread-local storage. A
//! worker takes its buffer out of its slot, uses it, and the guard parks it
//! again on drop. No lock is involved, and a buffer dies with its thread.

use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use strata_core::align::{align_up, is_aligned, BLOCK_SIZE};
use tracing::debug;

/// Heap memory aligned to [`BLOCK_SIZE`], zero-initialised.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: AlignedBuffer uniquely owns its allocation, like Vec<u8>.
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocate `len` zeroed bytes. `len` must be block aligned.
    pub fn new(len: u64) -> Result<Self> {
        debug_assert!(is_aligned(len));
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }

        let too_large = || Error::StagingBufferTooLarge {
            requested: len,
            limit: isize::MAX as u64,
        };
        let size = usize::try_from(len).map_err(|_| too_large())?;
        let layout = Layout::from_size_align(size, BLOCK_SIZE as usize).map_err(|_| too_large())?;

        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(layout),
        };

        Ok(Self { ptr, len: size })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn layout(&self) -> Layout {
        // Validated in `new`.
        unsafe { Layout::from_size_align_unchecked(self.len, BLOCK_SIZE as usize) }
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid for len bytes (or dangling with len 0).
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: ptr is valid for len bytes and uniquely borrowed.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        if self.len > 0 {
            // SAFETY: allocated in `new` with this exact layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout()) }
        }
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer").field("len", &self.len).finish()
    }
}

thread_local! {
    /// The current thread's parked staging buffers, keyed by pool id.
    static PARKED: RefCell<HashMap<u64, TrackedBuffer>> = RefCell::new(HashMap::new());
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

/// A buffer counted against the pool that allocated it.
struct TrackedBuffer {
    buffer: AlignedBuffer,
    live: Weak<AtomicUsize>,
}

impl Drop for TrackedBuffer {
    fn drop(&mut self) {
        if let Some(live) = self.live.upgrade() {
            live.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// Drop buffers whose pool no longer exists.
fn prune_orphans() {
    let _ = PARKED.try_with(|parked| {
        parked
            .borrow_mut()
            .retain(|_, tracked| tracked.live.strong_count() > 0)
    });
}

/// Per-worker staging buffers for one WAL channel.
///
/// Buffers live in thread-local storage, so a worker's buffer is freed when
/// the worker exits. Dropping the pool frees the calling thread's buffer;
/// other threads drop theirs on exit or on their next allocation.
pub(crate) struct StagingPool {
    id: u64,

    /// Size of a worker's first buffer (0 = exactly what the first request needs)
    init_size: u64,

    /// Upper bound on any buffer (0 = unlimited)
    max_size: u64,

    /// Buffers allocated by this pool and not yet freed
    live: Arc<AtomicUsize>,
}

impl StagingPool {
    pub(crate) fn new(init_size: u64, max_size: u64) -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            init_size: align_up(init_size),
            max_size,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Check out the calling worker's buffer, growing it to at least
    /// `aligned_size` bytes. The previous buffer is freed when it is replaced.
    pub(crate) fn checkout(&self, aligned_size: u64) -> Result<StagingBuffer<'_>> {
        debug_assert!(is_aligned(aligned_size));
        let current = self.take_parked();

        let tracked = match current {
            Some(tracked) if tracked.buffer.len() as u64 >= aligned_size => tracked,
            current => {
                if self.max_size > 0 && aligned_size > self.max_size {
                    if let Some(tracked) = current {
                        self.park(tracked);
                    }
                    return Err(Error::StagingBufferTooLarge {
                        requested: aligned_size,
                        limit: self.max_size,
                    });
                }

                let size = aligned_size.max(self.init_size);
                debug!(
                    from = current.as_ref().map(|t| t.buffer.len()).unwrap_or(0),
                    to = size,
                    "Growing WAL staging buffer"
                );
                drop(current);
                prune_orphans();
                self.track(AlignedBuffer::new(size)?)
            }
        };

        Ok(StagingBuffer {
            pool: self,
            tracked: Some(tracked),
            _thread_bound: PhantomData,
        })
    }

    /// Number of staging buffers this pool has allocated that are still alive,
    /// parked or checked out.
    pub(crate) fn len(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Capacity of the calling worker's parked buffer.
    pub(crate) fn current_capacity(&self) -> Option<usize> {
        PARKED
            .try_with(|parked| parked.borrow().get(&self.id).map(|t| t.buffer.len()))
            .ok()
            .flatten()
    }

    fn track(&self, buffer: AlignedBuffer) -> TrackedBuffer {
        self.live.fetch_add(1, Ordering::Relaxed);
        TrackedBuffer {
            buffer,
            live: Arc::downgrade(&self.live),
        }
    }

    fn take_parked(&self) -> Option<TrackedBuffer> {
        PARKED
            .try_with(|parked| parked.borrow_mut().remove(&self.id))
            .ok()
            .flatten()
    }

    fn park(&self, tracked: TrackedBuffer) {
        // Fails only while the thread is exiting; the buffer is dropped then
        let _ = PARKED.try_with(move |parked| {
            parked.borrow_mut().insert(self.id, tracked);
        });
    }
}

impl Drop for StagingPool {
    fn drop(&mut self) {
        let _ = PARKED.try_with(|parked| parked.borrow_mut().remove(&self.id));
    }
}

/// A checked-out staging buffer. Parked in the worker's slot on drop.
pub(crate) struct StagingBuffer<'a> {
    pool: &'a StagingPool,
    tracked: Option<TrackedBuffer>,
    _thread_bound: PhantomData<*const ()>,
}

impl Deref for StagingBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.tracked {
            Some(tracked) => &tracked.buffer[..],
            None => &[],
        }
    }
}

impl DerefMut for StagingBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.tracked {
            Some(tracked) => &mut tracked.buffer[..],
            None => &mut [],
        }
    }
}

impl Drop for StagingBuffer<'_> {
    fn drop(&mut self) {
        if let Some(tracked) = self.tracked.take() {
            self.pool.park(tracked);
        }
    }
}
