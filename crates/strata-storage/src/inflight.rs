//! Inflight Read Admission
//!
//! Bounds the memory held by reads against the object-storage tier. Every
//! read asks for a byte quota before fetching; the quota is returned when the
//! fetched data is released.
//!
//! ## Why Admission?
//!
//! Object-storage reads are fetched whole into memory. Without a bound, a
//! burst of catch-up consumers can pull gigabytes of blocks at once and the
//! broker runs out of memory long before the network is saturated.
//!
//! ## Algorithm
//!
//! - A read larger than the whole budget is rejected outright.
//! - A zero-byte read is admitted without touching the budget.
//! - Otherwise the read is granted immediately if it fits, or queued.
//! - Queued reads are granted in strict arrival order. A head that does not
//!   fit blocks everything behind it, so a large read cannot be starved by a
//!   stream of small ones.
//!
//! Granting runs inline inside `acquire` and `release`; there is no
//! background task.
//!
//! ## Metrics
//!
//! `strata_inflight_read_available_bytes` and
//! `strata_inflight_read_queue_size` are process-wide gauges. A broker runs one throttle; with several, the gauges
//! show whichever throttle changed state last. They are exported only after
//! `strata_observability::init()` registers them.
//!
//! ## Usage
//!
//! ```ignore
//! use strata_storage::InflightReadThrottle;
//! use uuid::Uuid;
//!
//! let throttle = InflightReadThrottle::new(64 * 1024 * 1024);
//!
//! let read_id = Uuid::new_v4();
//! throttle.acquire(read_id, block.size() as u64).await?;
//! let data = store.get_range(&path, range).await?;
//! // ... hand data to the consumer ...
//! throttle.release(read_id);
//! ```

use crate::config::InflightReadConfig;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use strata_observability::metrics::{
    INFLIGHT_READ_AVAILABLE_BYTES, INFLIGHT_READ_QUEUE_SIZE, INFLIGHT_READ_REJECTED_TOTAL,
};
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

/// Quota recorded for one read id.
#[derive(Debug)]
struct Quota {
    size: u64,

    /// Debited from the budget
    granted: bool,

    /// Released while still queued
    abandoned: bool,
}

#[derive(Debug)]
struct PendingRead {
    id: Uuid,
    size: u64,
    tx: oneshot::Sender<Result<()>>,
}

#[derive(Debug)]
struct ThrottleState {
    available: u64,
    quotas: HashMap<Uuid, Quota>,
    queue: VecDeque<PendingRead>,
    shutdown: bool,
}

enum Admission {
    Granted,
    Queued(oneshot::Receiver<Result<()>>),
}

/// Byte-budget admission controller for object-storage reads.
#[derive(Debug)]
pub struct InflightReadThrottle {
    max_bytes: u64,
    state: Mutex<ThrottleState>,
}

impl InflightReadThrottle {
    pub fn new(max_bytes: u64) -> Self {
        INFLIGHT_READ_AVAILABLE_BYTES.set(max_bytes as i64);
        INFLIGHT_READ_QUEUE_SIZE.set(0);

        Self {
            max_bytes,
            state: Mutex::new(ThrottleState {
                available: max_bytes,
                quotas: HashMap::new(),
                queue: VecDeque::new(),
                shutdown: false,
            }),
        }
    }

    /// Budget scaled by the expected merge-read sparsity.
    pub fn from_config(config: &InflightReadConfig) -> Self {
        Self::new(config.effective_max_bytes())
    }

    /// Ask for `size` bytes of budget on behalf of `id`.
    ///
    /// The request takes its place in line when this is called, not when the
    /// returned future is first polled. The future resolves once the quota is
    /// granted, or fails with [`Error::ReadAbandoned`] if `id` was released
    /// while still queued.
    pub fn acquire(&self, id: Uuid, size: u64) -> impl Future<Output = Result<()>> + Send + 'static {
        let admission = self.admit(id, size);
        async move {
            match admission? {
                Admission::Granted => Ok(()),
                Admission::Queued(rx) => match rx.await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(Error::ThrottleShutdown),
                },
            }
        }
    }

    fn admit(&self, id: Uuid, size: u64) -> Result<Admission> {
        if size > self.max_bytes {
            INFLIGHT_READ_REJECTED_TOTAL.inc();
            return Err(Error::AdmissionRejected {
                requested: size,
                max: self.max_bytes,
            });
        }
        if size == 0 {
            return Ok(Admission::Granted);
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.shutdown {
            return Err(Error::ThrottleShutdown);
        }
        if state.quotas.contains_key(&id) {
            return Err(Error::DuplicateReadId(id));
        }

        // Nothing may overtake a queued read
        if state.queue.is_empty() && size <= state.available {
            state.available -= size;
            state.quotas.insert(
                id,
                Quota {
                    size,
                    granted: true,
                    abandoned: false,
                },
            );
            Self::update_gauges(state);
            return Ok(Admission::Granted);
        }

        let (tx, rx) = oneshot::channel();
        state.quotas.insert(
            id,
            Quota {
                size,
                granted: false,
                abandoned: false,
            },
        );
        state.queue.push_back(PendingRead { id, size, tx });
        debug!(
            read_id = %id,
            size,
            available = state.available,
            queued = state.queue.len(),
            "Inflight read queued"
        );
        Self::update_gauges(state);
        Ok(Admission::Queued(rx))
    }

    /// Return the quota held by `id`. Unknown ids are ignored.
    ///
    /// Releasing a read that is still queued abandons it: its waiter fails
    /// with [`Error::ReadAbandoned`] once the entry reaches the head of the
    /// queue, and it keeps its place in line until then. Until that happens
    /// `id` is still recorded, and acquiring it again fails with
    /// [`Error::DuplicateReadId`].
    pub fn release(&self, id: Uuid) {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let granted = match state.quotas.get_mut(&id) {
            None => return,
            Some(quota) => {
                if !quota.granted {
                    quota.abandoned = true;
                }
                quota.granted
            }
        };

        if granted {
            if let Some(quota) = state.quotas.remove(&id) {
                state.available += quota.size;
            }
        } else {
            debug!(read_id = %id, "Inflight read released while queued");
        }

        Self::grant_pending(state);
    }

    /// Grant queued reads from the head while they fit.
    fn grant_pending(state: &mut ThrottleState) {
        while let Some(head) = state.queue.front() {
            if head.size > state.available {
                break;
            }
            let Some(pending) = state.queue.pop_front() else {
                break;
            };

            let abandoned = state
                .quotas
                .get(&pending.id)
                .map_or(true, |quota| quota.abandoned);
            if abandoned {
                // Granted and released in one step
                state.quotas.remove(&pending.id);
                let _ = pending.tx.send(Err(Error::ReadAbandoned(pending.id)));
                continue;
            }

            if let Some(quota) = state.quotas.get_mut(&pending.id) {
                quota.granted = true;
            }
            state.available -= pending.size;
            if pending.tx.send(Ok(())).is_err() {
                debug!(read_id = %pending.id, "Inflight read waiter gone before grant");
            }
            debug!(
                read_id = %pending.id,
                size = pending.size,
                available = state.available,
                "Inflight read granted"
            );
        }
        Self::update_gauges(state);
    }

    /// Fail every queued read and refuse new ones.
    ///
    /// Quotas already granted can still be released.
    pub fn shutdown(&self) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.shutdown {
            return;
        }
        state.shutdown = true;

        let drained: Vec<PendingRead> = state.queue.drain(..).collect();
        for pending in &drained {
            state.quotas.remove(&pending.id);
        }
        Self::update_gauges(state);
        drop(guard);

        info!(
            dropped = drained.len(),
            "Inflight read throttle shut down"
        );
        for pending in drained {
            let _ = pending.tx.send(Err(Error::ThrottleShutdown));
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn available_bytes(&self) -> u64 {
        self.state.lock().available
    }

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Number of read ids holding or awaiting a quota.
    pub fn outstanding(&self) -> usize {
        self.state.lock().quotas.len()
    }

    fn update_gauges(state: &ThrottleState) {
        INFLIGHT_READ_AVAILABLE_BYTES.set(state.available as i64);
        INFLIGHT_READ_QUEUE_SIZE.set(state.queue.len() as i64);
    }
}

impl Default for InflightReadThrottle {
    fn default() -> Self {
        Self::from_config(&InflightReadConfig::default())
    }
}
