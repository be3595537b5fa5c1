//! Key rotation pool.
//!
//! Each admin account key has its own sequence number, so N keys give N
//! independent submission lanes. The pool hands out key indices as exclusive
//! leases: a [`KeyLease`] releases its index when dropped, on every exit path
//! of the submission that holds it.
//!
//! Waiters poll on a fixed interval and are additionally woken on every
//! release. There is no FIFO ordering between waiters: whichever waiter
//! observes a freed key first takes it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use supreme_telemetry::Metrics;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{LedgerError, LedgerResult};

/// Default retry interval for [`KeyPool::acquire_waiting`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default wait budget for [`KeyPool::acquire_waiting`].
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(15_000);

/// Tracks which key indices are reserved by in-flight submissions.
#[derive(Debug)]
pub struct KeyPool {
    /// `busy[i]` is true while key `i` is leased. Length is the pool size.
    busy: Mutex<Vec<bool>>,
    released: Notify,
    poll_interval: Duration,
}

impl KeyPool {
    /// Create a pool of `count` keys (at least one).
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self::with_poll_interval(count, DEFAULT_POLL_INTERVAL)
    }

    #[must_use]
    pub fn with_poll_interval(count: usize, poll_interval: Duration) -> Self {
        let count = count.max(1);
        Metrics::key_pool_size(count);
        Self {
            busy: Mutex::new(vec![false; count]),
            released: Notify::new(),
            poll_interval,
        }
    }

    /// Resize the pool.
    ///
    /// Leases on indices beyond the new size stay valid until dropped; their
    /// release is then a no-op.
    pub fn set_count(&self, count: usize) {
        let count = count.max(1);
        self.busy.lock().resize(count, false);
        Metrics::key_pool_size(count);
        self.released.notify_waiters();
    }

    /// Number of key slots.
    pub fn count(&self) -> usize {
        self.busy.lock().len()
    }

    /// Number of slots currently leased.
    pub fn busy_count(&self) -> usize {
        self.busy.lock().iter().filter(|b| **b).count()
    }

    /// Reserve the lowest free index, or `None` if every key is busy.
    ///
    /// Prefer [`KeyPool::try_lease`]; a raw index must be handed back with
    /// [`KeyPool::release`].
    pub fn acquire(&self) -> Option<usize> {
        let mut busy = self.busy.lock();
        let index = busy.iter().position(|b| !*b)?;
        busy[index] = true;
        let in_use = busy.iter().filter(|b| **b).count();
        drop(busy);
        Metrics::key_pool_busy(in_use);
        trace!(key_index = index, "Key acquired");
        Some(index)
    }

    /// Return an index to the pool.
    ///
    /// Idempotent: releasing a free or out-of-range index does nothing.
    pub fn release(&self, index: usize) {
        let mut busy = self.busy.lock();
        let Some(slot) = busy.get_mut(index) else {
            return;
        };
        if !*slot {
            return;
        }
        *slot = false;
        let in_use = busy.iter().filter(|b| **b).count();
        drop(busy);
        Metrics::key_pool_busy(in_use);
        trace!(key_index = index, "Key released");
        self.released.notify_waiters();
    }

    /// Non-blocking lease of the lowest free key.
    pub fn try_lease(self: &Arc<Self>) -> Option<KeyLease> {
        self.acquire().map(|index| KeyLease {
            pool: Arc::clone(self),
            index,
        })
    }

    /// Lease a key, retrying until one frees up or `max_wait` elapses.
    ///
    /// # Errors
    /// Returns `LedgerError::PoolExhausted` when the wait budget runs out.
    pub async fn acquire_waiting(self: &Arc<Self>, max_wait: Duration) -> LedgerResult<KeyLease> {
        let start = Instant::now();
        let deadline = start + max_wait;

        loop {
            // Registered before the check so a release in between still wakes us.
            let released = self.released.notified();

            if let Some(lease) = self.try_lease() {
                return Ok(lease);
            }

            let now = Instant::now();
            if now >= deadline {
                let waited_ms = now.duration_since(start).as_millis() as u64;
                Metrics::key_pool_exhausted();
                debug!(waited_ms, pool_size = self.count(), "Key pool exhausted");
                return Err(LedgerError::PoolExhausted { waited_ms });
            }

            let nap = self.poll_interval.min(deadline - now);
            tokio::select! {
                () = released => {}
                () = tokio::time::sleep(nap) => {}
            }
        }
    }

    /// Non-blocking lease that reports exhaustion as an error.
    pub fn lease_now(self: &Arc<Self>) -> LedgerResult<KeyLease> {
        self.try_lease().ok_or_else(|| {
            Metrics::key_pool_exhausted();
            LedgerError::PoolExhausted { waited_ms: 0 }
        })
    }
}

/// Exclusive hold on one key index. Released on drop.
#[derive(Debug)]
pub struct KeyLease {
    pool: Arc<KeyPool>,
    index: usize,
}

impl KeyLease {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}
