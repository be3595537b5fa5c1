//! Injectable time source.
//!
//! Every component that compares timestamps (feed silence, stuck pushes,
//! oracle staleness) reads time through [`Clock`] so the thresholds can be
//! exercised deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Trait for obtaining current time, enabling testability.
pub trait Clock: Send + Sync {
    /// Returns current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> u64;
}

/// System clock implementation using real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

/// Manually driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    time_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(initial_ms: u64) -> Self {
        Self {
            time_ms: AtomicU64::new(initial_ms),
        }
    }

    pub fn set(&self, time_ms: u64) {
        self.time_ms.store(time_ms, Ordering::Release);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.time_ms.fetch_add(delta_ms, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.time_ms.load(Ordering::Acquire)
    }
}
