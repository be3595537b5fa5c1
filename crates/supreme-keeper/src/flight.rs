//! Single-flight guard for periodic cycles.

use std::sync::atomic::{AtomicBool, Ordering};

/// Held while a cycle runs; clears the flag on drop, including on panic
/// or early return.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> FlightGuard<'a> {
    /// Claim the flag, or `None` if a cycle is already running.
    pub fn try_enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
