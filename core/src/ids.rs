//! Monotonic ID issuance (spec §4.1, C1).

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// A process-wide monotonic counter, safe under concurrent callers.
///
/// `next()` never returns the same value twice and never returns a value
/// smaller than one it has already returned, regardless of how many threads
/// call it concurrently.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    next: AtomicU64,
}

impl AtomicCounter {
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Returns a strictly increasing integer starting at 0.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns `"<prefix>-<n>"` for the next value.
    pub fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next())
    }
}

#[cfg(test)]
#[path = "ids.test.rs"]
mod tests;
