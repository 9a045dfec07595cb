//! Process-wide cross-worker fingerprint counts (spec §4.6, C6).

use dashmap::DashMap;

/// Default number of workers that must independently report the same
/// fingerprint before a global doom loop is declared.
pub const DEFAULT_GLOBAL_THRESHOLD: u64 = 5;

/// A process-wide `fingerprint → count` map shared by every [`super::tracker::BudgetTracker`]
/// in the process. Each tracker reports its own fingerprint increments here;
/// once a fingerprint's count exceeds the configured threshold, every
/// tracker's next `check_budget()` surfaces a global doom loop.
pub struct SharedLoopState {
    counts: DashMap<String, u64>,
    global_threshold: u64,
}

impl SharedLoopState {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_GLOBAL_THRESHOLD)
    }

    pub fn with_threshold(global_threshold: u64) -> Self {
        Self {
            counts: DashMap::new(),
            global_threshold,
        }
    }

    /// Records one more occurrence of `fingerprint` and returns the updated
    /// count.
    pub fn record(&self, fingerprint: &str) -> u64 {
        let mut entry = self.counts.entry(fingerprint.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Returns the fingerprint whose count exceeds the global threshold, if
    /// any. Ties among multiple offenders resolve to an arbitrary one.
    pub fn global_doom_loop(&self) -> Option<String> {
        self.counts
            .iter()
            .find(|entry| *entry.value() > self.global_threshold)
            .map(|entry| entry.key().clone())
    }

    pub fn count(&self, fingerprint: &str) -> u64 {
        self.counts.get(fingerprint).map(|e| *e).unwrap_or(0)
    }

    pub fn reset(&self) {
        self.counts.clear();
    }
}

impl Default for SharedLoopState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "shared_state.test.rs"]
mod tests;
