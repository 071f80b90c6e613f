//! Running trace statistics.
//!
//! Frees do not lower `current_bytes`: the replay header only needs an upper
//! bound on the heap size, and the original malloc-lab traces were produced
//! with this accounting. Realloc applies the size delta against the last
//! known size of the block.
//!
//! The running total saturates at `u64::MAX` instead of wrapping. Once it
//! is pinned there, later realloc deltas are applied against the clamped
//! value, so peak stays at `u64::MAX` and a shrinking realloc lowers the
//! total from the clamp rather than from the true sum.

use serde::{Deserialize, Serialize};

/// Counters accumulated over one conversion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsAccumulator {
    unique_allocations: u64,
    total_operations: u64,
    current_bytes: u64,
    peak_bytes: u64,
}

/// Read-only view published at the end of a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub unique_allocation_count: u64,
    pub total_operation_count: u64,
    pub peak_allocated_bytes: u64,
}

impl StatsAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_allocate(&mut self, size: u64) {
        self.unique_allocations += 1;
        self.total_operations += 1;
        self.current_bytes = self.current_bytes.saturating_add(size);
        self.observe_peak();
    }

    pub fn record_free(&mut self) {
        self.total_operations += 1;
    }

    pub fn record_reallocate(&mut self, prior_size: u64, new_size: u64) {
        self.total_operations += 1;
        // current_bytes already includes prior_size for a live block.
        self.current_bytes = self
            .current_bytes
            .saturating_sub(prior_size)
            .saturating_add(new_size);
        self.observe_peak();
    }

    fn observe_peak(&mut self) {
        self.peak_bytes = self.peak_bytes.max(self.current_bytes);
    }

    #[must_use]
    pub fn current_bytes(&self) -> u64 {
        self.current_bytes
    }

    #[must_use]
    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            unique_allocation_count: self.unique_allocations,
            total_operation_count: self.total_operations,
            peak_allocated_bytes: self.peak_bytes,
        }
    }
}
