//! Run statistics
//!
//! Counts how batches resolved and how long they took, overall and per pool
//! slot. Recorded by the completion router on the coordinator thread, so no
//! synchronization is needed.

pub mod histogram;

use histogram::LatencyHistogram;
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-run batch statistics
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    /// Kernel time of every batch that produced a result (written or discarded)
    latency: LatencyHistogram,
    /// Batches resolved per pool slot
    per_slot: BTreeMap<usize, usize>,
    written: usize,
    failed: usize,
    cancelled: usize,
    timed_out: usize,
    indices_written: u64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_written(&mut self, slot: usize, elapsed: Duration, indices: usize) {
        self.latency.record(elapsed);
        *self.per_slot.entry(slot).or_default() += 1;
        self.written += 1;
        self.indices_written += indices as u64;
    }

    pub fn record_failed(&mut self, slot: usize, elapsed: Duration) {
        self.latency.record(elapsed);
        *self.per_slot.entry(slot).or_default() += 1;
        self.failed += 1;
    }

    pub fn record_cancelled(&mut self, slot: usize) {
        *self.per_slot.entry(slot).or_default() += 1;
        self.cancelled += 1;
    }

    /// Batches abandoned because no completion arrived in time
    pub fn record_timed_out(&mut self, count: usize) {
        self.timed_out += count;
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled
    }

    pub fn timed_out(&self) -> usize {
        self.timed_out
    }

    pub fn resolved(&self) -> usize {
        self.written + self.failed + self.cancelled + self.timed_out
    }

    pub fn indices_written(&self) -> u64 {
        self.indices_written
    }

    pub fn latency(&self) -> &LatencyHistogram {
        &self.latency
    }

    pub fn per_slot(&self) -> &BTreeMap<usize, usize> {
        &self.per_slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts() {
        let mut stats = BatchStats::new();
        stats.record_written(0, Duration::from_millis(5), 32);
        stats.record_written(1, Duration::from_millis(7), 32);
        stats.record_failed(1, Duration::from_millis(2));
        stats.record_cancelled(0);
        stats.record_timed_out(3);

        assert_eq!(stats.written(), 2);
        assert_eq!(stats.failed(), 1);
        assert_eq!(stats.cancelled(), 1);
        assert_eq!(stats.timed_out(), 3);
        assert_eq!(stats.resolved(), 7);
        assert_eq!(stats.indices_written(), 64);
        assert_eq!(stats.latency().len(), 3);
        assert_eq!(stats.per_slot().get(&0), Some(&2));
        assert_eq!(stats.per_slot().get(&1), Some(&2));
    }
}
