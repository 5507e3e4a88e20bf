//! Completion router
//!
//! Turns each completion message into its effect on the run: fulfilled
//! results go to the output writer, failures and cancellations go to the
//! failure log. The router is driven one message at a time by the coordinator
//! loop, which is what keeps every store write serialized.
//!
//! Once the run's cancel token is set, fulfilled results that arrive later are
//! discarded and logged as cancelled, so a cancelled run never writes past the
//! point where it was cancelled.

use super::writer::OutputWriter;
use crate::error::{ComputeError, RunError};
use crate::plan::{Batch, BatchId};
use crate::pool::{CancelToken, Completion, Outcome};
use crate::stats::BatchStats;
use serde::Serialize;
use std::fmt;
use std::ops::Range;

/// Why a batch did not reach the store
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    Compute(ComputeError),
    Cancelled,
    TimedOut,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Compute(e) => write!(f, "{}", e),
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::TimedOut => write!(f, "timed out"),
        }
    }
}

/// A batch whose indices were left at the sentinel
#[derive(Debug, Clone, PartialEq)]
pub struct FailedBatch {
    pub batch_id: BatchId,
    pub range: Range<u64>,
    pub reason: FailureReason,
}

impl FailedBatch {
    pub fn new(batch: &Batch, reason: FailureReason) -> Self {
        Self {
            batch_id: batch.id(),
            range: batch.range(),
            reason,
        }
    }
}

/// What routing one completion did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Routed {
    Written,
    Failed,
    Cancelled,
}

pub struct CompletionRouter {
    writer: OutputWriter,
    cancel: CancelToken,
    failures: Vec<FailedBatch>,
    stats: BatchStats,
}

impl CompletionRouter {
    pub fn new(writer: OutputWriter, cancel: CancelToken) -> Self {
        Self {
            writer,
            cancel,
            failures: Vec::new(),
            stats: BatchStats::new(),
        }
    }

    /// Apply one completion for `batch`
    ///
    /// # Errors
    ///
    /// Returns the writer's error for fatal conditions (duplicate or
    /// out-of-range writes, store failures). Compute failures and
    /// cancellations are recorded and return `Ok`.
    pub fn route(&mut self, batch: &Batch, completion: Completion) -> Result<Routed, RunError> {
        if completion.batch_id != batch.id() {
            return Err(RunError::Internal(format!(
                "{} resolved batch {} but was registered for {}",
                completion.task_id,
                completion.batch_id,
                batch.id()
            )));
        }

        match completion.outcome {
            Outcome::Fulfilled(_) if self.cancel.is_cancelled() => {
                tracing::debug!(batch = %batch.id(), "discarding result that arrived after cancellation");
                self.record_failure(batch, FailureReason::Cancelled);
                self.stats.record_cancelled(completion.slot);
                Ok(Routed::Cancelled)
            }
            Outcome::Fulfilled(result) => {
                self.writer.apply(&result)?;
                self.stats
                    .record_written(completion.slot, completion.elapsed, result.indices.len());
                Ok(Routed::Written)
            }
            Outcome::Failed(error) => {
                tracing::warn!(
                    batch = %batch.id(),
                    slot = completion.slot,
                    start = batch.range().start,
                    end = batch.range().end,
                    "batch failed: {}",
                    error
                );
                self.record_failure(batch, FailureReason::Compute(error));
                self.stats.record_failed(completion.slot, completion.elapsed);
                Ok(Routed::Failed)
            }
            Outcome::Cancelled => {
                self.record_failure(batch, FailureReason::Cancelled);
                self.stats.record_cancelled(completion.slot);
                Ok(Routed::Cancelled)
            }
        }
    }

    /// Record batches that never resolved in time
    pub fn record_timed_out<'a, I>(&mut self, batches: I)
    where
        I: IntoIterator<Item = &'a Batch>,
    {
        let mut count = 0;
        for batch in batches {
            self.record_failure(batch, FailureReason::TimedOut);
            count += 1;
        }
        self.stats.record_timed_out(count);
    }

    fn record_failure(&mut self, batch: &Batch, reason: FailureReason) {
        self.failures.push(FailedBatch::new(batch, reason));
    }

    pub fn failures(&self) -> &[FailedBatch] {
        &self.failures
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    pub fn writer(&self) -> &OutputWriter {
        &self.writer
    }

    /// Hand back the writer, failure log (sorted by batch) and statistics
    pub fn into_parts(self) -> (OutputWriter, Vec<FailedBatch>, BatchStats) {
        let mut failures = self.failures;
        failures.sort_by_key(|f| f.batch_id);
        (self.writer, failures, self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{plan, BatchSpec};
    use crate::pool::TaskId;
    use crate::store::memory::MemoryStore;
    use crate::worker::BatchResult;
    use std::time::Duration;

    fn fulfilled(batch: &Batch) -> Completion {
        let indices = batch.indices();
        let values = indices.iter().map(|&i| (i * i) as f64).collect();
        Completion {
            task_id: TaskId(batch.id().0 as u64),
            batch_id: batch.id(),
            slot: 0,
            elapsed: Duration::from_millis(1),
            outcome: Outcome::Fulfilled(BatchResult {
                batch_id: batch.id(),
                indices,
                values,
            }),
        }
    }

    fn with_outcome(batch: &Batch, outcome: Outcome) -> Completion {
        Completion {
            outcome,
            ..fulfilled(batch)
        }
    }

    fn router(len: u64) -> (CompletionRouter, MemoryStore, CancelToken) {
        let store = MemoryStore::new(len, f64::NAN);
        let cancel = CancelToken::new();
        let writer = OutputWriter::new(Box::new(store.clone()));
        (CompletionRouter::new(writer, cancel.clone()), store, cancel)
    }

    /// Deterministic permutation of `0..n` driven by `seed`
    fn permutation(n: usize, seed: u64) -> Vec<usize> {
        let mut order: Vec<usize> = (0..n).collect();
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        for i in (1..n).rev() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let j = (state >> 33) as usize % (i + 1);
            order.swap(i, j);
        }
        order
    }

    #[test]
    fn test_resolution_order_does_not_change_store() {
        let plan = plan(100, BatchSpec::Count(9)).unwrap();

        let mut snapshots = Vec::new();
        for seed in 0..8 {
            let (mut router, store, _) = router(100);
            for position in permutation(plan.len(), seed) {
                let batch = &plan.batches()[position];
                assert_eq!(router.route(batch, fulfilled(batch)).unwrap(), Routed::Written);
            }
            assert!(router.writer().is_complete());
            snapshots.push(store.values());
        }

        for snapshot in &snapshots[1..] {
            assert_eq!(snapshot, &snapshots[0]);
        }
        assert_eq!(snapshots[0][7], 49.0);
    }

    #[test]
    fn test_failure_is_logged_and_not_written() {
        let plan = plan(6, BatchSpec::Size(2)).unwrap();
        let (mut router, store, _) = router(6);

        let failing = &plan.batches()[1];
        let routed = router
            .route(
                failing,
                with_outcome(failing, Outcome::Failed(ComputeError::kernel("bad input"))),
            )
            .unwrap();
        assert_eq!(routed, Routed::Failed);

        for batch in [&plan.batches()[0], &plan.batches()[2]] {
            router.route(batch, fulfilled(batch)).unwrap();
        }

        let (writer, failures, stats) = router.into_parts();
        assert!(!writer.is_complete());
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].range, 2..4);
        assert!(matches!(failures[0].reason, FailureReason::Compute(_)));
        assert_eq!(stats.written(), 2);
        assert_eq!(stats.failed(), 1);

        let values = store.values();
        assert!(values[2].is_nan() && values[3].is_nan());
        assert_eq!(values[5], 25.0);
    }

    #[test]
    fn test_results_after_cancel_are_discarded() {
        let plan = plan(4, BatchSpec::Size(2)).unwrap();
        let (mut router, store, cancel) = router(4);

        let first = &plan.batches()[0];
        router.route(first, fulfilled(first)).unwrap();
        cancel.cancel();

        let second = &plan.batches()[1];
        assert_eq!(router.route(second, fulfilled(second)).unwrap(), Routed::Cancelled);

        let (_, failures, _) = router.into_parts();
        assert_eq!(failures, vec![FailedBatch::new(second, FailureReason::Cancelled)]);
        assert!(store.values()[2].is_nan());
    }

    #[test]
    fn test_overlapping_result_is_fatal() {
        let plan = plan(4, BatchSpec::Size(2)).unwrap();
        let (mut router, _, _) = router(4);

        let first = &plan.batches()[0];
        router.route(first, fulfilled(first)).unwrap();

        // Same batch delivered twice, as a buggy planner or dispatcher might
        let err = router.route(first, fulfilled(first)).unwrap_err();
        assert!(matches!(err, RunError::DuplicateWrite { index: 0, .. }));
    }

    #[test]
    fn test_mismatched_batch_is_internal_error() {
        let plan = plan(4, BatchSpec::Size(2)).unwrap();
        let (mut router, _, _) = router(4);
        let completion = fulfilled(&plan.batches()[0]);
        assert!(matches!(
            router.route(&plan.batches()[1], completion),
            Err(RunError::Internal(_))
        ));
    }

    #[test]
    fn test_timed_out_batches_are_logged() {
        let plan = plan(6, BatchSpec::Size(2)).unwrap();
        let (mut router, _, _) = router(6);
        router.record_timed_out(plan.batches().iter().skip(1));

        assert_eq!(router.failures().len(), 2);
        assert!(router.failures().iter().all(|f| f.reason == FailureReason::TimedOut));
        assert_eq!(router.stats().timed_out(), 2);
    }
}
