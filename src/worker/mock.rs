//! Mock kernel for testing
//!
//! Scriptable kernel that records every invocation and can be told to fail,
//! panic or stall on specific batches. Per-batch delays let tests force a
//! particular completion order out of the pool.
//!
//! # Example
//!
//! ```
//! use gatherwrite::input::BatchInput;
//! use gatherwrite::plan::{Batch, BatchId};
//! use gatherwrite::worker::{execute, WorkerContext};
//! use gatherwrite::worker::mock::MockKernel;
//!
//! let kernel = MockKernel::new();
//! kernel.fail_batch(BatchId(1));
//!
//! let input = BatchInput { batch: Batch::new(BatchId(0), 0..2), x: vec![1.0, 2.0], y: vec![0.0, 0.0] };
//! let result = execute(&kernel, &WorkerContext::new(0, 0), &input).unwrap();
//! assert_eq!(result.values, vec![1.0, 2.0]);
//! assert_eq!(kernel.call_count(), 1);
//! ```

use super::{Kernel, WorkerContext};
use crate::error::ComputeError;
use crate::input::BatchInput;
use crate::plan::BatchId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Record of one kernel invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub batch_id: BatchId,
    pub slot: usize,
    pub task_id: u64,
}

/// Mock kernel returning `x` unchanged
///
/// Clones share state, so a test can keep one handle while the pool owns another.
#[derive(Clone, Default)]
pub struct MockKernel {
    fail: Arc<Mutex<HashSet<BatchId>>>,
    panic: Arc<Mutex<HashSet<BatchId>>>,
    delays: Arc<Mutex<HashMap<BatchId, Duration>>>,
    calls: Arc<Mutex<Vec<CallRecord>>>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a kernel error for this batch
    pub fn fail_batch(&self, batch_id: BatchId) {
        self.fail.lock().unwrap().insert(batch_id);
    }

    /// Panic while computing this batch
    pub fn panic_on_batch(&self, batch_id: BatchId) {
        self.panic.lock().unwrap().insert(batch_id);
    }

    /// Sleep before computing this batch
    pub fn delay_batch(&self, batch_id: BatchId, delay: Duration) {
        self.delays.lock().unwrap().insert(batch_id, delay);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().unwrap().clone()
    }

    /// Batch ids in the order the kernel started them
    pub fn started_batches(&self) -> Vec<BatchId> {
        self.calls.lock().unwrap().iter().map(|c| c.batch_id).collect()
    }
}

impl Kernel for MockKernel {
    fn name(&self) -> &str {
        "mock"
    }

    fn compute(&self, ctx: &WorkerContext, input: &BatchInput) -> Result<Vec<f64>, ComputeError> {
        let batch_id = input.batch.id();
        self.calls.lock().unwrap().push(CallRecord {
            batch_id,
            slot: ctx.slot,
            task_id: ctx.task_id,
        });

        let delay = self.delays.lock().unwrap().get(&batch_id).copied();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if self.panic.lock().unwrap().contains(&batch_id) {
            panic!("mock panic for batch {}", batch_id);
        }

        if self.fail.lock().unwrap().contains(&batch_id) {
            return Err(ComputeError::kernel(format!("mock failure for batch {}", batch_id)));
        }

        Ok(input.x.clone())
    }
}
