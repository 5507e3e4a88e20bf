//! Worker contract
//!
//! A worker is a pure compute unit: given one batch's payload it produces one
//! value per index. Kernels must not touch process-wide state and never see the
//! output store; the only thing they learn about where they run is the
//! [`WorkerContext`] passed into each call, which is for diagnostics only.
//!
//! # Kernels
//!
//! - [`Product`]: `z = x * y`
//! - [`Square`]: `z = x * x`
//! - [`simulated::Simulated`]: wraps another kernel with artificial latency and
//!   injected failures, standing in for expensive real computations
//! - [`mock::MockKernel`]: scriptable kernel for tests
//!
//! # Example
//!
//! ```
//! use gatherwrite::input::{InputSource, LinspaceInput};
//! use gatherwrite::plan::{Batch, BatchId};
//! use gatherwrite::worker::{execute, Product, WorkerContext};
//!
//! let input = LinspaceInput::new(5, 4.0);
//! let payload = input.load(&Batch::new(BatchId(0), 0..5)).unwrap();
//! let result = execute(&Product, &WorkerContext::new(0, 0), &payload).unwrap();
//! assert_eq!(result.indices, vec![0, 1, 2, 3, 4]);
//! assert_eq!(result.values[4], 5.0);
//! ```

pub mod mock;
pub mod simulated;

use crate::error::ComputeError;
use crate::input::BatchInput;
use crate::plan::BatchId;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};

/// Where a kernel invocation runs
///
/// Passed explicitly into every call. Kernels may log it but must not let it
/// influence the values they compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerContext {
    /// Pool slot (thread number) executing the task
    pub slot: usize,
    /// Task being executed
    pub task_id: u64,
}

impl WorkerContext {
    pub fn new(slot: usize, task_id: u64) -> Self {
        Self { slot, task_id }
    }
}

/// Values computed for one batch
///
/// Immutable once produced. `indices` and `values` are aligned.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub indices: Vec<u64>,
    pub values: Vec<f64>,
}

/// Pure per-batch computation
pub trait Kernel: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &str;

    /// Compute one value per index of `input`
    ///
    /// # Errors
    ///
    /// Returns a [`ComputeError`] when the batch cannot be computed. The error is
    /// attached to the batch and does not affect other batches.
    fn compute(&self, ctx: &WorkerContext, input: &BatchInput) -> Result<Vec<f64>, ComputeError>;
}

/// Run `kernel` on `input`, capturing panics and checking the output shape
pub fn execute(
    kernel: &dyn Kernel,
    ctx: &WorkerContext,
    input: &BatchInput,
) -> Result<BatchResult, ComputeError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| kernel.compute(ctx, input)));

    let values = match outcome {
        Ok(result) => result?,
        Err(payload) => return Err(ComputeError::Panicked(panic_message(payload))),
    };

    let expected = input.len();
    if values.len() != expected {
        return Err(ComputeError::LengthMismatch {
            expected,
            got: values.len(),
        });
    }

    Ok(BatchResult {
        batch_id: input.batch.id(),
        indices: input.batch.indices(),
        values,
    })
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// `z = x * y`
#[derive(Debug, Clone, Copy, Default)]
pub struct Product;

impl Kernel for Product {
    fn name(&self) -> &str {
        "product"
    }

    fn compute(&self, _ctx: &WorkerContext, input: &BatchInput) -> Result<Vec<f64>, ComputeError> {
        Ok(input.x.iter().zip(&input.y).map(|(x, y)| x * y).collect())
    }
}

/// `z = x * x`
#[derive(Debug, Clone, Copy, Default)]
pub struct Square;

impl Kernel for Square {
    fn name(&self) -> &str {
        "square"
    }

    fn compute(&self, _ctx: &WorkerContext, input: &BatchInput) -> Result<Vec<f64>, ComputeError> {
        Ok(input.x.iter().map(|x| x * x).collect())
    }
}

/// Built-in kernel selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KernelType {
    #[default]
    Product,
    Square,
}

impl KernelType {
    pub fn build(self) -> Box<dyn Kernel> {
        match self {
            KernelType::Product => Box::new(Product),
            KernelType::Square => Box::new(Square),
        }
    }
}

impl std::fmt::Display for KernelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelType::Product => write!(f, "product"),
            KernelType::Square => write!(f, "square"),
        }
    }
}
