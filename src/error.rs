//! Error taxonomy for a run
//!
//! Errors fall into two groups:
//!
//! - **Recovered**: [`ComputeError`] and cancellation. These are attached to the
//!   failing batch, recorded in the run's failure log, and the run keeps going.
//! - **Fatal**: [`RunError::DuplicateWrite`], [`RunError::IndexOutOfRange`] and
//!   [`RunError::StoreUnavailable`]. These abort the run. Results already written
//!   stay in the store.
//!
//! [`PlanningError`] is raised before any task is submitted.

use crate::plan::BatchId;
use thiserror::Error;

/// Invalid domain or batch configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    /// Domain has no indices
    #[error("domain size must be greater than 0")]
    EmptyDomain,

    /// Batch count of zero
    #[error("batch count must be greater than 0")]
    ZeroBatchCount,

    /// Batch size of zero
    #[error("batch size must be greater than 0")]
    ZeroBatchSize,

    /// Produced partition does not cover the domain exactly
    #[error("batch partition is invalid: {0}")]
    InvalidPartition(String),
}

/// Error raised inside a worker while computing one batch
///
/// Captured by the pool and attached to the batch's completion instead of
/// unwinding through the pool.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputeError {
    /// Kernel reported a failure
    #[error("kernel failed: {0}")]
    Kernel(String),

    /// Kernel panicked; the payload message is preserved when it is a string
    #[error("kernel panicked: {0}")]
    Panicked(String),

    /// Kernel returned the wrong number of values
    #[error("kernel returned {got} values for {expected} indices")]
    LengthMismatch { expected: usize, got: usize },
}

impl ComputeError {
    /// Create a kernel error from any displayable value
    pub fn kernel<E: std::fmt::Display>(err: E) -> Self {
        Self::Kernel(err.to_string())
    }
}

/// Errors that abort a run
#[derive(Error, Debug)]
pub enum RunError {
    /// Planning failed before any submission
    #[error(transparent)]
    Planning(#[from] PlanningError),

    /// A result targets an index that has already been written in this run
    #[error("batch {batch_id} writes index {index} which was already written")]
    DuplicateWrite { batch_id: BatchId, index: u64 },

    /// A result targets an index outside the store's domain
    #[error("batch {batch_id} writes index {index} outside domain of {len}")]
    IndexOutOfRange { batch_id: BatchId, index: u64, len: u64 },

    /// A result carries a different number of values than indices
    #[error("batch {batch_id} carries {values} values for {indices} indices")]
    MalformedResult { batch_id: BatchId, indices: usize, values: usize },

    /// Input payload for a batch could not be loaded
    #[error("input unavailable for batch {batch_id}: {reason:#}")]
    InputUnavailable { batch_id: BatchId, reason: anyhow::Error },

    /// The output store could not be opened, written or flushed
    #[error("output store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),

    /// Pool or dispatcher bookkeeping went wrong
    #[error("internal coordinator error: {0}")]
    Internal(String),
}

impl RunError {
    /// Wrap a store failure
    pub fn store(err: anyhow::Error) -> Self {
        Self::StoreUnavailable(err)
    }

    /// Whether this error is a logic error in planning or dispatch rather than
    /// an environmental failure
    pub fn is_logic_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateWrite { .. }
                | Self::IndexOutOfRange { .. }
                | Self::MalformedResult { .. }
                | Self::Internal(_)
        )
    }
}
