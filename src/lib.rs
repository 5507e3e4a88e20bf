//! gatherwrite - parallel batch compute with a single-writer result store
//!
//! Cuts an index domain into disjoint batches, computes them on a pool of
//! worker threads, and gathers every result back to one coordinator thread
//! that alone writes the output column.
//!
//! # Architecture
//!
//! - **Planner**: deterministic, disjoint, covering batch partitions
//! - **Worker pool**: OS threads fed by a task channel, reporting on a completion channel
//! - **Coordinator**: dispatches every batch once, routes completions, owns the writer
//! - **Output store**: preallocated column file with positional writes
//! - **Reports**: text and JSON, with a parallel sentinel scan of the result

pub mod config;
pub mod coordinator;
pub mod error;
pub mod input;
pub mod output;
pub mod plan;
pub mod pool;
pub mod stats;
pub mod store;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{Coordinator, RunOptions, RunReport, RunStatus};
pub use error::{ComputeError, PlanningError, RunError};
pub use plan::{plan, BatchId, BatchSpec, Plan};
pub use store::OutputStore;
pub use worker::Kernel;

/// Result type used throughout gatherwrite
pub type Result<T> = anyhow::Result<T>;
