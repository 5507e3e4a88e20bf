//! Run coordinator
//!
//! Drives one run from planning to a terminal status:
//!
//! ```text
//! Planning -> Dispatching -> Running { pending } -> Completed
//!                                                \-> CompletedWithFailures
//! ```
//!
//! # Architecture
//!
//! - **Planner**: cuts the domain into batches (`crate::plan`)
//! - **Dispatcher**: submits every batch once, keeps the task registry
//! - **Worker pool**: computes batches in parallel, posts completions on a channel
//! - **Router**: drains completions one at a time on this thread
//! - **Writer**: the only holder of the store handle, applies results
//!
//! All store writes happen on the thread that calls [`Coordinator::run`], in
//! the order completions arrive. Batches are disjoint, so the final store
//! contents do not depend on that order.
//!
//! Compute failures and cancellations are recorded and the run continues;
//! duplicate or out-of-range writes and store failures abort it. Nothing is
//! rolled back: results written before a failure stay in the store.
//!
//! # Example
//!
//! ```
//! use gatherwrite::coordinator::{Coordinator, RunOptions, RunStatus};
//! use gatherwrite::input::LinspaceInput;
//! use gatherwrite::plan::BatchSpec;
//! use gatherwrite::store::memory::MemoryStore;
//! use gatherwrite::worker::Product;
//! use std::sync::Arc;
//!
//! let options = RunOptions::new(1024, BatchSpec::Count(32)).with_threads(4);
//! let store = MemoryStore::new(1024, f64::NAN);
//!
//! let mut coordinator = Coordinator::new(options);
//! let report = coordinator
//!     .run(&LinspaceInput::new(1024, 4.0), Arc::new(Product), Box::new(store.clone()))
//!     .unwrap();
//!
//! assert_eq!(report.status, RunStatus::Completed);
//! assert!(store.values().iter().all(|v| v.is_finite()));
//! ```

pub mod dispatch;
pub mod router;
pub mod writer;

use crate::error::RunError;
use crate::input::InputSource;
use crate::plan::{self, BatchId, BatchSpec};
use crate::pool::{CancelToken, WorkerPool};
use crate::stats::BatchStats;
use crate::store::OutputStore;
use crate::worker::Kernel;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use dispatch::Dispatcher;
use router::{CompletionRouter, FailedBatch, Routed};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use writer::OutputWriter;

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Planning,
    Dispatching,
    Running { pending: usize },
    Completed,
    CompletedWithFailures,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Planning => write!(f, "planning"),
            RunState::Dispatching => write!(f, "dispatching"),
            RunState::Running { pending } => write!(f, "running ({} pending)", pending),
            RunState::Completed => write!(f, "completed"),
            RunState::CompletedWithFailures => write!(f, "completed with failures"),
        }
    }
}

/// Terminal outcome of a run
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    /// Every index of the domain was written
    Completed,
    /// Some batches failed, were cancelled or timed out; their indices hold the sentinel
    CompletedWithFailures(Vec<FailedBatch>),
}

impl RunStatus {
    /// True when no batch failed
    pub fn is_complete(&self) -> bool {
        matches!(self, RunStatus::Completed)
    }

    pub fn failures(&self) -> &[FailedBatch] {
        match self {
            RunStatus::Completed => &[],
            RunStatus::CompletedWithFailures(failures) => failures,
        }
    }
}

/// Structured result of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: RunStatus,
    pub domain_size: u64,
    pub batches: usize,
    pub threads: usize,
    pub kernel: String,
    pub indices_written: u64,
    pub elapsed: Duration,
    pub stats: BatchStats,
}

impl RunReport {
    /// Terminal state matching the status
    pub fn final_state(&self) -> RunState {
        if self.status.is_complete() {
            RunState::Completed
        } else {
            RunState::CompletedWithFailures
        }
    }
}

/// Progress notification, delivered on the coordinator thread after each resolution
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub batch_id: BatchId,
    pub routed: Routed,
    pub resolved: usize,
    pub total: usize,
}

/// Observer of run progress
pub trait RunObserver {
    fn on_resolved(&mut self, progress: &Progress);
}

/// Run parameters
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub domain_size: u64,
    pub batch_spec: BatchSpec,
    pub threads: usize,
    /// Give up on outstanding batches when no completion arrives for this long
    pub stall_timeout: Option<Duration>,
}

impl RunOptions {
    /// Options for `domain_size` indices with one thread per CPU and no stall timeout
    pub fn new(domain_size: u64, batch_spec: BatchSpec) -> Self {
        Self {
            domain_size,
            batch_spec,
            threads: num_cpus::get().max(1),
            stall_timeout: None,
        }
    }

    /// Worker thread count; clamped to the batch count at run time
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }
}

/// Drives runs against one set of options
///
/// A coordinator can be reused; each call to [`Coordinator::run`] starts from
/// `Planning` with a fresh cancellation token.
pub struct Coordinator {
    options: RunOptions,
    cancel: CancelToken,
    observer: Option<Box<dyn RunObserver>>,
    state: RunState,
}

impl Coordinator {
    /// Coordinator in the `Planning` state with no observer
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            cancel: CancelToken::new(),
            observer: None,
            state: RunState::Planning,
        }
    }

    /// Report progress to `observer` after every resolved batch
    pub fn with_observer(mut self, observer: Box<dyn RunObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Token that cancels the current run, or the next one if none is in progress
    ///
    /// Setting it can be done from any thread. Once a run returns the
    /// coordinator switches to a new token, so a token obtained earlier has no
    /// effect on later runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// State of the current or most recent run
    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn set_state(&mut self, state: RunState) {
        tracing::trace!(from = %self.state, to = %state, "run state");
        self.state = state;
    }

    /// Execute the run
    ///
    /// Blocks until every dispatched batch has resolved, then flushes and
    /// closes the store. With a stall timeout set, the run stops waiting once
    /// no completion arrives for that long: outstanding batches are reported
    /// as timed out and worker threads still inside the kernel are detached
    /// rather than joined.
    ///
    /// # Errors
    ///
    /// Returns a [`RunError`] for planning errors and for fatal conditions
    /// during the run. Batch failures are not errors; they are reported in
    /// [`RunReport::status`].
    pub fn run(
        &mut self,
        input: &dyn InputSource,
        kernel: Arc<dyn Kernel>,
        store: Box<dyn OutputStore>,
    ) -> Result<RunReport, RunError> {
        let result = self.execute(input, kernel, store);
        // Leave the old token set so detached workers keep skipping work
        self.cancel = CancelToken::new();
        result
    }

    fn execute(
        &mut self,
        input: &dyn InputSource,
        kernel: Arc<dyn Kernel>,
        store: Box<dyn OutputStore>,
    ) -> Result<RunReport, RunError> {
        let start = Instant::now();
        self.set_state(RunState::Planning);

        let plan = plan::plan(self.options.domain_size, self.options.batch_spec)?;
        plan.validate_partition()?;

        if store.len() != plan.domain_size() {
            return Err(RunError::store(anyhow::anyhow!(
                "store holds {} values but domain has {}",
                store.len(),
                plan.domain_size()
            )));
        }
        if input.len() < plan.domain_size() {
            return Err(RunError::Internal(format!(
                "input has {} rows but domain has {}",
                input.len(),
                plan.domain_size()
            )));
        }

        let threads = self.options.threads.clamp(1, plan.len());
        let kernel_name = kernel.name().to_string();
        tracing::info!(
            domain = plan.domain_size(),
            batches = plan.len(),
            threads,
            kernel = %kernel_name,
            "starting run"
        );

        self.set_state(RunState::Dispatching);
        let (mut pool, completions) = WorkerPool::open(threads, kernel, self.cancel.clone())
            .map_err(|e| RunError::Internal(format!("{:#}", e)))?;

        let mut dispatcher = Dispatcher::new();
        if let Err(e) = dispatcher.dispatch_all(&plan, input, &mut pool) {
            return Err(abort(pool, e));
        }

        let mut router = CompletionRouter::new(OutputWriter::new(store), self.cancel.clone());
        let timed_out = match self.drain(&mut dispatcher, &mut router, &completions, plan.len()) {
            Ok(timed_out) => timed_out,
            Err(e) => return Err(abort(pool, e)),
        };

        if timed_out {
            pool.detach();
        } else {
            pool.close()
                .map_err(|e| RunError::Internal(format!("{:#}", e)))?;
        }

        let (writer, failures, stats) = router.into_parts();
        let indices_written = writer.written_count();
        let complete = writer.is_complete();
        writer.finish()?;

        let status = if failures.is_empty() {
            if !complete {
                return Err(RunError::Internal(format!(
                    "no batch failed but only {} of {} indices were written",
                    indices_written,
                    plan.domain_size()
                )));
            }
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithFailures(failures)
        };

        let report = RunReport {
            status,
            domain_size: plan.domain_size(),
            batches: plan.len(),
            threads,
            kernel: kernel_name,
            indices_written,
            elapsed: start.elapsed(),
            stats,
        };
        self.set_state(report.final_state());

        tracing::info!(
            state = %self.state,
            written = report.indices_written,
            failed_batches = report.status.failures().len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run finished"
        );

        Ok(report)
    }

    /// Route completions until every dispatched task has resolved
    ///
    /// Returns `true` if it gave up on the remaining tasks after a stall timeout.
    fn drain(
        &mut self,
        dispatcher: &mut Dispatcher,
        router: &mut CompletionRouter,
        completions: &Receiver<crate::pool::Completion>,
        total: usize,
    ) -> Result<bool, RunError> {
        let mut resolved = 0;

        while dispatcher.pending_count() > 0 {
            self.set_state(RunState::Running {
                pending: dispatcher.pending_count(),
            });

            let completion = match self.options.stall_timeout {
                Some(timeout) => match completions.recv_timeout(timeout) {
                    Ok(completion) => completion,
                    Err(RecvTimeoutError::Timeout) => {
                        let pending = dispatcher.pending_batches();
                        tracing::warn!(
                            pending = pending.len(),
                            timeout_ms = timeout.as_millis() as u64,
                            "no batch resolved within stall timeout, giving up on the rest"
                        );
                        self.cancel.cancel();
                        router.record_timed_out(pending.iter());
                        return Ok(true);
                    }
                    Err(RecvTimeoutError::Disconnected) => return Err(lost_workers(dispatcher)),
                },
                None => completions.recv().map_err(|_| lost_workers(dispatcher))?,
            };

            let batch = dispatcher.resolve(completion.task_id)?.clone();
            let routed = router.route(&batch, completion)?;
            resolved += 1;

            if let Some(observer) = self.observer.as_mut() {
                observer.on_resolved(&Progress {
                    batch_id: batch.id(),
                    routed,
                    resolved,
                    total,
                });
            }
        }

        Ok(false)
    }
}

fn lost_workers(dispatcher: &Dispatcher) -> RunError {
    RunError::Internal(format!(
        "worker pool exited with {} batches unresolved",
        dispatcher.pending_count()
    ))
}

/// Cancel outstanding work and wait for the pool before surfacing a fatal error
fn abort(pool: WorkerPool, error: RunError) -> RunError {
    if error.is_logic_error() {
        tracing::error!("aborting run on logic error: {}", error);
    } else {
        tracing::error!("aborting run: {}", error);
    }

    pool.cancel();
    if let Err(e) = pool.close() {
        tracing::warn!("worker pool shutdown after fatal error: {:#}", e);
    }
    error
}
