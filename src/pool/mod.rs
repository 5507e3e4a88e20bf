//! Worker pool
//!
//! A fixed set of worker threads fed by a shared task queue. Every submitted
//! task resolves exactly once, and its resolution is posted as a [`Completion`]
//! on a channel the coordinator drains one message at a time. Nothing runs on
//! the pool threads except kernel code; all handling of results happens on
//! the thread that owns the completion receiver.
//!
//! # Lifecycle
//!
//! 1. `WorkerPool::open()` spawns the threads and returns the completion receiver
//! 2. `submit()` queues one task per batch and returns its [`TaskId`]
//! 3. `close()` stops accepting work, lets queued tasks drain, joins every thread,
//!    or `detach()` cancels outstanding work and returns without joining
//!
//! # Cancellation
//!
//! Setting the pool's [`CancelToken`] makes every task that has not started yet
//! resolve as [`Outcome::Cancelled`] without running. Tasks already running
//! finish normally; discarding their results is the consumer's job.

use crate::error::{ComputeError, RunError};
use crate::input::BatchInput;
use crate::plan::BatchId;
use crate::worker::{self, BatchResult, Kernel, WorkerContext};
use crate::Result;
use anyhow::Context;
use crossbeam::channel::{self, Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Handle for one submitted task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// How a task resolved
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Fulfilled(BatchResult),
    Failed(ComputeError),
    Cancelled,
}

impl Outcome {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled(_))
    }
}

/// Resolution message posted by a worker thread
#[derive(Debug, Clone)]
pub struct Completion {
    pub task_id: TaskId,
    pub batch_id: BatchId,
    /// Slot that resolved the task
    pub slot: usize,
    /// Time spent inside the kernel (zero for cancelled tasks)
    pub elapsed: Duration,
    pub outcome: Outcome,
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag; there is no way to clear it
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

struct Job {
    task_id: TaskId,
    input: BatchInput,
}

/// Fixed-size pool of worker threads
pub struct WorkerPool {
    task_tx: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
    cancel: CancelToken,
    next_task: u64,
}

impl WorkerPool {
    /// Spawn `threads` workers running `kernel`
    ///
    /// Returns the pool together with the receiver on which every completion
    /// is posted.
    ///
    /// # Errors
    ///
    /// Fails if `threads` is zero or a thread cannot be spawned.
    pub fn open(
        threads: usize,
        kernel: Arc<dyn Kernel>,
        cancel: CancelToken,
    ) -> Result<(Self, Receiver<Completion>)> {
        if threads == 0 {
            anyhow::bail!("worker pool needs at least one thread");
        }

        let (task_tx, task_rx) = channel::unbounded::<Job>();
        let (done_tx, done_rx) = channel::unbounded::<Completion>();

        let mut handles = Vec::with_capacity(threads);
        for slot in 0..threads {
            let task_rx = task_rx.clone();
            let done_tx = done_tx.clone();
            let kernel = kernel.clone();
            let cancel = cancel.clone();

            let handle = std::thread::Builder::new()
                .name(format!("gatherwrite-worker-{}", slot))
                .spawn(move || worker_loop(slot, kernel, task_rx, done_tx, cancel))
                .with_context(|| format!("Failed to spawn worker thread {}", slot))?;
            handles.push(handle);
        }

        tracing::debug!(threads, kernel = kernel.name(), "worker pool opened");

        Ok((
            Self {
                task_tx: Some(task_tx),
                handles,
                cancel,
                next_task: 0,
            },
            done_rx,
        ))
    }

    /// Number of worker threads
    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    /// Token shared with the worker threads
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Queue one task
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Internal`] if the pool has been closed or all worker
    /// threads have exited.
    pub fn submit(&mut self, input: BatchInput) -> std::result::Result<TaskId, RunError> {
        let tx = self
            .task_tx
            .as_ref()
            .ok_or_else(|| RunError::Internal("submit on closed worker pool".to_string()))?;

        let task_id = TaskId(self.next_task);
        self.next_task += 1;

        tx.send(Job { task_id, input })
            .map_err(|_| RunError::Internal("worker pool has no live threads".to_string()))?;

        Ok(task_id)
    }

    /// Request cancellation of every task that has not started yet
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Stop accepting work and wait for every worker thread to exit
    ///
    /// Queued tasks still resolve (as cancelled if the token is set) before
    /// their thread exits.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    /// Cancel outstanding work and release the worker threads without joining them
    ///
    /// For giving up on kernels that may never return. Queued tasks resolve as
    /// cancelled; a task stuck in its kernel keeps its thread until it returns,
    /// after which the thread exits on its own. Returns the number of threads
    /// left running.
    pub fn detach(mut self) -> usize {
        self.cancel.cancel();
        self.task_tx.take();

        let mut detached = 0;
        for handle in self.handles.drain(..) {
            if !handle.is_finished() {
                detached += 1;
            }
        }

        if detached > 0 {
            tracing::warn!(threads = detached, "detached worker threads still running a kernel");
        }
        detached
    }

    fn shutdown(&mut self) -> Result<()> {
        // Dropping the sender ends each worker's receive loop once the queue drains
        self.task_tx.take();

        let mut panicked = 0;
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                panicked += 1;
            }
        }

        if panicked > 0 {
            anyhow::bail!("{} worker thread(s) panicked", panicked);
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!("worker pool shutdown: {:#}", e);
        }
    }
}

fn worker_loop(
    slot: usize,
    kernel: Arc<dyn Kernel>,
    task_rx: Receiver<Job>,
    done_tx: Sender<Completion>,
    cancel: CancelToken,
) {
    for job in task_rx.iter() {
        let batch_id = job.input.batch.id();

        let (outcome, elapsed) = if cancel.is_cancelled() {
            (Outcome::Cancelled, Duration::ZERO)
        } else {
            let ctx = WorkerContext::new(slot, job.task_id.0);
            let start = Instant::now();
            let outcome = match worker::execute(kernel.as_ref(), &ctx, &job.input) {
                Ok(result) => Outcome::Fulfilled(result),
                Err(e) => Outcome::Failed(e),
            };
            (outcome, start.elapsed())
        };

        tracing::trace!(slot, task = %job.task_id, batch = %batch_id, "task resolved");

        let completion = Completion {
            task_id: job.task_id,
            batch_id,
            slot,
            elapsed,
            outcome,
        };

        if done_tx.send(completion).is_err() {
            // Receiver is gone, nobody is listening for the remaining tasks
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::Batch;
    use crate::worker::mock::MockKernel;
    use crate::worker::Product;
    use std::collections::HashSet;

    fn payload(id: usize) -> BatchInput {
        let start = id as u64 * 2;
        BatchInput {
            batch: Batch::new(BatchId(id), start..start + 2),
            x: vec![id as f64, id as f64],
            y: vec![2.0, 2.0],
        }
    }

    #[test]
    fn test_every_task_resolves_once() {
        let (mut pool, done) = WorkerPool::open(4, Arc::new(Product), CancelToken::new()).unwrap();
        assert_eq!(pool.threads(), 4);

        let mut submitted = HashSet::new();
        for id in 0..20 {
            submitted.insert(pool.submit(payload(id)).unwrap());
        }
        pool.close().unwrap();

        let completions: Vec<Completion> = done.try_iter().collect();
        assert_eq!(completions.len(), 20);

        let resolved: HashSet<TaskId> = completions.iter().map(|c| c.task_id).collect();
        assert_eq!(resolved, submitted);
        assert!(completions.iter().all(|c| c.outcome.is_fulfilled()));
    }

    #[test]
    fn test_failure_does_not_stop_pool() {
        let kernel = MockKernel::new();
        kernel.fail_batch(BatchId(1));
        kernel.panic_on_batch(BatchId(2));

        let (mut pool, done) = WorkerPool::open(1, Arc::new(kernel), CancelToken::new()).unwrap();
        for id in 0..4 {
            pool.submit(payload(id)).unwrap();
        }
        pool.close().unwrap();

        let mut completions: Vec<Completion> = done.try_iter().collect();
        completions.sort_by_key(|c| c.batch_id);
        assert!(completions[0].outcome.is_fulfilled());
        assert!(matches!(completions[1].outcome, Outcome::Failed(ComputeError::Kernel(_))));
        assert!(matches!(completions[2].outcome, Outcome::Failed(ComputeError::Panicked(_))));
        assert!(completions[3].outcome.is_fulfilled());
    }

    #[test]
    fn test_cancel_before_start_skips_kernel() {
        let kernel = MockKernel::new();
        let cancel = CancelToken::new();
        cancel.cancel();

        let (mut pool, done) = WorkerPool::open(2, Arc::new(kernel.clone()), cancel).unwrap();
        for id in 0..5 {
            pool.submit(payload(id)).unwrap();
        }
        pool.close().unwrap();

        let completions: Vec<Completion> = done.try_iter().collect();
        assert_eq!(completions.len(), 5);
        assert!(completions.iter().all(|c| c.outcome == Outcome::Cancelled));
        assert_eq!(kernel.call_count(), 0);
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(WorkerPool::open(0, Arc::new(Product), CancelToken::new()).is_err());
    }

    #[test]
    fn test_detach_does_not_wait_for_stuck_kernel() {
        let kernel = MockKernel::new();
        kernel.delay_batch(BatchId(0), Duration::from_millis(500));

        let (mut pool, done) = WorkerPool::open(1, Arc::new(kernel.clone()), CancelToken::new()).unwrap();
        pool.submit(payload(0)).unwrap();
        pool.submit(payload(1)).unwrap();

        // Let the worker pick up the slow batch
        while kernel.call_count() == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }

        let start = Instant::now();
        assert_eq!(pool.detach(), 1);
        assert!(start.elapsed() < Duration::from_millis(250));

        // Queued batch resolves as cancelled once the stuck one returns
        let completions: Vec<Completion> = done.iter().collect();
        assert_eq!(completions.len(), 2);
        assert_eq!(completions[1].outcome, Outcome::Cancelled);
        assert_eq!(kernel.call_count(), 1);
    }

    #[test]
    fn test_drop_joins_threads() {
        let kernel = MockKernel::new();
        kernel.delay_batch(BatchId(0), Duration::from_millis(20));
        let done = {
            let (mut pool, done) = WorkerPool::open(1, Arc::new(kernel.clone()), CancelToken::new()).unwrap();
            pool.submit(payload(0)).unwrap();
            done
        };
        // Pool dropped: the in-flight task must have resolved
        assert_eq!(done.try_iter().count(), 1);
    }
}
