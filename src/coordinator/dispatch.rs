//! Task dispatcher
//!
//! Submits each planned batch to the pool exactly once and keeps the registry
//! that maps a task back to the batch it computes, so every completion (and
//! every failure) can be attributed to an index range.

use crate::error::RunError;
use crate::input::{BatchInput, InputSource};
use crate::plan::{Batch, BatchId, Plan};
use crate::pool::{TaskId, WorkerPool};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Anything that accepts batch payloads and hands back a task id
pub trait TaskSink {
    fn submit(&mut self, input: BatchInput) -> Result<TaskId, RunError>;
}

impl TaskSink for WorkerPool {
    fn submit(&mut self, input: BatchInput) -> Result<TaskId, RunError> {
        WorkerPool::submit(self, input)
    }
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    registry: HashMap<TaskId, Batch>,
    submitted: HashSet<BatchId>,
    /// Tasks not yet resolved, ordered by submission
    pending: BTreeMap<TaskId, BatchId>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit every batch of `plan`, in plan order
    ///
    /// Returns the number of tasks submitted.
    pub fn dispatch_all<S: TaskSink + ?Sized>(
        &mut self,
        plan: &Plan,
        input: &dyn InputSource,
        sink: &mut S,
    ) -> Result<usize, RunError> {
        for batch in plan.batches() {
            self.submit(batch, input, sink)?;
        }

        tracing::debug!(tasks = plan.len(), "all batches dispatched");
        Ok(plan.len())
    }

    /// Load the payload for `batch` and submit it
    ///
    /// # Errors
    ///
    /// - [`RunError::Internal`] if the batch was already submitted
    /// - [`RunError::InputUnavailable`] if its payload cannot be loaded
    pub fn submit<S: TaskSink + ?Sized>(
        &mut self,
        batch: &Batch,
        input: &dyn InputSource,
        sink: &mut S,
    ) -> Result<TaskId, RunError> {
        if self.submitted.contains(&batch.id()) {
            return Err(RunError::Internal(format!(
                "batch {} submitted twice",
                batch.id()
            )));
        }

        let payload = input.load(batch).map_err(|reason| RunError::InputUnavailable {
            batch_id: batch.id(),
            reason,
        })?;

        let task_id = sink.submit(payload)?;
        self.submitted.insert(batch.id());
        self.registry.insert(task_id, batch.clone());
        self.pending.insert(task_id, batch.id());

        tracing::trace!(task = %task_id, batch = %batch.id(), "batch submitted");
        Ok(task_id)
    }

    /// Batch computed by `task_id`
    pub fn batch_for(&self, task_id: TaskId) -> Option<&Batch> {
        self.registry.get(&task_id)
    }

    /// Mark `task_id` resolved and return its batch
    ///
    /// # Errors
    ///
    /// Returns [`RunError::Internal`] for unknown tasks and for tasks that
    /// already resolved.
    pub fn resolve(&mut self, task_id: TaskId) -> Result<&Batch, RunError> {
        if self.pending.remove(&task_id).is_none() {
            let problem = if self.registry.contains_key(&task_id) {
                "resolved twice"
            } else {
                "was never submitted"
            };
            return Err(RunError::Internal(format!("{} {}", task_id, problem)));
        }

        self.registry
            .get(&task_id)
            .ok_or_else(|| RunError::Internal(format!("{} missing from registry", task_id)))
    }

    /// Tasks submitted so far, resolved or not
    pub fn submitted_count(&self) -> usize {
        self.registry.len()
    }

    /// Tasks submitted but not yet resolved
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Batches whose tasks have not resolved, in submission order
    pub fn pending_batches(&self) -> Vec<Batch> {
        self.pending
            .keys()
            .filter_map(|task_id| self.registry.get(task_id).cloned())
            .collect()
    }
}
