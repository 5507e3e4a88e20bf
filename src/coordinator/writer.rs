//! Output writer
//!
//! Sole owner of the output store handle for the duration of a run. Each
//! `apply()` checks the result against the run's per-index written flags before touching
//! the store, so an index can be written at most once per run and a bad result
//! never reaches the store.
//!
//! The writer is only ever called from the coordinator thread; it does no
//! locking.

use crate::error::RunError;
use crate::store::OutputStore;
use crate::worker::BatchResult;

pub struct OutputWriter {
    store: Box<dyn OutputStore>,
    /// One flag per index, set once the index is written in this run
    written: Vec<bool>,
    written_count: u64,
    applied_batches: usize,
}

impl OutputWriter {
    /// Take ownership of `store`; every index starts unwritten
    pub fn new(store: Box<dyn OutputStore>) -> Self {
        let len = store.len() as usize;
        Self {
            store,
            written: vec![false; len],
            written_count: 0,
            applied_batches: 0,
        }
    }

    /// Domain size of the underlying store
    pub fn len(&self) -> u64 {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Value the store holds at unwritten indices
    pub fn sentinel(&self) -> f64 {
        self.store.sentinel()
    }

    /// Number of indices written so far in this run
    pub fn written_count(&self) -> u64 {
        self.written_count
    }

    /// Number of results applied so far in this run
    pub fn applied_batches(&self) -> usize {
        self.applied_batches
    }

    /// Whether `index` has been written in this run (false outside the domain)
    pub fn is_written(&self, index: u64) -> bool {
        self.written.get(index as usize).copied().unwrap_or(false)
    }

    /// Whether every index of the domain has been written
    pub fn is_complete(&self) -> bool {
        self.written_count == self.store.len()
    }

    /// Write one batch result to the store
    ///
    /// # Errors
    ///
    /// - [`RunError::MalformedResult`] if indices and values differ in length
    /// - [`RunError::IndexOutOfRange`] if an index lies outside the domain
    /// - [`RunError::DuplicateWrite`] if an index was already written in this run
    ///   or appears twice in the result
    /// - [`RunError::StoreUnavailable`] if the store write fails
    ///
    /// The store is untouched when a validation error is returned.
    pub fn apply(&mut self, result: &BatchResult) -> Result<(), RunError> {
        if result.indices.len() != result.values.len() {
            return Err(RunError::MalformedResult {
                batch_id: result.batch_id,
                indices: result.indices.len(),
                values: result.values.len(),
            });
        }

        let len = self.store.len();
        if let Some(&index) = result.indices.iter().find(|&&i| i >= len) {
            return Err(RunError::IndexOutOfRange {
                batch_id: result.batch_id,
                index,
                len,
            });
        }

        let mut claimed = Vec::with_capacity(result.indices.len());
        for &index in &result.indices {
            if self.written[index as usize] {
                // Undo claims made by this result so the flags match the store
                self.release(&claimed);
                return Err(RunError::DuplicateWrite {
                    batch_id: result.batch_id,
                    index,
                });
            }
            self.written[index as usize] = true;
            claimed.push(index);
        }

        if let Err(e) = self.store.write_slice(&result.indices, &result.values) {
            self.release(&claimed);
            return Err(RunError::store(e));
        }

        self.written_count += claimed.len() as u64;
        self.applied_batches += 1;

        tracing::debug!(
            batch = %result.batch_id,
            indices = claimed.len(),
            written = self.written_count,
            "batch written"
        );

        Ok(())
    }

    fn release(&mut self, indices: &[u64]) {
        for &i in indices {
            self.written[i as usize] = false;
        }
    }

    /// Flush and close the store
    pub fn finish(mut self) -> Result<(), RunError> {
        self.store.flush().map_err(RunError::store)?;
        self.store.close().map_err(RunError::store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::BatchId;
    use crate::store::memory::MemoryStore;

    fn result(id: usize, indices: Vec<u64>) -> BatchResult {
        let values = indices.iter().map(|&i| i as f64 * 10.0).collect();
        BatchResult {
            batch_id: BatchId(id),
            indices,
            values,
        }
    }

    #[test]
    fn test_apply_writes_values() {
        let store = MemoryStore::new(6, f64::NAN);
        let mut writer = OutputWriter::new(Box::new(store.clone()));

        writer.apply(&result(0, vec![0, 1, 2])).unwrap();
        assert_eq!(writer.written_count(), 3);
        assert!(!writer.is_complete());

        writer.apply(&result(1, vec![3, 4, 5])).unwrap();
        assert!(writer.is_complete());
        assert_eq!(writer.applied_batches(), 2);
        assert_eq!(store.values(), vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);
    }

    #[test]
    fn test_duplicate_write_rejected_without_touching_store() {
        let store = MemoryStore::new(6, f64::NAN);
        let mut writer = OutputWriter::new(Box::new(store.clone()));

        writer.apply(&result(0, vec![0, 1, 2])).unwrap();
        let err = writer.apply(&result(1, vec![4, 2, 5])).unwrap_err();
        assert!(matches!(
            err,
            RunError::DuplicateWrite { batch_id: BatchId(1), index: 2 }
        ));

        // Partial claims of the rejected result were rolled back
        assert!(!writer.is_written(4));
        assert_eq!(writer.written_count(), 3);
        assert_eq!(store.write_log().len(), 1);
        assert!(store.values()[4].is_nan());
    }

    #[test]
    fn test_written_flags_follow_applied_indices() {
        let mut writer = OutputWriter::new(Box::new(MemoryStore::new(5, f64::NAN)));
        writer.apply(&result(0, vec![1, 3])).unwrap();

        let flags: Vec<bool> = (0..5).map(|i| writer.is_written(i)).collect();
        assert_eq!(flags, vec![false, true, false, true, false]);
        assert!(!writer.is_written(5));
        assert!(writer.sentinel().is_nan());
    }

    #[test]
    fn test_duplicate_within_one_result() {
        let mut writer = OutputWriter::new(Box::new(MemoryStore::new(4, 0.0)));
        let err = writer.apply(&result(0, vec![1, 1])).unwrap_err();
        assert!(matches!(err, RunError::DuplicateWrite { index: 1, .. }));
        assert_eq!(writer.written_count(), 0);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut writer = OutputWriter::new(Box::new(MemoryStore::new(4, 0.0)));
        let err = writer.apply(&result(0, vec![3, 4])).unwrap_err();
        assert!(matches!(err, RunError::IndexOutOfRange { index: 4, len: 4, .. }));
        assert!(!writer.is_written(3));
    }

    #[test]
    fn test_malformed_result_rejected() {
        let mut writer = OutputWriter::new(Box::new(MemoryStore::new(4, 0.0)));
        let bad = BatchResult {
            batch_id: BatchId(0),
            indices: vec![0, 1],
            values: vec![1.0],
        };
        assert!(matches!(
            writer.apply(&bad),
            Err(RunError::MalformedResult { indices: 2, values: 1, .. })
        ));
    }

    #[test]
    fn test_store_failure_is_store_unavailable() {
        let store = MemoryStore::new(4, 0.0);
        store.set_fail_writes(true);
        let mut writer = OutputWriter::new(Box::new(store));

        let err = writer.apply(&result(0, vec![0, 1])).unwrap_err();
        assert!(matches!(err, RunError::StoreUnavailable(_)));
        assert_eq!(writer.written_count(), 0);
        assert!(!writer.is_written(0));
    }

    #[test]
    fn test_finish_closes_store() {
        let store = MemoryStore::new(2, 0.0);
        let writer = OutputWriter::new(Box::new(store.clone()));
        writer.finish().unwrap();
        assert!(store.is_closed());
    }
}
