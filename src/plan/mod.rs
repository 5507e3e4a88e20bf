//! Batch planning
//!
//! Partitions the index domain `[0, N)` into disjoint, covering, contiguous
//! batches. Planning is deterministic: the same `(N, spec)` always yields the
//! same partition, which keeps runs reproducible.
//!
//! # Remainder policy
//!
//! When `N` does not divide evenly, the last batch absorbs the remainder:
//!
//! - [`BatchSpec::Count`]: every batch gets `N / k` indices and the last batch
//!   also takes the `N % k` leftovers.
//! - [`BatchSpec::Size`]: every batch gets `s` indices and the last batch is the
//!   short tail.
//!
//! # Example
//!
//! ```
//! use gatherwrite::plan::{plan, BatchSpec};
//!
//! let plan = plan(5, BatchSpec::Size(2)).unwrap();
//! let ranges: Vec<_> = plan.batches().iter().map(|b| b.range()).collect();
//! assert_eq!(ranges, vec![0..2, 2..4, 4..5]);
//! ```

use crate::error::PlanningError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Identifier of a batch within one plan (its position in the plan)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub usize);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How to cut the domain into batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchSpec {
    /// Split into this many batches
    Count(usize),
    /// Split into batches of this many indices
    Size(u64),
}

impl Default for BatchSpec {
    fn default() -> Self {
        Self::Count(num_cpus::get().max(1))
    }
}

impl fmt::Display for BatchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchSpec::Count(k) => write!(f, "{} batches", k),
            BatchSpec::Size(s) => write!(f, "batches of {}", s),
        }
    }
}

/// A contiguous, non-empty slice of the domain assigned to one worker invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    id: BatchId,
    start: u64,
    end: u64,
}

impl Batch {
    /// Batch `id` covering the half-open `range`
    pub fn new(id: BatchId, range: Range<u64>) -> Self {
        Self {
            id,
            start: range.start,
            end: range.end,
        }
    }

    /// Position of the batch in its plan
    pub fn id(&self) -> BatchId {
        self.id
    }

    /// Half-open index range `[start, end)`
    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }

    /// Number of indices in the batch
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Indices covered by this batch, in ascending order
    pub fn indices(&self) -> Vec<u64> {
        self.range().collect()
    }
}

/// Ordered list of batches covering a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    domain_size: u64,
    batches: Vec<Batch>,
}

impl Plan {
    /// Number of indices the plan covers
    pub fn domain_size(&self) -> u64 {
        self.domain_size
    }

    /// Batches in ascending index order
    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Batch with the given id, if it belongs to this plan
    pub fn get(&self, id: BatchId) -> Option<&Batch> {
        self.batches.get(id.0)
    }

    /// Check that batches are non-empty, pairwise disjoint and cover `[0, N)`
    ///
    /// Batches are contiguous and sorted, so it is enough to check that each
    /// batch starts where the previous one ended.
    pub fn validate_partition(&self) -> Result<(), PlanningError> {
        let mut cursor = 0u64;
        for (position, batch) in self.batches.iter().enumerate() {
            if batch.id.0 != position {
                return Err(PlanningError::InvalidPartition(format!(
                    "batch at position {} has id {}",
                    position, batch.id
                )));
            }
            if batch.is_empty() {
                return Err(PlanningError::InvalidPartition(format!(
                    "batch {} is empty",
                    batch.id
                )));
            }
            if batch.start != cursor {
                return Err(PlanningError::InvalidPartition(format!(
                    "batch {} starts at {} but previous batch ended at {}",
                    batch.id, batch.start, cursor
                )));
            }
            cursor = batch.end;
        }

        if cursor != self.domain_size {
            return Err(PlanningError::InvalidPartition(format!(
                "batches cover [0, {}) but domain is [0, {})",
                cursor, self.domain_size
            )));
        }

        Ok(())
    }
}

/// Partition `[0, domain_size)` according to `spec`
///
/// # Errors
///
/// Returns a [`PlanningError`] if the domain is empty or the spec asks for zero
/// batches or zero-sized batches.
pub fn plan(domain_size: u64, spec: BatchSpec) -> Result<Plan, PlanningError> {
    if domain_size == 0 {
        return Err(PlanningError::EmptyDomain);
    }

    let ranges = match spec {
        BatchSpec::Count(0) => return Err(PlanningError::ZeroBatchCount),
        BatchSpec::Size(0) => return Err(PlanningError::ZeroBatchSize),
        BatchSpec::Count(count) => ranges_by_count(domain_size, count as u64),
        BatchSpec::Size(size) => ranges_by_size(domain_size, size),
    };

    let batches = ranges
        .into_iter()
        .enumerate()
        .map(|(i, range)| Batch::new(BatchId(i), range))
        .collect();

    Ok(Plan {
        domain_size,
        batches,
    })
}

fn ranges_by_count(domain_size: u64, count: u64) -> Vec<Range<u64>> {
    // More batches than indices would leave some empty
    let count = count.min(domain_size);
    let region_size = domain_size / count;

    (0..count)
        .map(|i| {
            let start = i * region_size;
            let end = if i == count - 1 {
                domain_size // Last batch gets remainder
            } else {
                start + region_size
            };
            start..end
        })
        .collect()
}

fn ranges_by_size(domain_size: u64, size: u64) -> Vec<Range<u64>> {
    (0..domain_size)
        .step_by(size as usize)
        .map(|start| start..(start + size).min(domain_size))
        .collect()
}
