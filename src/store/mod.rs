//! Output store abstraction
//!
//! The output store is a persistent `f64` column addressed by index. Every
//! position starts out holding a sentinel value that marks it as unwritten.
//!
//! # Store Types
//!
//! - **ColumnFile**: single-file column store with positional writes
//! - **MemoryStore**: in-memory column for tests
//!
//! # Single writer
//!
//! Stores do no locking of their own. Only the output writer, running on the
//! coordinator thread, ever holds a store opened for update.

pub mod file;
pub mod memory;

use crate::Result;

/// Index-addressed column of `f64` values
pub trait OutputStore: Send {
    /// Number of positions in the store
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value marking a position as unwritten
    fn sentinel(&self) -> f64;

    /// Write `values[k]` at `indices[k]` for every `k`
    ///
    /// Indices need not be sorted or contiguous. Callers guarantee that
    /// `indices.len() == values.len()` and that every index is in range.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the write fails.
    fn write_slice(&mut self, indices: &[u64], values: &[f64]) -> Result<()>;

    /// Read the whole column
    fn read_all(&self) -> Result<Vec<f64>>;

    /// Make written values durable
    fn flush(&mut self) -> Result<()>;

    /// Release the store; further writes fail
    fn close(&mut self) -> Result<()>;
}

/// Whether `value` is the sentinel
///
/// Compares bit patterns so that a NaN sentinel matches any NaN.
pub fn is_sentinel(value: f64, sentinel: f64) -> bool {
    if sentinel.is_nan() {
        value.is_nan()
    } else {
        value.to_bits() == sentinel.to_bits()
    }
}

/// Split parallel index/value slices into runs of consecutive indices
///
/// Returns `(first_index, values)` pairs, preserving input order.
pub(crate) fn contiguous_runs<'a>(indices: &[u64], values: &'a [f64]) -> Vec<(u64, &'a [f64])> {
    let mut runs = Vec::new();
    let mut run_start = 0;

    for k in 1..=indices.len() {
        let breaks = k == indices.len() || indices[k] != indices[k - 1].wrapping_add(1);
        if breaks {
            runs.push((indices[run_start], &values[run_start..k]));
            run_start = k;
        }
    }

    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_sentinel_nan() {
        assert!(is_sentinel(f64::NAN, f64::NAN));
        assert!(!is_sentinel(0.0, f64::NAN));
    }

    #[test]
    fn test_is_sentinel_value() {
        assert!(is_sentinel(-1.0, -1.0));
        assert!(!is_sentinel(1.0, -1.0));
        assert!(!is_sentinel(f64::NAN, -1.0));
    }

    #[test]
    fn test_contiguous_runs() {
        let indices = [4, 5, 6, 10, 11, 2];
        let values = [0.4, 0.5, 0.6, 1.0, 1.1, 0.2];
        let runs = contiguous_runs(&indices, &values);
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0], (4, &values[0..3]));
        assert_eq!(runs[1], (10, &values[3..5]));
        assert_eq!(runs[2], (2, &values[5..6]));
    }

    #[test]
    fn test_contiguous_runs_empty() {
        assert!(contiguous_runs(&[], &[]).is_empty());
    }
}
