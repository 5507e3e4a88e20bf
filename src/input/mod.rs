//! Input sources
//!
//! An input source produces the payload a worker needs for one batch: the
//! `x` and `y` columns at the batch's indices. Sources are read on the
//! controller while dispatching; workers only ever see the copied payload.

use crate::plan::Batch;
use crate::Result;

/// Payload for one batch: the batch plus its input columns
///
/// `x` and `y` are aligned with `batch.indices()`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchInput {
    pub batch: Batch,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl BatchInput {
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Source of per-index input columns
pub trait InputSource: Send + Sync {
    /// Number of indices the source can serve
    fn len(&self) -> u64;

    /// Load the payload for `batch`
    ///
    /// # Errors
    ///
    /// Returns an error if the batch lies outside the source or the backing
    /// data cannot be read.
    fn load(&self, batch: &Batch) -> Result<BatchInput>;
}

/// `x` evenly spaced over `[0, 1]`, `y = x + offset`
///
/// With `n` points, `x[i] = i / (n - 1)`. A single point sits at 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinspaceInput {
    n: u64,
    offset: f64,
}

impl LinspaceInput {
    pub fn new(n: u64, offset: f64) -> Self {
        Self { n, offset }
    }

    /// Value of `x` at index `i`
    pub fn x(&self, i: u64) -> f64 {
        if self.n <= 1 {
            0.0
        } else {
            i as f64 / (self.n - 1) as f64
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }
}

impl InputSource for LinspaceInput {
    fn len(&self) -> u64 {
        self.n
    }

    fn load(&self, batch: &Batch) -> Result<BatchInput> {
        let range = batch.range();
        if range.end > self.n {
            anyhow::bail!(
                "batch {} covers [{}, {}) but input has {} points",
                batch.id(),
                range.start,
                range.end,
                self.n
            );
        }

        let x: Vec<f64> = range.map(|i| self.x(i)).collect();
        let y = x.iter().map(|v| v + self.offset).collect();

        Ok(BatchInput {
            batch: batch.clone(),
            x,
            y,
        })
    }
}

/// In-memory columns, mostly for tests and embedding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VecInput {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl VecInput {
    /// Create a source from two equally long columns
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            anyhow::bail!("column lengths differ: x={} y={}", x.len(), y.len());
        }
        Ok(Self { x, y })
    }
}

impl InputSource for VecInput {
    fn len(&self) -> u64 {
        self.x.len() as u64
    }

    fn load(&self, batch: &Batch) -> Result<BatchInput> {
        let range = batch.range();
        if range.end > self.len() {
            anyhow::bail!(
                "batch {} ends at {} but input has {} rows",
                batch.id(),
                range.end,
                self.len()
            );
        }

        let (start, end) = (range.start as usize, range.end as usize);
        Ok(BatchInput {
            batch: batch.clone(),
            x: self.x[start..end].to_vec(),
            y: self.y[start..end].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::BatchId;

    #[test]
    fn test_linspace_endpoints() {
        let input = LinspaceInput::new(1024, 4.0);
        assert_eq!(input.x(0), 0.0);
        assert_eq!(input.x(1023), 1.0);
        assert!((input.x(512) - 512.0 / 1023.0).abs() < 1e-15);
    }

    #[test]
    fn test_linspace_single_point() {
        let input = LinspaceInput::new(1, 4.0);
        let payload = input.load(&Batch::new(BatchId(0), 0..1)).unwrap();
        assert_eq!(payload.x, vec![0.0]);
        assert_eq!(payload.y, vec![4.0]);
    }

    #[test]
    fn test_linspace_load_batch() {
        let input = LinspaceInput::new(5, 4.0);
        let payload = input.load(&Batch::new(BatchId(1), 2..4)).unwrap();
        assert_eq!(payload.x, vec![0.5, 0.75]);
        assert_eq!(payload.y, vec![4.5, 4.75]);
        assert_eq!(payload.len(), 2);
    }

    #[test]
    fn test_linspace_rejects_batch_past_end() {
        let input = LinspaceInput::new(5, 0.0);
        assert!(input.load(&Batch::new(BatchId(0), 3..6)).is_err());
    }

    #[test]
    fn test_vec_input() {
        let input = VecInput::new(vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]).unwrap();
        let payload = input.load(&Batch::new(BatchId(0), 1..3)).unwrap();
        assert_eq!(payload.x, vec![2.0, 3.0]);
        assert_eq!(payload.y, vec![5.0, 6.0]);
    }

    #[test]
    fn test_vec_input_length_mismatch() {
        assert!(VecInput::new(vec![1.0], vec![]).is_err());
    }
}
