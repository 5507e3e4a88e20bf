//! Sentinel scan
//!
//! Finds the positions of a column that still hold the sentinel, as a sorted
//! list of half-open ranges. Chunks are scanned in parallel with rayon and the
//! runs that straddle chunk boundaries are stitched back together.

use crate::store::file::ColumnFile;
use crate::store::{is_sentinel, OutputStore};
use crate::Result;
use rayon::prelude::*;
use serde::Serialize;
use std::ops::Range;
use std::path::Path;

/// Values per parallel chunk
const SCAN_CHUNK: usize = 1 << 16;

/// Result of scanning a column for unwritten positions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentinelScan {
    pub len: u64,
    pub written: u64,
    pub unwritten: u64,
    /// Maximal runs of sentinel values, in index order
    pub ranges: Vec<Range<u64>>,
}

impl SentinelScan {
    pub fn is_complete(&self) -> bool {
        self.unwritten == 0
    }
}

/// Scan `values` for sentinel runs
pub fn scan_sentinels(values: &[f64], sentinel: f64) -> SentinelScan {
    let per_chunk: Vec<Vec<Range<u64>>> = values
        .par_chunks(SCAN_CHUNK)
        .enumerate()
        .map(|(chunk, slice)| runs_in(slice, (chunk * SCAN_CHUNK) as u64, sentinel))
        .collect();

    let mut ranges: Vec<Range<u64>> = Vec::new();
    for run in per_chunk.into_iter().flatten() {
        match ranges.last_mut() {
            Some(last) if last.end == run.start => last.end = run.end,
            _ => ranges.push(run),
        }
    }

    let unwritten: u64 = ranges.iter().map(|r| r.end - r.start).sum();
    let len = values.len() as u64;
    SentinelScan {
        len,
        written: len - unwritten,
        unwritten,
        ranges,
    }
}

/// Open a column file read-only and scan it
pub fn scan_column_file(path: &Path) -> Result<SentinelScan> {
    let column = ColumnFile::open_read(path)?;
    let values = column.read_all()?;
    Ok(scan_sentinels(&values, column.sentinel()))
}

fn runs_in(slice: &[f64], base: u64, sentinel: f64) -> Vec<Range<u64>> {
    let mut runs = Vec::new();
    let mut open: Option<u64> = None;

    for (offset, &value) in slice.iter().enumerate() {
        let index = base + offset as u64;
        match (is_sentinel(value, sentinel), open) {
            (true, None) => open = Some(index),
            (false, Some(start)) => {
                runs.push(start..index);
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        runs.push(start..base + slice.len() as u64);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_complete_column() {
        let values: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let scan = scan_sentinels(&values, f64::NAN);
        assert!(scan.is_complete());
        assert_eq!(scan.written, 100);
        assert!(scan.ranges.is_empty());
    }

    #[test]
    fn test_ranges() {
        let nan = f64::NAN;
        let values = vec![nan, 1.0, 2.0, nan, nan, 5.0, nan];
        let scan = scan_sentinels(&values, nan);
        assert_eq!(scan.ranges, vec![0..1, 3..5, 6..7]);
        assert_eq!(scan.unwritten, 4);
        assert_eq!(scan.written, 3);
    }

    #[test]
    fn test_finite_sentinel() {
        let values = vec![-1.0, f64::NAN, -1.0, 0.0];
        let scan = scan_sentinels(&values, -1.0);
        assert_eq!(scan.ranges, vec![0..1, 2..3]);
    }

    #[test]
    fn test_run_across_chunk_boundary() {
        let len = SCAN_CHUNK * 3;
        let mut values = vec![0.0; len];
        let start = SCAN_CHUNK - 10;
        let end = 2 * SCAN_CHUNK + 10;
        for v in &mut values[start..end] {
            *v = f64::NAN;
        }

        let scan = scan_sentinels(&values, f64::NAN);
        assert_eq!(scan.ranges, vec![start as u64..end as u64]);
        assert_eq!(scan.unwritten, (end - start) as u64);
    }

    #[test]
    fn test_empty() {
        let scan = scan_sentinels(&[], f64::NAN);
        assert_eq!(scan.len, 0);
        assert!(scan.is_complete());
    }

    #[test]
    fn test_scan_column_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("z.col");
        let mut column = ColumnFile::create(&path, 8, f64::NAN).unwrap();
        column.write_slice(&[0, 1, 2, 6], &[1.0, 1.0, 1.0, 1.0]).unwrap();
        column.close().unwrap();

        let scan = scan_column_file(&path).unwrap();
        assert_eq!(scan.ranges, vec![3..6, 7..8]);
    }
}
