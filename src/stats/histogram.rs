//! Batch latency histogram
//!
//! Thin HdrHistogram wrapper recording how long each batch spent inside its
//! kernel. Range is 1us to 1 hour at 3 significant digits; samples outside the
//! range are clamped.

use hdrhistogram::Histogram;
use std::time::Duration;

const MIN_MICROS: u64 = 1;
const MAX_MICROS: u64 = 3_600_000_000;

#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    histogram: Histogram<u64>,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        // Bounds are constants, so construction cannot fail
        let histogram = Histogram::new_with_bounds(MIN_MICROS, MAX_MICROS, 3)
            .expect("static histogram bounds are valid");
        Self { histogram }
    }

    #[inline]
    pub fn record(&mut self, latency: Duration) {
        let micros = (latency.as_micros() as u64).clamp(MIN_MICROS, MAX_MICROS);
        let _ = self.histogram.record(micros);
    }

    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.len() == 0
    }

    /// Latency at `percentile` (0.0 - 100.0), `None` when empty
    pub fn percentile(&self, percentile: f64) -> Option<Duration> {
        self.non_empty()
            .map(|h| Duration::from_micros(h.value_at_percentile(percentile)))
    }

    pub fn min(&self) -> Option<Duration> {
        self.non_empty().map(|h| Duration::from_micros(h.min()))
    }

    pub fn max(&self) -> Option<Duration> {
        self.non_empty().map(|h| Duration::from_micros(h.max()))
    }

    pub fn mean(&self) -> Option<Duration> {
        self.non_empty().map(|h| Duration::from_micros(h.mean() as u64))
    }

    fn non_empty(&self) -> Option<&Histogram<u64>> {
        if self.histogram.len() == 0 {
            None
        } else {
            Some(&self.histogram)
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}
