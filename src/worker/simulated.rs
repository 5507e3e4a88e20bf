//! Simulated workload wrapper
//!
//! Wraps a real kernel with a sleep before computing, standing in for an
//! expensive per-batch computation, and can fail selected batches on purpose.
//!
//! Jitter is drawn from an RNG seeded by `(seed, batch id)`, so a batch sleeps
//! the same amount on every run regardless of which slot picks it up.

use super::{Kernel, WorkerContext};
use crate::error::ComputeError;
use crate::input::BatchInput;
use crate::plan::BatchId;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::collections::HashSet;
use std::time::Duration;

pub struct Simulated {
    inner: Box<dyn Kernel>,
    latency: Duration,
    jitter_percent: u8,
    seed: u64,
    fail_batches: HashSet<BatchId>,
    name: String,
}

impl Simulated {
    pub fn new(inner: Box<dyn Kernel>) -> Self {
        let name = format!("simulated({})", inner.name());
        Self {
            inner,
            latency: Duration::ZERO,
            jitter_percent: 0,
            seed: 0,
            fail_batches: HashSet::new(),
            name,
        }
    }

    /// Sleep this long before computing each batch
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Vary the latency by up to +/- this percentage per batch
    pub fn with_jitter(mut self, percent: u8, seed: u64) -> Self {
        self.jitter_percent = percent.min(100);
        self.seed = seed;
        self
    }

    /// Fail these batches with a kernel error
    pub fn with_failures<I: IntoIterator<Item = BatchId>>(mut self, batches: I) -> Self {
        self.fail_batches.extend(batches);
        self
    }

    /// Latency this batch will sleep for
    pub fn latency_for(&self, batch_id: BatchId) -> Duration {
        if self.jitter_percent == 0 || self.latency.is_zero() {
            return self.latency;
        }

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed ^ batch_id.0 as u64);
        let spread = self.jitter_percent as f64 / 100.0;
        let factor = 1.0 + rng.gen_range(-spread..=spread);
        self.latency.mul_f64(factor.max(0.0))
    }
}

impl Kernel for Simulated {
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, ctx: &WorkerContext, input: &BatchInput) -> Result<Vec<f64>, ComputeError> {
        let batch_id = input.batch.id();
        let latency = self.latency_for(batch_id);

        tracing::debug!(
            slot = ctx.slot,
            task = ctx.task_id,
            batch = %batch_id,
            latency_ms = latency.as_millis() as u64,
            "computing batch"
        );

        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        if self.fail_batches.contains(&batch_id) {
            return Err(ComputeError::kernel(format!(
                "injected failure for batch {}",
                batch_id
            )));
        }

        self.inner.compute(ctx, input)
    }
}
