//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::coordinator::RunOptions;
use crate::plan::{BatchId, BatchSpec};
use crate::worker::simulated::Simulated;
use crate::worker::{Kernel, KernelType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Complete run configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub domain: DomainConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Coordinator options derived from this configuration
    pub fn run_options(&self) -> RunOptions {
        let mut options =
            RunOptions::new(self.domain.size, self.batching.spec()).with_threads(self.pool.threads);
        if let Some(ms) = self.pool.stall_timeout_ms {
            options = options.with_stall_timeout(Duration::from_millis(ms));
        }
        options
    }
}

/// Index domain and generated input columns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Number of indices (N)
    #[serde(default = "default_domain_size")]
    pub size: u64,
    /// Offset added to `x` to form the `y` column
    #[serde(default = "default_offset")]
    pub offset: f64,
}

fn default_domain_size() -> u64 {
    1024
}

fn default_offset() -> f64 {
    4.0
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            size: default_domain_size(),
            offset: default_offset(),
        }
    }
}

/// Batch planning; at most one of `batches` and `batch_size` may be set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchingConfig {
    /// Number of batches
    pub batches: Option<usize>,
    /// Indices per batch
    pub batch_size: Option<u64>,
}

impl BatchingConfig {
    /// Planner spec; one batch per CPU when neither field is set
    pub fn spec(&self) -> BatchSpec {
        match (self.batches, self.batch_size) {
            (Some(count), _) => BatchSpec::Count(count),
            (None, Some(size)) => BatchSpec::Size(size),
            (None, None) => BatchSpec::default(),
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of worker threads
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Give up on outstanding batches when nothing resolves for this long
    pub stall_timeout_ms: Option<u64>,
}

fn default_threads() -> usize {
    num_cpus::get().max(1)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            stall_timeout_ms: None,
        }
    }
}

/// Kernel selection and simulated workload knobs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComputeConfig {
    #[serde(default)]
    pub kernel: KernelType,
    /// Simulated per-batch latency (milliseconds)
    pub latency_ms: Option<u64>,
    /// Latency jitter (percent, 0-100)
    #[serde(default)]
    pub jitter_percent: u8,
    /// Seed for latency jitter
    #[serde(default)]
    pub seed: u64,
    /// Batches that fail on purpose
    #[serde(default)]
    pub fail_batches: Vec<usize>,
}

impl ComputeConfig {
    /// Whether the kernel needs the simulated wrapper
    pub fn is_simulated(&self) -> bool {
        self.latency_ms.is_some() || !self.fail_batches.is_empty()
    }

    pub fn build_kernel(&self) -> Arc<dyn Kernel> {
        let kernel = self.kernel.build();
        if !self.is_simulated() {
            return Arc::from(kernel);
        }

        let simulated = Simulated::new(kernel)
            .with_latency(Duration::from_millis(self.latency_ms.unwrap_or(0)))
            .with_jitter(self.jitter_percent, self.seed)
            .with_failures(self.fail_batches.iter().copied().map(BatchId));
        Arc::new(simulated)
    }
}

/// Output column file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Column file path
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    /// Value marking an index as not yet written
    #[serde(default = "default_sentinel")]
    pub sentinel: f64,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("gatherwrite.col")
}

fn default_sentinel() -> f64 {
    f64::NAN
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            sentinel: default_sentinel(),
        }
    }
}

/// Report output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// JSON report file path
    pub json_output: Option<PathBuf>,
    /// Show latency percentiles
    #[serde(default)]
    pub show_latency: bool,
    /// Show batches resolved per worker slot
    #[serde(default)]
    pub show_per_slot: bool,
    /// Re-read the column after the run and count sentinel values
    #[serde(default = "default_verify")]
    pub verify: bool,
}

fn default_verify() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json_output: None,
            show_latency: false,
            show_per_slot: false,
            verify: default_verify(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Validate and print the plan without running
    #[serde(default)]
    pub dry_run: bool,
    /// Log verbosity (0 = warn, 1 = info, 2 = debug, 3+ = trace)
    #[serde(default)]
    pub verbosity: u8,
}
