//! TOML configuration file parsing

use super::*;
use crate::config::cli::RunArgs;
use crate::config::cli_convert::{convert_kernel_type, parse_duration_ms};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config =
        ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Build the run configuration from `--config` (if given) and flags
pub fn load_config(args: &RunArgs) -> Result<Config> {
    let base = match &args.config {
        Some(path) => parse_toml_file(path)?,
        None => Config::default(),
    };
    merge_cli_with_config(args, base)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(args: &RunArgs, mut config: Config) -> Result<Config> {
    // Domain
    if let Some(size) = args.size {
        config.domain.size = size;
    }
    if let Some(offset) = args.offset {
        config.domain.offset = offset;
    }

    // Batching: a flag replaces whichever form the file used
    if let Some(batches) = args.batches {
        config.batching.batches = Some(batches);
        config.batching.batch_size = None;
    }
    if let Some(batch_size) = args.batch_size {
        config.batching.batch_size = Some(batch_size);
        config.batching.batches = None;
    }

    // Pool
    if let Some(threads) = args.threads {
        config.pool.threads = threads;
    }
    if let Some(ref timeout) = args.stall_timeout {
        config.pool.stall_timeout_ms = Some(
            parse_duration_ms(timeout).context("Invalid --stall-timeout")?,
        );
    }

    // Compute
    if let Some(kernel) = args.kernel {
        config.compute.kernel = convert_kernel_type(kernel);
    }
    if let Some(ref latency) = args.latency {
        config.compute.latency_ms = Some(parse_duration_ms(latency).context("Invalid --latency")?);
    }
    if let Some(jitter) = args.jitter {
        config.compute.jitter_percent = jitter;
    }
    if let Some(seed) = args.seed {
        config.compute.seed = seed;
    }
    if !args.fail_batches.is_empty() {
        config.compute.fail_batches = args.fail_batches.clone();
    }

    // Store
    if let Some(ref path) = args.output {
        config.store.path = path.clone();
    }
    if let Some(sentinel) = args.sentinel {
        config.store.sentinel = sentinel;
    }

    // Output
    if let Some(ref json) = args.json {
        config.output.json_output = Some(json.clone());
    }
    config.output.show_latency |= args.show_latency;
    config.output.show_per_slot |= args.show_per_slot;
    if args.no_verify {
        config.output.verify = false;
    }

    config.runtime.dry_run |= args.dry_run;

    Ok(config)
}
