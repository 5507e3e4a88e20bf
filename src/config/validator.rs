//! Configuration validation

use super::*;
use crate::plan;
use anyhow::{Context, Result};

/// Upper bound on worker threads
const MAX_THREADS: usize = 1024;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_domain(&config.domain)?;
    validate_batching(&config.batching)?;
    validate_pool(&config.pool)?;
    validate_compute(&config.compute, config)?;
    validate_store(&config.store)?;

    Ok(())
}

/// Validate domain configuration
pub fn validate_domain(domain: &DomainConfig) -> Result<()> {
    if domain.size == 0 {
        anyhow::bail!("domain size must be greater than 0");
    }
    if !domain.offset.is_finite() {
        anyhow::bail!("domain offset must be finite, got {}", domain.offset);
    }
    Ok(())
}

/// Validate batching configuration
pub fn validate_batching(batching: &BatchingConfig) -> Result<()> {
    if batching.batches.is_some() && batching.batch_size.is_some() {
        anyhow::bail!("set either batches or batch_size, not both");
    }
    if batching.batches == Some(0) {
        anyhow::bail!("batches must be greater than 0");
    }
    if batching.batch_size == Some(0) {
        anyhow::bail!("batch_size must be greater than 0");
    }
    Ok(())
}

/// Validate worker pool configuration
pub fn validate_pool(pool: &PoolConfig) -> Result<()> {
    if pool.threads == 0 || pool.threads > MAX_THREADS {
        anyhow::bail!(
            "threads must be between 1 and {}, got {}",
            MAX_THREADS,
            pool.threads
        );
    }
    if pool.stall_timeout_ms == Some(0) {
        anyhow::bail!("stall_timeout_ms must be greater than 0");
    }
    Ok(())
}

/// Validate compute configuration against the plan it will run on
pub fn validate_compute(compute: &ComputeConfig, config: &Config) -> Result<()> {
    if compute.jitter_percent > 100 {
        anyhow::bail!(
            "jitter_percent must be between 0 and 100, got {}",
            compute.jitter_percent
        );
    }
    if compute.jitter_percent > 0 && compute.latency_ms.is_none() {
        anyhow::bail!("jitter_percent requires latency_ms");
    }

    if !compute.fail_batches.is_empty() {
        let plan = plan::plan(config.domain.size, config.batching.spec())
            .context("Cannot plan batches to check fail_batches")?;
        for &batch in &compute.fail_batches {
            if batch >= plan.len() {
                anyhow::bail!(
                    "fail_batches entry {} is out of range: plan has {} batches",
                    batch,
                    plan.len()
                );
            }
        }
    }
    Ok(())
}

/// Validate store configuration
pub fn validate_store(store: &StoreConfig) -> Result<()> {
    if store.path.as_os_str().is_empty() {
        anyhow::bail!("store path must not be empty");
    }
    if store.path.is_dir() {
        anyhow::bail!("store path {} is a directory", store.path.display());
    }
    if store.sentinel.is_infinite() {
        anyhow::bail!("sentinel must be NaN or a finite value");
    }
    if let Some(warning) = sentinel_warning(store) {
        tracing::warn!("{}", warning);
    }
    Ok(())
}

/// Warning for a sentinel the kernel could legitimately produce
///
/// NaN never comes out of a successful batch, so it can't be mistaken for a
/// computed value. A finite sentinel can, and the verification scan would
/// then count such indices as unwritten.
pub fn sentinel_warning(store: &StoreConfig) -> Option<String> {
    if store.sentinel.is_nan() {
        return None;
    }
    Some(format!(
        "sentinel {} is a finite value; computed results equal to it will be reported as unwritten",
        store.sentinel
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_domain() {
        let mut domain = DomainConfig::default();
        domain.size = 0;
        assert!(validate_domain(&domain).is_err());

        domain.size = 10;
        domain.offset = f64::NAN;
        assert!(validate_domain(&domain).is_err());
    }

    #[test]
    fn test_validate_batching() {
        let both = BatchingConfig {
            batches: Some(4),
            batch_size: Some(16),
        };
        assert!(validate_batching(&both).is_err());

        let zero = BatchingConfig {
            batches: Some(0),
            batch_size: None,
        };
        assert!(validate_batching(&zero).is_err());

        let zero_size = BatchingConfig {
            batches: None,
            batch_size: Some(0),
        };
        assert!(validate_batching(&zero_size).is_err());
    }

    #[test]
    fn test_validate_pool() {
        let mut pool = PoolConfig::default();
        pool.threads = 0;
        assert!(validate_pool(&pool).is_err());

        pool.threads = MAX_THREADS + 1;
        assert!(validate_pool(&pool).is_err());

        pool.threads = 4;
        pool.stall_timeout_ms = Some(0);
        assert!(validate_pool(&pool).is_err());
    }

    #[test]
    fn test_fail_batches_must_exist_in_plan() {
        let mut config = Config::default();
        config.batching.batches = Some(32);
        config.compute.fail_batches = vec![31];
        assert!(validate_config(&config).is_ok());

        config.compute.fail_batches = vec![32];
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_jitter_requires_latency() {
        let mut config = Config::default();
        config.compute.jitter_percent = 10;
        assert!(validate_config(&config).is_err());

        config.compute.latency_ms = Some(5);
        assert!(validate_config(&config).is_ok());

        config.compute.jitter_percent = 101;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_store() {
        let mut store = StoreConfig::default();
        store.sentinel = f64::INFINITY;
        assert!(validate_store(&store).is_err());

        store.sentinel = -1.0;
        assert!(validate_store(&store).is_ok());

        store.path = std::env::temp_dir();
        assert!(validate_store(&store).is_err());
    }

    #[test]
    fn test_finite_sentinel_warns() {
        let mut store = StoreConfig::default();
        assert!(sentinel_warning(&store).is_none());

        store.sentinel = 0.0;
        let warning = sentinel_warning(&store).unwrap();
        assert!(warning.contains("sentinel 0"));
        assert!(warning.contains("reported as unwritten"));
        assert!(validate_store(&store).is_ok());
    }
}
