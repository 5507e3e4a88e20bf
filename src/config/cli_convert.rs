//! CLI to Config conversion utilities

use crate::config::cli;
use crate::worker;
use anyhow::{Context, Result};

/// Parse a duration string (e.g., "250ms", "2s", "1m") to milliseconds
///
/// A bare number is taken as milliseconds.
pub fn parse_duration_ms(s: &str) -> Result<u64> {
    let s = s.trim().to_lowercase();

    let (num_str, multiplier) = if let Some(num) = s.strip_suffix("ms") {
        (num, 1u64)
    } else if let Some(num) = s.strip_suffix("sec").or_else(|| s.strip_suffix('s')) {
        (num, 1000)
    } else if let Some(num) = s.strip_suffix("min").or_else(|| s.strip_suffix('m')) {
        (num, 60_000)
    } else {
        (s.as_str(), 1)
    };

    let num: u64 = num_str
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration format: {}", s))?;

    num.checked_mul(multiplier)
        .with_context(|| format!("Duration out of range: {}", s))
}

/// Convert CLI KernelType to worker KernelType
pub fn convert_kernel_type(cli_type: cli::KernelType) -> worker::KernelType {
    match cli_type {
        cli::KernelType::Product => worker::KernelType::Product,
        cli::KernelType::Square => worker::KernelType::Square,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_millis() {
        assert_eq!(parse_duration_ms("250").unwrap(), 250);
        assert_eq!(parse_duration_ms("250ms").unwrap(), 250);
        assert_eq!(parse_duration_ms(" 15MS ").unwrap(), 15);
    }

    #[test]
    fn test_parse_duration_seconds() {
        assert_eq!(parse_duration_ms("2s").unwrap(), 2000);
        assert_eq!(parse_duration_ms("2sec").unwrap(), 2000);
    }

    #[test]
    fn test_parse_duration_minutes() {
        assert_eq!(parse_duration_ms("1m").unwrap(), 60_000);
        assert_eq!(parse_duration_ms("3min").unwrap(), 180_000);
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration_ms("fast").is_err());
        assert!(parse_duration_ms("-5ms").is_err());
        assert!(parse_duration_ms("").is_err());
    }

    #[test]
    fn test_convert_kernel_type() {
        assert_eq!(
            convert_kernel_type(cli::KernelType::Square),
            worker::KernelType::Square
        );
    }
}
