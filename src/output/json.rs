//! JSON output formatting
//!
//! Serializes a finished run into a single report document: run metadata
//! (host, start time, configuration), batch counts, latency percentiles,
//! failed ranges and the post-run sentinel scan.

use super::text::format_duration;
use super::verify::SentinelScan;
use crate::config::Config;
use crate::coordinator::{RunReport, RunStatus};
use crate::stats::histogram::LatencyHistogram;
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::Duration;

/// Duration with both microseconds and human-readable format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDuration {
    pub micros: u64,
    pub human: String,
}

impl JsonDuration {
    pub fn from_duration(d: Duration) -> Self {
        Self {
            micros: d.as_micros() as u64,
            human: format_duration(d),
        }
    }
}

/// Batch latency statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonLatency {
    pub samples: u64,
    pub min: JsonDuration,
    pub mean: JsonDuration,
    pub max: JsonDuration,
    pub p50: JsonDuration,
    pub p90: JsonDuration,
    pub p99: JsonDuration,
}

impl JsonLatency {
    /// `None` when no batch recorded a latency
    pub fn from_histogram(hist: &LatencyHistogram) -> Option<Self> {
        Some(Self {
            samples: hist.len(),
            min: JsonDuration::from_duration(hist.min()?),
            mean: JsonDuration::from_duration(hist.mean()?),
            max: JsonDuration::from_duration(hist.max()?),
            p50: JsonDuration::from_duration(hist.percentile(50.0)?),
            p90: JsonDuration::from_duration(hist.percentile(90.0)?),
            p99: JsonDuration::from_duration(hist.percentile(99.0)?),
        })
    }
}

/// Run metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRunInfo {
    pub tool_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub start_time: DateTime<Utc>,
    pub duration: JsonDuration,
    pub config: JsonRunConfig,
}

/// Configuration summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRunConfig {
    pub domain_size: u64,
    pub offset: f64,
    pub batching: String,
    pub threads: usize,
    pub kernel: String,
    pub output: String,
    /// Rendered as text so a NaN sentinel survives JSON
    pub sentinel: String,
}

/// Batch resolution counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonBatchStats {
    pub total: usize,
    pub written: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub timed_out: usize,
    pub indices_written: u64,
    pub per_slot: BTreeMap<usize, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<JsonLatency>,
}

/// A batch left at the sentinel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonFailedBatch {
    pub batch_id: usize,
    pub start: u64,
    pub end: u64,
    pub reason: String,
}

/// Post-run sentinel scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonVerification {
    pub written: u64,
    pub unwritten: u64,
    pub unwritten_ranges: Vec<[u64; 2]>,
}

impl From<&SentinelScan> for JsonVerification {
    fn from(scan: &SentinelScan) -> Self {
        Self {
            written: scan.written,
            unwritten: scan.unwritten,
            unwritten_ranges: scan.ranges.iter().map(|r| [r.start, r.end]).collect(),
        }
    }
}

/// Complete JSON report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    pub run_info: JsonRunInfo,
    pub status: String,
    pub batches: JsonBatchStats,
    pub failures: Vec<JsonFailedBatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<JsonVerification>,
}

/// Build the JSON report for a finished run
pub fn build_report(
    report: &RunReport,
    config: &Config,
    start_time: DateTime<Utc>,
    scan: Option<&SentinelScan>,
) -> JsonReport {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok());

    let stats = &report.stats;
    let status = match report.status {
        RunStatus::Completed => "completed",
        RunStatus::CompletedWithFailures(_) => "completed_with_failures",
    };

    JsonReport {
        run_info: JsonRunInfo {
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            hostname,
            start_time,
            duration: JsonDuration::from_duration(report.elapsed),
            config: JsonRunConfig {
                domain_size: report.domain_size,
                offset: config.domain.offset,
                batching: config.batching.spec().to_string(),
                threads: report.threads,
                kernel: report.kernel.clone(),
                output: config.store.path.display().to_string(),
                sentinel: config.store.sentinel.to_string(),
            },
        },
        status: status.to_string(),
        batches: JsonBatchStats {
            total: report.batches,
            written: stats.written(),
            failed: stats.failed(),
            cancelled: stats.cancelled(),
            timed_out: stats.timed_out(),
            indices_written: report.indices_written,
            per_slot: stats.per_slot().clone(),
            latency: JsonLatency::from_histogram(stats.latency()),
        },
        failures: report
            .status
            .failures()
            .iter()
            .map(|f| JsonFailedBatch {
                batch_id: f.batch_id.0,
                start: f.range.start,
                end: f.range.end,
                reason: f.reason.to_string(),
            })
            .collect(),
        verification: scan.map(JsonVerification::from),
    }
}

/// Write the report to `output_path`
pub fn write_report(output_path: &Path, report: &JsonReport, pretty: bool) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create JSON report: {}", output_path.display()))?;
    let writer = BufWriter::new(file);

    if pretty {
        serde_json::to_writer_pretty(writer, report)?;
    } else {
        serde_json::to_writer(writer, report)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::router::{FailedBatch, FailureReason};
    use crate::plan::{Batch, BatchId};
    use crate::stats::BatchStats;
    use tempfile::TempDir;

    fn sample_report() -> RunReport {
        let mut stats = BatchStats::new();
        stats.record_written(0, Duration::from_millis(3), 2);
        stats.record_written(1, Duration::from_millis(5), 2);

        let failed = Batch::new(BatchId(2), 4..6);
        RunReport {
            status: RunStatus::CompletedWithFailures(vec![FailedBatch::new(
                &failed,
                FailureReason::Cancelled,
            )]),
            domain_size: 6,
            batches: 3,
            threads: 2,
            kernel: "product".to_string(),
            indices_written: 4,
            elapsed: Duration::from_millis(12),
            stats,
        }
    }

    #[test]
    fn test_json_duration() {
        let d = JsonDuration::from_duration(Duration::from_micros(1500));
        assert_eq!(d.micros, 1500);
        assert_eq!(d.human, "1.500ms");
    }

    #[test]
    fn test_empty_latency_is_omitted() {
        assert!(JsonLatency::from_histogram(&LatencyHistogram::new()).is_none());
    }

    #[test]
    fn test_build_report() {
        let report = sample_report();
        let json = build_report(&report, &Config::default(), Utc::now(), None);

        assert_eq!(json.status, "completed_with_failures");
        assert_eq!(json.batches.written, 2);
        assert_eq!(json.batches.latency.as_ref().unwrap().samples, 2);
        assert_eq!(json.failures.len(), 1);
        assert_eq!(json.failures[0].batch_id, 2);
        assert_eq!((json.failures[0].start, json.failures[0].end), (4, 6));
        assert_eq!(json.failures[0].reason, "cancelled");
        assert_eq!(json.run_info.config.sentinel, "NaN");
    }

    #[test]
    fn test_write_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let scan = SentinelScan {
            len: 6,
            written: 4,
            unwritten: 2,
            ranges: vec![4..6],
        };

        let json = build_report(&sample_report(), &Config::default(), Utc::now(), Some(&scan));
        write_report(&path, &json, true).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["status"], "completed_with_failures");
        assert_eq!(value["batches"]["per_slot"]["1"], 1);
        assert_eq!(value["verification"]["unwritten_ranges"][0][1], 6);
    }
}
