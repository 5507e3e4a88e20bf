//! Human-readable text output

use super::verify::SentinelScan;
use crate::config::Config;
use crate::coordinator::{RunReport, RunStatus};
use crate::plan::Plan;
use std::ops::Range;
use std::path::Path;
use std::time::Duration;

const RULE: &str = "═══════════════════════════════════════════════════════════";

/// Most sentinel ranges listed before eliding the rest
const MAX_LISTED_RANGES: usize = 20;

/// Print the configuration a run will use
pub fn print_configuration(config: &Config) {
    println!("Configuration:");
    println!("  Domain:   {} indices (y = x + {})", format_number(config.domain.size), config.domain.offset);
    println!("  Batching: {}", config.batching.spec());
    println!("  Threads:  {}", config.pool.threads);
    println!("  Kernel:   {}", config.compute.kernel);
    if let Some(ms) = config.compute.latency_ms {
        println!(
            "  Latency:  {}ms per batch (+/- {}%)",
            ms, config.compute.jitter_percent
        );
    }
    if !config.compute.fail_batches.is_empty() {
        println!("  Failing:  batches {:?}", config.compute.fail_batches);
    }
    if let Some(ms) = config.pool.stall_timeout_ms {
        println!("  Stall:    {}ms", ms);
    }
    println!("  Output:   {} (sentinel {})", config.store.path.display(), config.store.sentinel);
}

/// Print the batch plan (dry run)
pub fn print_plan(plan: &Plan) {
    println!("Plan: {} batches over {} indices", plan.len(), format_number(plan.domain_size()));
    for batch in plan.batches() {
        let range = batch.range();
        println!("  {:>6}  [{}, {})  {} indices", batch.id().to_string(), range.start, range.end, batch.len());
    }
}

/// Print the result of a run
pub fn print_report(report: &RunReport, config: &Config, scan: Option<&SentinelScan>) {
    println!("{}", RULE);
    println!("                       RUN RESULTS");
    println!("{}", RULE);
    println!();

    println!("Elapsed Time: {}", format_duration(report.elapsed));
    println!("Status:       {}", report.final_state());
    println!("Kernel:       {} on {} threads", report.kernel, report.threads);
    println!();

    let stats = &report.stats;
    println!("Batches ({} total):", report.batches);
    println!("  Written:   {}", stats.written());
    if stats.failed() > 0 {
        println!("  Failed:    {}", stats.failed());
    }
    if stats.cancelled() > 0 {
        println!("  Cancelled: {}", stats.cancelled());
    }
    if stats.timed_out() > 0 {
        println!("  Timed out: {}", stats.timed_out());
    }
    println!(
        "Indices:      {} / {} written",
        format_number(report.indices_written),
        format_number(report.domain_size)
    );
    println!();

    if let RunStatus::CompletedWithFailures(failures) = &report.status {
        println!("Failed batches:");
        for failure in failures {
            println!(
                "  {:>6}  [{}, {})  {}",
                failure.batch_id.to_string(),
                failure.range.start,
                failure.range.end,
                failure.reason
            );
        }
        println!();
    }

    if config.output.show_latency {
        println!("Batch latency:");
        let hist = stats.latency();
        if hist.is_empty() {
            println!("  No latency data collected");
        } else {
            print_optional("Min", hist.min());
            print_optional("Mean", hist.mean());
            print_optional("Max", hist.max());
            for &p in &[50.0, 90.0, 99.0] {
                print_optional(&format!("p{}", p), hist.percentile(p));
            }
        }
        println!();
    }

    if config.output.show_per_slot {
        println!("Batches per worker slot:");
        for (slot, count) in stats.per_slot() {
            println!("  slot {:>3}: {}", slot, count);
        }
        println!();
    }

    if let Some(scan) = scan {
        println!("Verification:");
        print_scan(scan);
        println!();
    }

    println!("{}", RULE);
}

/// Print the contents summary of a column file
pub fn print_inspection(path: &Path, sentinel: f64, scan: &SentinelScan) {
    println!("Column:    {}", path.display());
    println!("Length:    {}", format_number(scan.len));
    println!("Sentinel:  {}", sentinel);
    print_scan(scan);
}

fn print_scan(scan: &SentinelScan) {
    println!("  Written:   {}", format_number(scan.written));
    println!("  Unwritten: {}", format_number(scan.unwritten));
    if !scan.ranges.is_empty() {
        println!("  Unwritten ranges:");
        for range in scan.ranges.iter().take(MAX_LISTED_RANGES) {
            println!("    {}", format_range(range));
        }
        if scan.ranges.len() > MAX_LISTED_RANGES {
            println!("    ... {} more", scan.ranges.len() - MAX_LISTED_RANGES);
        }
    }
}

fn print_optional(label: &str, value: Option<Duration>) {
    if let Some(d) = value {
        println!("  {:<6}{}", format!("{}:", label), format_duration(d));
    }
}

fn format_range(range: &Range<u64>) -> String {
    format!("[{}, {})", range.start, range.end)
}

/// Format a duration with a unit suited to its magnitude
pub fn format_duration(d: Duration) -> String {
    let micros = d.as_micros() as u64;

    if micros < 1000 {
        format!("{}µs", micros)
    } else if micros < 1_000_000 {
        format!("{:.3}ms", micros as f64 / 1000.0)
    } else {
        format!("{:.3}s", micros as f64 / 1_000_000.0)
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}
