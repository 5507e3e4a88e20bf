//! gatherwrite CLI entry point

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use gatherwrite::config::cli::{Cli, Command, RunArgs};
use gatherwrite::config::toml::load_config;
use gatherwrite::config::validator::validate_config;
use gatherwrite::coordinator::{Coordinator, RunReport};
use gatherwrite::input::LinspaceInput;
use gatherwrite::output::json::{build_report, write_report};
use gatherwrite::output::text::{print_configuration, print_inspection, print_plan, print_report};
use gatherwrite::output::{scan_column_file, scan_sentinels, SentinelScan};
use gatherwrite::store::file::ColumnFile;
use gatherwrite::store::OutputStore;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Exit code for a run that finished with failed batches
const EXIT_FAILURES: i32 = 2;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Run(args) => run_command(&args),
        Command::Inspect { path } => inspect_command(&path),
    }
}

/// Initialize tracing; RUST_LOG takes precedence over `-v`
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 3)
        .init();

    tracing::debug!("gatherwrite started with verbosity level: {}", verbose);
}

fn run_command(args: &RunArgs) -> Result<()> {
    let config = load_config(args)?;
    validate_config(&config).context("Configuration validation failed")?;

    println!("gatherwrite v{}", env!("CARGO_PKG_VERSION"));
    println!();
    print_configuration(&config);

    if config.runtime.dry_run {
        let plan = gatherwrite::plan(config.domain.size, config.batching.spec())?;
        println!();
        print_plan(&plan);
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    println!();
    println!("Starting run...");
    println!();

    let start_time = Utc::now();
    let store = ColumnFile::create(&config.store.path, config.domain.size, config.store.sentinel)?;
    let input = LinspaceInput::new(config.domain.size, config.domain.offset);
    let kernel = config.compute.build_kernel();

    let mut coordinator = Coordinator::new(config.run_options());
    let report = coordinator
        .run(&input, kernel, Box::new(store))
        .context("Run aborted")?;

    let scan = if config.output.verify {
        let scan = scan_column_file(&config.store.path)?;
        check_scan(&report, &scan);
        Some(scan)
    } else {
        None
    };

    print_report(&report, &config, scan.as_ref());

    if let Some(ref path) = config.output.json_output {
        let json = build_report(&report, &config, start_time, scan.as_ref());
        write_report(path, &json, true)?;
        println!("JSON report written to {}", path.display());
    }

    if !report.status.is_complete() {
        std::process::exit(EXIT_FAILURES);
    }
    Ok(())
}

/// Cross-check the column on disk against the failures the run reported
fn check_scan(report: &RunReport, scan: &SentinelScan) {
    let expected: u64 = report
        .status
        .failures()
        .iter()
        .map(|f| f.range.end - f.range.start)
        .sum();

    if scan.unwritten != expected {
        tracing::warn!(
            unwritten = scan.unwritten,
            expected,
            "column holds a different number of sentinel values than the failed batches cover"
        );
    }
}

fn inspect_command(path: &Path) -> Result<()> {
    let column = ColumnFile::open_read(path)?;
    let values = column.read_all()?;
    let scan = scan_sentinels(&values, column.sentinel());

    print_inspection(path, column.sentinel(), &scan);
    Ok(())
}
