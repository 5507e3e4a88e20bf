//! Configuration from file and command line through to run options

use clap::Parser;
use gatherwrite::config::cli::{Cli, Command, RunArgs};
use gatherwrite::config::toml::load_config;
use gatherwrite::config::validator::validate_config;
use gatherwrite::coordinator::Coordinator;
use gatherwrite::input::LinspaceInput;
use gatherwrite::plan::BatchSpec;
use gatherwrite::store::file::ColumnFile;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn run_args(argv: &[&str]) -> RunArgs {
    let mut full = vec!["gatherwrite", "run"];
    full.extend_from_slice(argv);
    match Cli::try_parse_from(full).unwrap().command {
        Command::Run(args) => args,
        other => panic!("expected run, got {:?}", other),
    }
}

#[test]
fn file_values_with_flag_overrides() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("run.toml");
    fs::write(
        &config_path,
        r#"
[domain]
size = 4096
offset = 4.0

[batching]
batch_size = 100

[pool]
threads = 8

[compute]
kernel = "product"
latency_ms = 10
"#,
    )
    .unwrap();

    let config_arg = config_path.to_str().unwrap();
    let args = run_args(&["--config", config_arg, "--batches", "32", "--stall-timeout", "3s", "-t", "2"]);
    let config = load_config(&args).unwrap();
    validate_config(&config).unwrap();

    let options = config.run_options();
    assert_eq!(options.domain_size, 4096);
    assert_eq!(options.batch_spec, BatchSpec::Count(32));
    assert_eq!(options.threads, 2);
    assert_eq!(options.stall_timeout, Some(Duration::from_secs(3)));
    assert_eq!(config.compute.latency_ms, Some(10));
    assert!(config.compute.is_simulated());
}

#[test]
fn invalid_combination_is_rejected() {
    let args = run_args(&["-n", "64", "--batches", "8", "--fail-batch", "8"]);
    let config = load_config(&args).unwrap();
    assert!(validate_config(&config).is_err());

    let args = run_args(&["--threads", "0"]);
    let config = load_config(&args).unwrap();
    assert!(validate_config(&config).is_err());
}

#[test]
fn configured_run_reports_failed_batch() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.col");
    let output_arg = output.to_str().unwrap();

    let args = run_args(&["-n", "256", "--batches", "8", "--fail-batch", "3", "-o", output_arg]);
    let config = load_config(&args).unwrap();
    validate_config(&config).unwrap();

    let store = ColumnFile::create(&config.store.path, config.domain.size, config.store.sentinel).unwrap();
    let input = LinspaceInput::new(config.domain.size, config.domain.offset);
    let report = Coordinator::new(config.run_options())
        .run(&input, config.compute.build_kernel(), Box::new(store))
        .unwrap();

    let failures = report.status.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].range, 96..128);
}
