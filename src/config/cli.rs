//! CLI argument parsing using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// gatherwrite - parallel batch compute with a single-writer result store
#[derive(Parser, Debug)]
#[command(name = "gatherwrite")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Plan, compute and write a column
    Run(RunArgs),
    /// Report written and unwritten ranges of a column file
    Inspect {
        /// Column file to read
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// TOML configuration file (flags override its values)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    // === Domain Options ===
    /// Number of indices to compute
    #[arg(short = 'n', long)]
    pub size: Option<u64>,

    /// Offset added to x to form the y column
    #[arg(long, allow_negative_numbers = true)]
    pub offset: Option<f64>,

    // === Batching Options ===
    /// Number of batches
    #[arg(short, long, conflicts_with = "batch_size")]
    pub batches: Option<usize>,

    /// Indices per batch
    #[arg(long)]
    pub batch_size: Option<u64>,

    /// Number of worker threads
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Give up on outstanding batches when nothing resolves for this long (e.g. 500ms, 10s)
    #[arg(long)]
    pub stall_timeout: Option<String>,

    // === Compute Options ===
    /// Kernel to run on each batch
    #[arg(short, long, value_enum)]
    pub kernel: Option<KernelType>,

    /// Simulated per-batch latency (e.g. 20ms, 1s)
    #[arg(long)]
    pub latency: Option<String>,

    /// Latency jitter in percent (0-100)
    #[arg(long)]
    pub jitter: Option<u8>,

    /// Seed for latency jitter
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fail this batch on purpose (repeatable)
    #[arg(long = "fail-batch", value_name = "BATCH")]
    pub fail_batches: Vec<usize>,

    // === Store Options ===
    /// Output column file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Value marking unwritten indices (default NaN)
    ///
    /// Pick a value the kernel never produces: a computed result equal to a
    /// finite sentinel is indistinguishable from an unwritten index.
    #[arg(long, allow_negative_numbers = true)]
    pub sentinel: Option<f64>,

    // === Output Options ===
    /// Write a JSON report to this file
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Show latency percentiles
    #[arg(long)]
    pub show_latency: bool,

    /// Show batches resolved per worker slot
    #[arg(long)]
    pub show_per_slot: bool,

    /// Skip re-reading the column after the run
    #[arg(long)]
    pub no_verify: bool,

    /// Validate configuration and print the plan without running
    #[arg(long)]
    pub dry_run: bool,
}

/// Built-in kernels
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KernelType {
    /// value = x * y
    Product,
    /// value = x * x
    Square,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "gatherwrite",
            "-vv",
            "run",
            "-n",
            "2048",
            "--batches",
            "16",
            "--kernel",
            "square",
            "--fail-batch",
            "3",
            "--fail-batch",
            "5",
            "--sentinel",
            "-1",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Command::Run(args) = cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.size, Some(2048));
        assert_eq!(args.batches, Some(16));
        assert_eq!(args.kernel, Some(KernelType::Square));
        assert_eq!(args.fail_batches, vec![3, 5]);
        assert_eq!(args.sentinel, Some(-1.0));
        assert!(args.dry_run);
    }

    #[test]
    fn test_batches_conflict_with_batch_size() {
        let result = Cli::try_parse_from([
            "gatherwrite",
            "run",
            "--batches",
            "4",
            "--batch-size",
            "64",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_inspect() {
        let cli = Cli::try_parse_from(["gatherwrite", "inspect", "out.col"]).unwrap();
        match cli.command {
            Command::Inspect { path } => assert_eq!(path, PathBuf::from("out.col")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_sentinel_help_explains_collision() {
        let mut cmd = Cli::command();
        let run = cmd.find_subcommand_mut("run").unwrap();
        let help = run.render_long_help().to_string();
        assert!(help.contains("indistinguishable"));
    }
}
