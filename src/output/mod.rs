//! Report output
//!
//! Human-readable console report, JSON report file, and the post-run
//! sentinel scan both of them include.

pub mod json;
pub mod text;
pub mod verify;

pub use verify::{scan_column_file, scan_sentinels, SentinelScan};
