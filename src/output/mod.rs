//! Output module for run summaries
//!
//! This module handles:
//! - Accumulating per-run crawl counters
//! - Printing the end-of-run summary and the conversion report

pub mod stats;

pub use stats::{print_conversion_report, print_statistics, RunStats};
