//! Run statistics
//!
//! Counters accumulated by the crawl and printed when it ends.

use crate::convert::ConversionReport;
use crate::state::PartStatus;
use chrono::{DateTime, Utc};

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct RunStats {
    pub started_at: DateTime<Utc>,

    /// Parts downloaded with a payload this run
    pub parts_fetched: u64,

    /// Parts the portal confirmed have no document
    pub parts_unavailable: u64,

    /// Parts already on disk from an earlier run
    pub parts_present: u64,

    /// Language groups skipped because they were already archived
    pub groups_skipped: u64,

    /// Language groups shipped this run
    pub groups_shipped: u64,

    /// Times the traversal was restarted after a fatal error
    pub session_restarts: u32,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            parts_fetched: 0,
            parts_unavailable: 0,
            parts_present: 0,
            groups_skipped: 0,
            groups_shipped: 0,
            session_restarts: 0,
        }
    }

    /// Counts one resolved part
    pub fn record_part(&mut self, status: PartStatus, from_cache: bool) {
        if from_cache {
            self.parts_present += 1;
        } else if status == PartStatus::Unavailable {
            self.parts_unavailable += 1;
        } else {
            self.parts_fetched += 1;
        }
    }

    pub fn elapsed_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &RunStats, conversion: Option<&ConversionReport>) {
    println!("=== Crawl Statistics ===\n");

    println!("Run:");
    println!("  Started: {}", stats.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  Duration: {}s", stats.elapsed_secs());
    println!("  Session restarts: {}", stats.session_restarts);
    println!();

    let total = stats.parts_fetched + stats.parts_unavailable + stats.parts_present;
    println!("Parts ({}):", total);
    println!("  Fetched: {}", stats.parts_fetched);
    println!("  Unavailable: {}", stats.parts_unavailable);
    println!("  Already present: {}", stats.parts_present);
    println!();

    println!("Language groups:");
    println!("  Shipped: {}", stats.groups_shipped);
    println!("  Skipped (already archived): {}", stats.groups_skipped);

    if let Some(report) = conversion {
        println!();
        print_conversion_report(report);
    }
}

pub fn print_conversion_report(report: &ConversionReport) {
    println!("Conversion:");
    println!("  Converted: {}", report.converted);
    println!("  Skipped: {}", report.skipped);
    println!("  Failed: {}", report.failed);
    println!("  Page archives shipped: {}", report.shipped);
}
