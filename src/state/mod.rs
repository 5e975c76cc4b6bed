//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PartStatus`: Progress of one part, read back from its file size
//! - `RetryState`: Backoff counters for consecutive failures of one step
//! - `ResumeLedger`: Language groups already archived remotely

mod ledger;
mod part_status;
mod retry_state;

// Re-export main types
pub use ledger::ResumeLedger;
pub use part_status::{PartStatus, CONVERTED_SENTINEL, SENTINEL_MAX_SIZE};
pub use retry_state::RetryState;
