//! Crawler module for catalog traversal and document fetching
//!
//! This module contains the core crawling logic, including:
//! - The portal API client
//! - Retry classification with per-operation backoff
//! - Captcha-gated document fetching with variant fallback
//! - Session-level crawl coordination
//! - Offline archive and conversion backlog passes

mod backlog;
mod client;
mod coordinator;
mod fetcher;
mod retry;

pub use backlog::{archive_local_groups, convert_remote_backlog};
pub use client::{build_http_client, ApiClient, ConstituencyQuery, DocumentReply, DownloadRequest};
pub use coordinator::{run_crawl, Coordinator};
pub use fetcher::{classify_reply, FetchResult, Fetcher};
pub use retry::{Failure, Outcome, Resolution, RetryPolicy};

use crate::archive::ArchiveManager;
use crate::captcha::CaptchaSolver;
use crate::config::Config;
use crate::layout::write_atomic;
use crate::output::RunStats;
use crate::Result;
use std::path::Path;
use std::sync::Arc;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Load the resume ledger from the remote buckets
/// 2. Open a portal session and walk the catalog
/// 3. Fetch every part of every unarchived language group
/// 4. Ship finished groups on the raw tier, then queue them for conversion when enabled
/// 5. Print the run statistics
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `solver` - Captcha solver used for every document request
/// * `archive` - Remote archive storage, if configured
/// * `states` - Restricts the crawl to these state codes when non-empty
pub async fn crawl(
    config: Config,
    solver: Arc<dyn CaptchaSolver>,
    archive: Option<Arc<ArchiveManager>>,
    states: Vec<String>,
) -> Result<RunStats> {
    run_crawl(config, solver, archive, states).await
}

/// Saves `count` captcha challenges as `{id}.png` under `out`
///
/// The images feed the solver's training set; nothing is submitted.
pub async fn collect_captchas(config: &Config, out: &Path, count: usize) -> Result<usize> {
    let api = ApiClient::new(&config.source)?;
    api.open_session().await?;
    let retry = RetryPolicy::from_config(&config.retry);

    for index in 0..count {
        let challenge = retry
            .execute("captcha challenge", || api.captcha())
            .await?
            .into_done("captcha challenge")?;

        let name: String = challenge
            .id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        let path = out.join(format!("{}.png", name));
        write_atomic(&path, &challenge.image)?;
        tracing::info!("Saved captcha {}/{}: {}", index + 1, count, path.display());
    }

    Ok(count)
}
