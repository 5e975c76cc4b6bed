//! Crawl coordinator
//!
//! Walks the catalog hierarchy, fetches every part of every language group
//! not yet archived and ships the sealed group on the raw tier. With
//! conversion enabled the group's parts are then queued for the conversion
//! pipeline, which ships the pages tier. The whole walk is wrapped in a
//! session loop that restarts it from the top after a fatal error.

use super::client::ApiClient;
use super::fetcher::Fetcher;
use super::retry::RetryPolicy;
use crate::archive::ArchiveManager;
use crate::captcha::CaptchaSolver;
use crate::catalog::{
    load_priority_file, order_states, CatalogCache, ConstituencyInfo, LanguageGroup, PartInfo, WorkItem,
};
use crate::config::Config;
use crate::convert::{ConversionJob, ConversionPipeline, ConversionReport, PagesShipper};
use crate::layout::{DataLayout, GroupKey, Tier};
use crate::output::{print_statistics, RunStats};
use crate::state::{ResumeLedger, RetryState};
use crate::{HarvestError, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Main crawl coordinator
///
/// Owns everything that outlives a single session: the resume ledger, the
/// conversion pipeline and the run statistics. Clients, caches and fetchers
/// are rebuilt for every session.
pub struct Coordinator {
    config: Config,
    layout: DataLayout,
    archive: Option<Arc<ArchiveManager>>,
    ledger: ResumeLedger,
    solver: Arc<dyn CaptchaSolver>,
    pipeline: Option<ConversionPipeline>,
    /// Parts queued for conversion this run, kept across session restarts
    submitted: HashSet<(GroupKey, u32)>,
    stats: RunStats,
    only_states: Vec<String>,
}

impl Coordinator {
    /// Creates a coordinator
    ///
    /// Loads the resume ledger from the remote buckets (empty without a
    /// remote) and, when conversion is enabled, starts the conversion workers.
    /// Must be called from within a tokio runtime.
    pub async fn new(
        config: Config,
        solver: Arc<dyn CaptchaSolver>,
        archive: Option<Arc<ArchiveManager>>,
        only_states: Vec<String>,
    ) -> Result<Self> {
        let layout = DataLayout::new(&config.storage.data_dir);

        let ledger = match &archive {
            Some(archive) => ResumeLedger::load(archive).await?,
            None => {
                tracing::info!("No remote storage configured, nothing will be shipped");
                ResumeLedger::new()
            }
        };
        tracing::info!("Resume ledger holds {} archived language groups", ledger.len());

        let pipeline = if config.conversion.enabled {
            let shipper = archive
                .as_ref()
                .map(|archive| PagesShipper::new(Arc::clone(archive), Handle::current()));
            Some(ConversionPipeline::spawn(&config.conversion, layout.clone(), shipper)?)
        } else {
            None
        };

        Ok(Self {
            config,
            layout,
            archive,
            ledger,
            solver,
            pipeline,
            submitted: HashSet::new(),
            stats: RunStats::new(),
            only_states,
        })
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn ledger(&self) -> &ResumeLedger {
        &self.ledger
    }

    /// Runs traversals until one completes
    ///
    /// Session restarts back off independently of the per-operation retry
    /// policy. After `session.max-attempts` restarts the last error is
    /// reported as `SessionsExhausted`.
    pub async fn run(&mut self) -> Result<()> {
        let mut session = RetryState::new(Duration::from_millis(self.config.session.initial_delay_ms));

        loop {
            tracing::info!("Starting crawl session {}", session.attempt());

            let error = match self.traverse().await {
                Ok(()) => {
                    tracing::info!("Crawl traversal complete");
                    return Ok(());
                }
                Err(e) => e,
            };

            match session.register_delayed_failure(self.config.session.max_attempts) {
                Some(delay) => {
                    tracing::warn!(
                        "Crawl session failed: {}. Restarting in {:?} (attempt {})",
                        error,
                        delay,
                        session.attempt()
                    );
                    self.stats.session_restarts += 1;
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!("Crawl session failed: {}. Giving up", error);
                    return Err(HarvestError::SessionsExhausted {
                        attempts: session.attempt(),
                        last_error: error.to_string(),
                    });
                }
            }
        }
    }

    /// One walk of the whole hierarchy
    async fn traverse(&mut self) -> Result<()> {
        let api = ApiClient::new(&self.config.source)?;
        api.open_session().await?;

        let retry = RetryPolicy::from_config(&self.config.retry);
        let catalog = CatalogCache::new(api.clone(), self.layout.clone(), retry.clone());
        let fetcher = Fetcher::new(api, self.layout.clone(), retry, Arc::clone(&self.solver));

        let priority = match &self.config.storage.priority_file {
            Some(file) => load_priority_file(Path::new(file))?,
            None => Vec::new(),
        };
        let states = order_states(catalog.states().await?, &priority, &self.only_states);
        tracing::info!("Crawling {} states", states.len());

        for state in &states {
            tracing::info!("State {} ({})", state.state_code, state.state_name);
            let districts = catalog.districts(&state.state_code).await?;
            let constituencies = catalog.constituencies(&state.state_code).await?;
            tracing::debug!(
                "{}: {} districts, {} constituencies",
                state.state_code,
                districts.len(),
                constituencies.len()
            );

            for constituency in &constituencies {
                self.crawl_constituency(&catalog, &fetcher, constituency).await?;
            }
        }

        Ok(())
    }

    async fn crawl_constituency(
        &mut self,
        catalog: &CatalogCache,
        fetcher: &Fetcher,
        constituency: &ConstituencyInfo,
    ) -> Result<()> {
        let languages = catalog.languages(constituency).await?;
        let parts = catalog.parts(constituency).await?;
        let part_numbers: Vec<u32> = parts.iter().map(|p| p.part_number).collect();

        for language in languages {
            let group = LanguageGroup::new(constituency.jurisdiction(), language, part_numbers.clone());
            let key = group.key();

            if self.ledger.contains(&key) {
                tracing::debug!("Skipping {}: already archived", key);
                self.stats.groups_skipped += 1;
                continue;
            }

            if self.resume_local_archive(&key).await? {
                continue;
            }

            self.crawl_group(fetcher, &group, &parts).await?;
        }

        Ok(())
    }

    /// Uploads a raw archive packaged by an earlier run that never reached the remote
    ///
    /// Packaging removes the group's directory, so without this the group
    /// would be fetched again. A group whose directory was kept for
    /// conversion goes through `crawl_group` instead.
    async fn resume_local_archive(&mut self, key: &GroupKey) -> Result<bool> {
        let Some(archive) = &self.archive else {
            return Ok(false);
        };
        if !archive.has_local_archive(key, Tier::Raw) || self.layout.language_dir(key, Tier::Raw).is_dir() {
            return Ok(false);
        }

        tracing::info!("Resuming upload of packaged {}", key);
        if archive.upload(key, Tier::Raw).await? {
            self.stats.groups_shipped += 1;
        }
        self.ledger.insert(key.clone());
        Ok(true)
    }

    async fn crawl_group(&mut self, fetcher: &Fetcher, group: &LanguageGroup, parts: &[PartInfo]) -> Result<()> {
        let key = group.key();
        tracing::info!("Crawling {} ({} parts)", key, parts.len());

        for part in parts {
            let item = WorkItem {
                jurisdiction: group.jurisdiction.clone(),
                language: group.language.clone(),
                part: part.clone(),
            };
            let result = fetcher.fetch_part(&item).await?;
            self.stats.record_part(result.status(), result.from_cache);
        }

        if self.pipeline.is_none() {
            self.ship_raw(&key, &group.parts).await?;
            return Ok(());
        }

        // conversion overwrites the PDFs, so the raw tier has to be remote first
        if self.archive.is_some() && !self.ship_raw(&key, &group.parts).await? {
            return Ok(());
        }
        self.enqueue_group(&key, &group.parts).await
    }

    /// Ships the group's raw tier and records it in the ledger
    ///
    /// With conversion enabled the raw directory stays on disk for the
    /// workers. Returns false if the group is not sealed or there is no
    /// remote.
    async fn ship_raw(&mut self, key: &GroupKey, parts: &[u32]) -> Result<bool> {
        let Some(archive) = &self.archive else {
            return Ok(false);
        };

        if !archive.seal(key, parts, Tier::Raw)? {
            tracing::warn!("{} is not sealed after fetching every part, leaving it local", key);
            return Ok(false);
        }

        let shipped = if self.pipeline.is_some() {
            archive.ship_retaining(key, Tier::Raw).await?
        } else {
            archive.ship(key, Tier::Raw).await?
        };
        if shipped {
            tracing::info!("Shipped raw archive of {}", key);
            self.stats.groups_shipped += 1;
        }
        self.ledger.insert(key.clone());
        Ok(true)
    }

    /// Queues every resolved part of the group that was not queued earlier this run
    async fn enqueue_group(&mut self, key: &GroupKey, parts: &[u32]) -> Result<()> {
        let Some(pipeline) = &self.pipeline else {
            return Ok(());
        };
        let group_parts: Arc<[u32]> = parts.into();

        for &part in parts {
            let Some((_, pdf)) = self.layout.resolved_part(key, part) else {
                tracing::warn!("Part {} of {} is not on disk, not converting it", part, key);
                continue;
            };
            if !self.submitted.insert((key.clone(), part)) {
                tracing::debug!("Part {} of {} already queued", part, key);
                continue;
            }
            pipeline
                .submit(ConversionJob {
                    key: key.clone(),
                    group_parts: Arc::clone(&group_parts),
                    part,
                    pdf,
                })
                .await?;
        }
        Ok(())
    }

    /// Drains the conversion pipeline and returns the run totals
    pub async fn finish(self) -> Result<(RunStats, Option<ConversionReport>)> {
        let report = match self.pipeline {
            Some(pipeline) => Some(pipeline.finish().await?),
            None => None,
        };
        Ok((self.stats, report))
    }
}

/// Runs a complete crawl and prints the run statistics
///
/// The conversion pipeline is drained even when the crawl fails, so every
/// document already queued is converted before the error is returned.
pub async fn run_crawl(
    config: Config,
    solver: Arc<dyn CaptchaSolver>,
    archive: Option<Arc<ArchiveManager>>,
    only_states: Vec<String>,
) -> Result<RunStats> {
    let mut coordinator = Coordinator::new(config, solver, archive, only_states).await?;
    let outcome = coordinator.run().await;
    let (stats, report) = coordinator.finish().await?;
    print_statistics(&stats, report.as_ref());
    outcome.map(|()| stats)
}
