//! Offline maintenance passes
//!
//! `archive_local_groups` ships every sealed group already on disk without
//! contacting the portal. `convert_remote_backlog` pulls raw archives back
//! from the remote, converts them and ships their pages tier.

use crate::archive::ArchiveManager;
use crate::catalog::{cached_groups, read_cached, PartInfo};
use crate::config::ConversionConfig;
use crate::convert::{ConversionJob, ConversionPipeline, ConversionReport, PagesShipper};
use crate::layout::{GroupKey, Tier};
use crate::Result;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Packages and uploads every locally sealed group on `tier`
///
/// Groups come from the cached catalog; archives left behind by an
/// interrupted upload are retried. Returns the number of archives uploaded.
pub async fn archive_local_groups(archive: &ArchiveManager, tier: Tier) -> Result<usize> {
    let groups = cached_groups(archive.layout())?;
    tracing::info!("Checking {} cached language groups on the {} tier", groups.len(), tier);

    let mut shipped = 0;
    for group in groups {
        let key = group.key();

        if archive.has_local_archive(&key, tier) {
            if archive.upload(&key, tier).await? {
                shipped += 1;
            }
            continue;
        }

        if !archive.seal(&key, &group.parts, tier)? {
            tracing::debug!("{} is not sealed on the {} tier", key, tier);
            continue;
        }

        if archive.ship(&key, tier).await? {
            shipped += 1;
        }
    }

    tracing::info!("Shipped {} {} archives", shipped, tier);
    Ok(shipped)
}

/// Part numbers of a downloaded group
///
/// Prefers the cached part listing; a group fetched on another machine only
/// has its raw directory to go by.
fn group_parts(archive: &ArchiveManager, key: &GroupKey) -> Result<Vec<u32>> {
    let layout = archive.layout();
    let listed = read_cached::<Vec<PartInfo>>(&layout.parts_file(&key.state_code, key.constituency))?;
    match listed {
        Some(parts) => Ok(parts.iter().map(|p| p.part_number).collect()),
        None => Ok(layout.scan_part_numbers(key)?),
    }
}

async fn enqueue_group(archive: &ArchiveManager, pipeline: &ConversionPipeline, key: &GroupKey) -> Result<usize> {
    archive.download(key, Tier::Raw).await?;
    archive.extract(key, Tier::Raw).await?;

    let parts = group_parts(archive, key)?;
    let group_parts: Arc<[u32]> = parts.clone().into();
    let layout = archive.layout();

    let mut queued = 0;
    for part in parts {
        let Some((_, pdf)) = layout.resolved_part(key, part) else {
            tracing::warn!("Part {} of {} missing from its raw archive", part, key);
            continue;
        };
        pipeline
            .submit(ConversionJob {
                key: key.clone(),
                group_parts: Arc::clone(&group_parts),
                part,
                pdf,
            })
            .await?;
        queued += 1;
    }
    Ok(queued)
}

/// Converts every raw archive in the remote that has no pages archive yet
///
/// Raw archives whose pages tier is confirmed remote are deleted afterwards
/// unless `keep_remote` is set.
pub async fn convert_remote_backlog(
    archive: Arc<ArchiveManager>,
    conversion: &ConversionConfig,
    keep_remote: bool,
) -> Result<ConversionReport> {
    let keys = archive.list_keys(Tier::Raw).await?;
    tracing::info!("Found {} raw archives in the remote", keys.len());

    let shipper = PagesShipper::new(Arc::clone(&archive), Handle::current());
    let pipeline = ConversionPipeline::spawn(conversion, archive.layout().clone(), Some(shipper))?;

    let mut pending = Vec::new();
    let mut enqueued = Ok(());
    for key in &keys {
        if archive.remote_exists(key, Tier::Pages).await? {
            tracing::debug!("Pages of {} already shipped", key);
            continue;
        }
        match enqueue_group(&archive, &pipeline, key).await {
            Ok(queued) => {
                tracing::info!("Queued {} documents of {}", queued, key);
                pending.push(key.clone());
            }
            Err(e) => {
                enqueued = Err(e);
                break;
            }
        }
    }

    // drain what was queued before reporting an enqueue failure
    let report = pipeline.finish().await?;
    enqueued?;

    for key in &pending {
        if archive.remote_exists(key, Tier::Pages).await? {
            continue;
        }
        // every document converted but the worker's ship failed
        if archive.seal(key, &group_parts(&archive, key)?, Tier::Pages)? && archive.ship(key, Tier::Pages).await? {
            archive.prune_local(key, Tier::Raw).await?;
        }
    }

    if !keep_remote {
        for key in &keys {
            if archive.remote_exists(key, Tier::Pages).await? {
                archive.delete_remote(key, Tier::Raw).await?;
            }
        }
    }

    Ok(report)
}
