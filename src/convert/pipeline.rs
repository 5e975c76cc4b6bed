//! Bounded producer/consumer stage between the crawl and page conversion
//!
//! The crawl pushes one [`ConversionJob`] per resolved part into a bounded
//! queue; when the queue is full the producer waits. Worker threads drain it
//! in FIFO order. Shutdown enqueues one `Done` per worker, so every job
//! submitted before it is still processed, then joins the workers.

use super::converter::{ConversionOutcome, PageConverter};
use crate::archive::ArchiveManager;
use crate::config::ConversionConfig;
use crate::layout::{DataLayout, GroupKey, Tier};
use crate::{HarvestError, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tokio::runtime::Handle;

/// One document waiting for conversion
#[derive(Debug, Clone)]
pub struct ConversionJob {
    /// Language group the document belongs to
    pub key: GroupKey,
    /// Every part number of that group, for the seal check
    pub group_parts: Arc<[u32]>,
    pub part: u32,
    pub pdf: PathBuf,
}

/// Queue messages
#[derive(Debug)]
pub enum QueueMessage {
    Convert(ConversionJob),
    /// Tells one worker to exit
    Done,
}

/// Bounded queue connecting the producer to the workers
pub fn message_queue(capacity: usize) -> (Sender<QueueMessage>, Receiver<QueueMessage>) {
    bounded(capacity.max(1))
}

/// Per-run conversion tally
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConversionReport {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub shipped: usize,
}

impl ConversionReport {
    pub fn merge(&mut self, other: &ConversionReport) {
        self.converted += other.converted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.shipped += other.shipped;
    }
}

/// Ships a group's pages tier once all its documents are converted
///
/// Workers call it after every document; the lock keeps two workers from
/// packaging the same group at once. After the pages ship, the group's raw
/// directory is removed if its raw archive is already remote.
pub struct PagesShipper {
    archive: Arc<ArchiveManager>,
    runtime: Handle,
    lock: Mutex<()>,
}

impl PagesShipper {
    pub fn new(archive: Arc<ArchiveManager>, runtime: Handle) -> Self {
        Self {
            archive,
            runtime,
            lock: Mutex::new(()),
        }
    }

    /// Returns true if this call uploaded the group's pages archive
    pub fn ship_if_sealed(&self, key: &GroupKey, parts: &[u32]) -> Result<bool> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.archive.seal(key, parts, Tier::Pages)? {
            return Ok(false);
        }
        self.runtime.block_on(async {
            if !self.archive.ship(key, Tier::Pages).await? {
                return Ok(false);
            }
            if self.archive.remote_exists(key, Tier::Raw).await? {
                self.archive.prune_local(key, Tier::Raw).await?;
            }
            Ok::<_, HarvestError>(true)
        })
    }
}

fn worker_loop(
    worker_id: usize,
    receiver: Receiver<QueueMessage>,
    converter: PageConverter,
    shipper: Option<Arc<PagesShipper>>,
) -> ConversionReport {
    let mut report = ConversionReport::default();

    for message in receiver.iter() {
        let job = match message {
            QueueMessage::Convert(job) => job,
            QueueMessage::Done => break,
        };

        match converter.convert(&job.key, job.part, &job.pdf) {
            Ok(ConversionOutcome::Converted { pages }) => {
                report.converted += 1;
                tracing::info!(
                    "Worker {} converted {} ({} pages)",
                    worker_id,
                    job.pdf.display(),
                    pages
                );
            }
            Ok(ConversionOutcome::Skipped(status)) => {
                report.skipped += 1;
                tracing::debug!("Worker {} skipped {} ({})", worker_id, job.pdf.display(), status);
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!("Worker {} failed to convert {}: {}", worker_id, job.pdf.display(), e);
                continue;
            }
        }

        if let Some(shipper) = &shipper {
            match shipper.ship_if_sealed(&job.key, &job.group_parts) {
                Ok(true) => {
                    report.shipped += 1;
                    tracing::info!("Shipped pages of {}", job.key);
                }
                Ok(false) => {}
                Err(e) => tracing::error!("Failed to ship pages of {}: {}", job.key, e),
            }
        }
    }

    report
}

/// Conversion workers fed by a bounded queue
pub struct ConversionPipeline {
    sender: Sender<QueueMessage>,
    workers: Vec<JoinHandle<ConversionReport>>,
}

impl ConversionPipeline {
    /// Starts `config.workers` threads, each with its own page pool
    pub fn spawn(config: &ConversionConfig, layout: DataLayout, shipper: Option<PagesShipper>) -> Result<Self> {
        let (sender, receiver) = message_queue(config.queue_capacity);
        let shipper = shipper.map(Arc::new);
        let page_threads = config.effective_page_threads();

        let mut workers = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers.max(1) {
            let converter = PageConverter::new(layout.clone(), page_threads)?;
            let receiver = receiver.clone();
            let shipper = shipper.clone();
            let handle = std::thread::Builder::new()
                .name(format!("convert-{}", worker_id))
                .spawn(move || worker_loop(worker_id, receiver, converter, shipper))?;
            workers.push(handle);
        }

        tracing::info!(
            "Conversion pipeline started: {} workers, {} page threads each, queue capacity {}",
            workers.len(),
            page_threads,
            config.queue_capacity
        );
        Ok(Self { sender, workers })
    }

    /// Enqueues a job, blocking the calling thread while the queue is full
    pub fn submit_blocking(&self, job: ConversionJob) -> Result<()> {
        self.sender
            .send(QueueMessage::Convert(job))
            .map_err(|_| HarvestError::Pipeline("all conversion workers have exited".to_string()))
    }

    /// Enqueues a job from async code; the wait for queue space happens on
    /// tokio's blocking pool
    pub async fn submit(&self, job: ConversionJob) -> Result<()> {
        let sender = self.sender.clone();
        tokio::task::spawn_blocking(move || sender.send(QueueMessage::Convert(job)))
            .await
            .map_err(|e| HarvestError::Pipeline(e.to_string()))?
            .map_err(|_| HarvestError::Pipeline("all conversion workers have exited".to_string()))
    }

    /// Sends one `Done` per worker, waits for the queue to drain and joins
    pub fn shutdown(self) -> Result<ConversionReport> {
        for _ in &self.workers {
            // a worker that already exited leaves nobody to read this
            let _ = self.sender.send(QueueMessage::Done);
        }

        let mut report = ConversionReport::default();
        for handle in self.workers {
            let worker_report = handle
                .join()
                .map_err(|_| HarvestError::Pipeline("conversion worker panicked".to_string()))?;
            report.merge(&worker_report);
        }
        Ok(report)
    }

    /// `shutdown` for async callers
    pub async fn finish(self) -> Result<ConversionReport> {
        tokio::task::spawn_blocking(move || self.shutdown())
            .await
            .map_err(|e| HarvestError::Pipeline(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DocumentVariant;
    use crate::convert::pdf::tests::write_scan_pdf;
    use crate::layout::write_atomic;
    use crate::state::CONVERTED_SENTINEL;
    use crossbeam_channel::TrySendError;
    use object_store::memory::InMemory;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(workers: usize) -> ConversionConfig {
        ConversionConfig {
            enabled: true,
            queue_capacity: 3,
            workers,
            page_threads: 2,
        }
    }

    fn job(layout: &DataLayout, key: &GroupKey, parts: &Arc<[u32]>, part: u32) -> ConversionJob {
        ConversionJob {
            key: key.clone(),
            group_parts: Arc::clone(parts),
            part,
            pdf: layout.part_file(key, part, DocumentVariant::General),
        }
    }

    #[test]
    fn test_queue_blocks_producer_when_full() {
        let (sender, receiver) = message_queue(3);
        for _ in 0..3 {
            sender.try_send(QueueMessage::Done).unwrap();
        }
        assert!(matches!(
            sender.try_send(QueueMessage::Done),
            Err(TrySendError::Full(_))
        ));

        receiver.recv().unwrap();
        assert!(sender.try_send(QueueMessage::Done).is_ok());
    }

    #[tokio::test]
    async fn test_submit_waits_for_queue_space() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        let key = GroupKey::new("S04", 12, "ENG");
        let parts: Arc<[u32]> = Arc::from(vec![1, 2, 3, 4]);

        // the test holds the receiving end, standing in for a stalled worker
        let (sender, receiver) = message_queue(3);
        let pipeline = ConversionPipeline {
            sender,
            workers: Vec::new(),
        };
        for part in 1..=3 {
            pipeline.submit(job(&layout, &key, &parts, part)).await.unwrap();
        }

        let pending = pipeline.submit(job(&layout, &key, &parts, 4));
        tokio::pin!(pending);
        assert!(tokio::time::timeout(Duration::from_millis(200), &mut pending)
            .await
            .is_err());

        match receiver.recv().unwrap() {
            QueueMessage::Convert(job) => assert_eq!(job.part, 1),
            QueueMessage::Done => panic!("unexpected shutdown message"),
        }
        tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap();

        let queued: Vec<u32> = receiver
            .try_iter()
            .filter_map(|message| match message {
                QueueMessage::Convert(job) => Some(job.part),
                QueueMessage::Done => None,
            })
            .collect();
        assert_eq!(queued, vec![2, 3, 4]);
    }

    #[test]
    fn test_workers_drain_queue_before_exit() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        let key = GroupKey::new("S04", 12, "ENG");
        let parts: Arc<[u32]> = Arc::from(vec![1, 2, 3, 4]);

        for part in 1..=3 {
            let pdf = layout.part_file(&key, part, DocumentVariant::General);
            std::fs::create_dir_all(pdf.parent().unwrap()).unwrap();
            write_scan_pdf(&pdf, &[1, 1]);
        }
        write_atomic(&layout.part_file(&key, 4, DocumentVariant::General), b"").unwrap();

        let pipeline = ConversionPipeline::spawn(&config(2), layout.clone(), None).unwrap();
        for part in 1..=4 {
            pipeline.submit_blocking(job(&layout, &key, &parts, part)).unwrap();
        }
        let report = pipeline.shutdown().unwrap();

        assert_eq!(
            report,
            ConversionReport {
                converted: 3,
                skipped: 1,
                failed: 0,
                shipped: 0
            }
        );
        for part in 1..=3 {
            let pdf = layout.part_file(&key, part, DocumentVariant::General);
            assert_eq!(std::fs::read(pdf).unwrap(), CONVERTED_SENTINEL);
        }
    }

    #[test]
    fn test_structural_failure_is_counted_and_pipeline_continues() {
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        let key = GroupKey::new("S04", 12, "ENG");
        let parts: Arc<[u32]> = Arc::from(vec![1, 2]);

        let bad = layout.part_file(&key, 1, DocumentVariant::General);
        std::fs::create_dir_all(bad.parent().unwrap()).unwrap();
        write_scan_pdf(&bad, &[2]);
        write_scan_pdf(&layout.part_file(&key, 2, DocumentVariant::General), &[1]);

        let pipeline = ConversionPipeline::spawn(&config(1), layout.clone(), None).unwrap();
        pipeline.submit_blocking(job(&layout, &key, &parts, 1)).unwrap();
        pipeline.submit_blocking(job(&layout, &key, &parts, 2)).unwrap();
        let report = pipeline.shutdown().unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.converted, 1);
    }

    #[test]
    fn test_group_pages_shipped_after_last_document() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        let key = GroupKey::new("S04", 12, "ENG");
        let parts: Arc<[u32]> = Arc::from(vec![1, 2]);

        let pdf = layout.part_file(&key, 1, DocumentVariant::General);
        std::fs::create_dir_all(pdf.parent().unwrap()).unwrap();
        write_scan_pdf(&pdf, &[1, 1]);
        write_atomic(&layout.part_file(&key, 2, DocumentVariant::General), b"").unwrap();

        let archive = Arc::new(ArchiveManager::new(
            layout.clone(),
            Arc::new(InMemory::new()),
            Arc::new(InMemory::new()),
            1024 * 1024,
            2,
        ));
        let shipper = PagesShipper::new(Arc::clone(&archive), runtime.handle().clone());

        let pipeline = ConversionPipeline::spawn(&config(1), layout.clone(), Some(shipper)).unwrap();
        pipeline.submit_blocking(job(&layout, &key, &parts, 1)).unwrap();
        pipeline.submit_blocking(job(&layout, &key, &parts, 2)).unwrap();
        let report = pipeline.shutdown().unwrap();

        assert_eq!(report.converted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.shipped, 1);
        assert!(runtime
            .block_on(archive.remote_exists(&key, Tier::Pages))
            .unwrap());
        assert!(!layout.language_dir(&key, Tier::Pages).exists());
        // the raw tier was never shipped, so its files stay
        assert!(layout.language_dir(&key, Tier::Raw).exists());
    }

    #[test]
    fn test_raw_directory_removed_once_both_tiers_are_remote() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let dir = TempDir::new().unwrap();
        let layout = DataLayout::new(dir.path());
        let key = GroupKey::new("S04", 12, "ENG");
        let parts: Arc<[u32]> = Arc::from(vec![1]);

        let pdf = layout.part_file(&key, 1, DocumentVariant::General);
        std::fs::create_dir_all(pdf.parent().unwrap()).unwrap();
        write_scan_pdf(&pdf, &[1]);

        let archive = Arc::new(ArchiveManager::new(
            layout.clone(),
            Arc::new(InMemory::new()),
            Arc::new(InMemory::new()),
            1024 * 1024,
            2,
        ));
        assert!(runtime
            .block_on(archive.ship_retaining(&key, Tier::Raw))
            .unwrap());
        let shipper = PagesShipper::new(Arc::clone(&archive), runtime.handle().clone());

        let pipeline = ConversionPipeline::spawn(&config(1), layout.clone(), Some(shipper)).unwrap();
        pipeline.submit_blocking(job(&layout, &key, &parts, 1)).unwrap();
        let report = pipeline.shutdown().unwrap();

        assert_eq!(report.converted, 1);
        assert_eq!(report.shipped, 1);
        assert!(runtime
            .block_on(archive.remote_exists(&key, Tier::Pages))
            .unwrap());
        assert!(!layout.language_dir(&key, Tier::Raw).exists());
    }
}
