use super::{open_store, ArchiveError, TransferProgress};
use crate::config::RemoteConfig;
use crate::layout::{temp_sibling, DataLayout, GroupKey, Tier};
use futures::StreamExt;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload, WriteMultipart};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

type ArchiveResult<T> = Result<T, ArchiveError>;

fn task_error(err: tokio::task::JoinError) -> ArchiveError {
    ArchiveError::Task(err.to_string())
}

/// Packages, ships and retrieves language group archives on both tiers
///
/// Every operation is a no-op when its target state already holds, so each
/// can be retried after an interruption.
pub struct ArchiveManager {
    layout: DataLayout,
    raw: Arc<dyn ObjectStore>,
    pages: Arc<dyn ObjectStore>,
    chunk_size: usize,
    max_concurrency: usize,
}

impl ArchiveManager {
    pub fn new(
        layout: DataLayout,
        raw: Arc<dyn ObjectStore>,
        pages: Arc<dyn ObjectStore>,
        chunk_size: usize,
        max_concurrency: usize,
    ) -> Self {
        Self {
            layout,
            raw,
            pages,
            chunk_size: chunk_size.max(1),
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn from_config(layout: DataLayout, remote: &RemoteConfig) -> ArchiveResult<Self> {
        Ok(Self::new(
            layout,
            open_store(remote, &remote.raw_bucket)?,
            open_store(remote, &remote.pages_bucket)?,
            remote.chunk_size_bytes(),
            remote.max_concurrency,
        ))
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    fn store(&self, tier: Tier) -> &Arc<dyn ObjectStore> {
        match tier {
            Tier::Raw => &self.raw,
            Tier::Pages => &self.pages,
        }
    }

    fn location(key: &GroupKey) -> ObjectPath {
        ObjectPath::from(key.remote_key())
    }

    /// Whether every part of the group is done for `tier`
    ///
    /// Part status is read from the raw files: the raw tier accepts payloads
    /// and confirmed-unavailable placeholders, the pages tier accepts
    /// placeholders and converted sentinels.
    pub fn seal(&self, key: &GroupKey, parts: &[u32], tier: Tier) -> ArchiveResult<bool> {
        for part in parts {
            if !tier.accepts(self.layout.part_status(key, *part)?) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn has_local_archive(&self, key: &GroupKey, tier: Tier) -> bool {
        self.layout.archive_file(key, tier).is_file()
    }

    pub async fn remote_exists(&self, key: &GroupKey, tier: Tier) -> ArchiveResult<bool> {
        match self.store(tier).head(&Self::location(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Tars the group's local directory into its archive file, then removes the directory
    ///
    /// Returns false without touching anything if a local or remote archive
    /// already exists.
    pub async fn package(&self, key: &GroupKey, tier: Tier) -> ArchiveResult<bool> {
        self.package_dir(key, tier, true).await
    }

    async fn package_dir(&self, key: &GroupKey, tier: Tier, remove_source: bool) -> ArchiveResult<bool> {
        if self.has_local_archive(key, tier) || self.remote_exists(key, tier).await? {
            tracing::debug!("{} archive of {} already packaged", tier, key);
            return Ok(false);
        }

        let source = self.layout.language_dir(key, tier);
        let archive = self.layout.archive_file(key, tier);
        let language = key.language.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&source)?;
            let tmp = temp_sibling(&archive);
            let mut builder = tar::Builder::new(std::fs::File::create(&tmp)?);
            builder.append_dir_all(&language, &source)?;
            builder.into_inner()?.sync_all()?;
            std::fs::rename(&tmp, &archive)?;
            if remove_source {
                std::fs::remove_dir_all(&source)?;
            }
            Ok(())
        })
        .await
        .map_err(task_error)??;

        tracing::info!("Packaged {} archive of {}", tier, key);
        Ok(true)
    }

    /// Uploads the group's local archive and deletes it once the remote copy is confirmed
    ///
    /// Returns false if there is no local archive to upload.
    pub async fn upload(&self, key: &GroupKey, tier: Tier) -> ArchiveResult<bool> {
        let archive = self.layout.archive_file(key, tier);
        if !archive.is_file() {
            return Ok(false);
        }

        let location = Self::location(key);
        let size = tokio::fs::metadata(&archive).await?.len();
        let progress = TransferProgress::new(format!("Uploading {} {}", tier, key), size);

        if size <= self.chunk_size as u64 {
            let bytes = tokio::fs::read(&archive).await?;
            progress.record(bytes.len() as u64);
            self.store(tier)
                .put(&location, PutPayload::from(bytes))
                .await?;
        } else {
            self.upload_multipart(&archive, &location, tier, &progress)
                .await?;
        }

        match self.store(tier).head(&location).await {
            Ok(meta) if meta.size as u64 == size => {}
            Ok(_) | Err(object_store::Error::NotFound { .. }) => {
                return Err(ArchiveError::Unconfirmed {
                    key: key.remote_key(),
                })
            }
            Err(e) => return Err(e.into()),
        }

        tokio::fs::remove_file(&archive).await?;
        tracing::info!("Uploaded {} archive of {} ({} bytes)", tier, key, size);
        Ok(true)
    }

    async fn upload_multipart(
        &self,
        archive: &Path,
        location: &ObjectPath,
        tier: Tier,
        progress: &TransferProgress,
    ) -> ArchiveResult<()> {
        let upload = self.store(tier).put_multipart(location).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, self.chunk_size);
        let mut file = tokio::fs::File::open(archive).await?;
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let read = match file.read(&mut buffer).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    writer.abort().await?;
                    return Err(e.into());
                }
            };
            if let Err(e) = writer.wait_for_capacity(self.max_concurrency).await {
                writer.abort().await?;
                return Err(e.into());
            }
            writer.write(&buffer[..read]);
            progress.record(read as u64);
        }

        writer.finish().await?;
        Ok(())
    }

    /// Packages then uploads; true if an upload happened
    pub async fn ship(&self, key: &GroupKey, tier: Tier) -> ArchiveResult<bool> {
        self.package(key, tier).await?;
        self.upload(key, tier).await
    }

    /// `ship` that leaves the group's local directory in place
    ///
    /// The files stay available to the conversion workers once the tier's
    /// archive is confirmed remote.
    pub async fn ship_retaining(&self, key: &GroupKey, tier: Tier) -> ArchiveResult<bool> {
        self.package_dir(key, tier, false).await?;
        self.upload(key, tier).await
    }

    /// Removes the group's local directory on `tier`; false if there was none
    pub async fn prune_local(&self, key: &GroupKey, tier: Tier) -> ArchiveResult<bool> {
        let dir = self.layout.language_dir(key, tier);
        if !dir.is_dir() {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&dir).await?;
        tracing::debug!("Removed local {} directory of {}", tier, key);
        Ok(true)
    }

    /// Fetches the remote archive unless the group is already present locally
    pub async fn download(&self, key: &GroupKey, tier: Tier) -> ArchiveResult<bool> {
        let archive = self.layout.archive_file(key, tier);
        if self.layout.language_dir(key, tier).is_dir() || archive.is_file() {
            return Ok(false);
        }

        let result = self.store(tier).get(&Self::location(key)).await?;
        let progress = TransferProgress::new(format!("Downloading {} {}", tier, key), result.meta.size as u64);

        if let Some(parent) = archive.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = temp_sibling(&archive);
        let mut file = tokio::fs::File::create(&tmp).await?;
        let mut stream = result.into_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            progress.record(chunk.len() as u64);
        }
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &archive).await?;

        tracing::info!("Downloaded {} archive of {}", tier, key);
        Ok(true)
    }

    /// Unpacks the local archive next to it and deletes the archive
    pub async fn extract(&self, key: &GroupKey, tier: Tier) -> ArchiveResult<bool> {
        let archive = self.layout.archive_file(key, tier);
        if !archive.is_file() {
            return Ok(false);
        }

        let target = self.layout.language_dir(key, tier);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.layout.tier_dir(tier));

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut unpacker = tar::Archive::new(std::fs::File::open(&archive)?);
            unpacker.unpack(&parent)?;
            std::fs::remove_file(&archive)
        })
        .await
        .map_err(task_error)??;

        tracing::info!("Extracted {} archive of {}", tier, key);
        Ok(true)
    }

    pub async fn delete_remote(&self, key: &GroupKey, tier: Tier) -> ArchiveResult<()> {
        self.store(tier).delete(&Self::location(key)).await?;
        tracing::info!("Deleted remote {} archive of {}", tier, key);
        Ok(())
    }

    /// Group keys of every archive in the tier's bucket
    pub async fn list_keys(&self, tier: Tier) -> ArchiveResult<Vec<GroupKey>> {
        let mut listing = self.store(tier).list(None);
        let mut keys = Vec::new();
        while let Some(meta) = listing.next().await {
            let meta = meta?;
            match GroupKey::from_remote_key(meta.location.as_ref()) {
                Some(key) => keys.push(key),
                None => tracing::debug!("Ignoring object {} in {} bucket", meta.location, tier),
            }
        }
        keys.sort();
        Ok(keys)
    }
}
