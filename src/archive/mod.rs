//! Archive module: tiered packaging and remote storage of language groups
//!
//! A language group is shipped as one tar archive per tier. The remote side
//! is any `object_store` implementation: an S3-compatible service in
//! production, a local directory for development, memory in tests.

mod manager;
mod progress;

pub use manager::ArchiveManager;
pub use progress::TransferProgress;

use crate::config::{RemoteBackend, RemoteConfig};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::ObjectStore;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while packaging or transferring archives
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Object store error: {0}")]
    Store(#[from] object_store::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive task failed: {0}")]
    Task(String),

    #[error("Upload of {key} could not be confirmed")]
    Unconfirmed { key: String },

    #[error("Invalid remote storage configuration: {0}")]
    Config(String),
}

/// Opens the object store backing one bucket
pub fn open_store(remote: &RemoteConfig, bucket: &str) -> Result<Arc<dyn ObjectStore>, ArchiveError> {
    match remote.backend {
        RemoteBackend::S3 => {
            let mut builder = AmazonS3Builder::from_env()
                .with_bucket_name(bucket)
                .with_region(&remote.region);
            if let Some(endpoint) = &remote.endpoint {
                builder = builder.with_endpoint(endpoint);
            }
            Ok(Arc::new(builder.build()?))
        }
        RemoteBackend::Local => {
            let root = remote
                .local_root
                .as_ref()
                .map(PathBuf::from)
                .ok_or_else(|| ArchiveError::Config("local backend needs local-root".to_string()))?
                .join(bucket);
            std::fs::create_dir_all(&root)?;
            Ok(Arc::new(LocalFileSystem::new_with_prefix(root)?))
        }
    }
}
