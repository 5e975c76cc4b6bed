use crate::archive::ArchiveManager;
use crate::layout::{GroupKey, Tier};
use crate::Result;
use std::collections::HashSet;

/// Language groups already archived remotely
///
/// Loaded once at startup from the keys of both buckets (a group whose raw
/// archive was converted and removed still has its pages archive). The crawl
/// never enumerates parts of a group found here.
#[derive(Debug, Clone, Default)]
pub struct ResumeLedger {
    entries: HashSet<GroupKey>,
}

impl ResumeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: impl IntoIterator<Item = GroupKey>) -> Self {
        Self {
            entries: keys.into_iter().collect(),
        }
    }

    /// Builds the ledger from the remote listing of every tier
    pub async fn load(archive: &ArchiveManager) -> Result<Self> {
        let mut ledger = Self::new();
        for tier in Tier::ALL {
            let keys = archive.list_keys(tier).await?;
            tracing::info!("Resume ledger: {} archived groups in {} tier", keys.len(), tier);
            ledger.entries.extend(keys);
        }
        Ok(ledger)
    }

    pub fn contains(&self, key: &GroupKey) -> bool {
        self.entries.contains(key)
    }

    /// Records a group shipped during this run
    pub fn insert(&mut self, key: GroupKey) -> bool {
        self.entries.insert(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
