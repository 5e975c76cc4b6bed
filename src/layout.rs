//! Local filesystem layout
//!
//! Every path the crawler reads or writes is derived here from structured
//! identifiers (state, constituency, language, part, tier), never by
//! inspecting existing path segments.
//!
//! ```text
//! {data}/raw/state_list.json
//! {data}/raw/{state}/district_list.json
//! {data}/raw/{state}/constituency_list.json
//! {data}/raw/{state}/{ac}/langs.json
//! {data}/raw/{state}/{ac}/parts.json
//! {data}/raw/{state}/{ac}/{lang}/{variant prefix}{part}.pdf
//! {data}/raw/{state}/{ac}/{lang}.tar
//! {data}/pages/{state}/{ac}/{lang}/{part}/{page}.webp
//! {data}/pages/{state}/{ac}/{lang}.tar
//! ```

use crate::catalog::DocumentVariant;
use crate::state::PartStatus;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Storage class of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Source PDFs as fetched
    Raw,
    /// Per-page WebP images converted from the PDFs
    Pages,
}

impl Tier {
    pub const ALL: [Tier; 2] = [Tier::Raw, Tier::Pages];

    /// Directory name of this tier under the data root
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Pages => "pages",
        }
    }

    /// Whether a part in `status` counts as done for this tier's seal
    ///
    /// The raw tier wants a payload or a confirmed-unavailable placeholder and
    /// rejects converted parts; the pages tier wants every part at or below
    /// the sentinel size. The two predicates overlap on the zero-byte case.
    pub fn accepts(&self, status: PartStatus) -> bool {
        match self {
            Self::Raw => status.is_raw_complete(),
            Self::Pages => status.is_pages_complete(),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Identity of a language group: one archive per tier, one resume ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub state_code: String,
    pub constituency: u32,
    pub language: String,
}

impl GroupKey {
    pub fn new(state_code: impl Into<String>, constituency: u32, language: impl Into<String>) -> Self {
        Self {
            state_code: state_code.into(),
            constituency,
            language: language.into(),
        }
    }

    /// Object key of this group's archive in either bucket
    pub fn remote_key(&self) -> String {
        format!(
            "{}/{}/{}.tar",
            self.state_code, self.constituency, self.language
        )
    }

    /// Parses a `{state}/{constituency}/{language}.tar` object key
    ///
    /// Returns `None` for anything else living in the bucket.
    pub fn from_remote_key(key: &str) -> Option<Self> {
        let mut segments = key.split('/');
        let state_code = segments.next()?;
        let constituency = segments.next()?.parse().ok()?;
        let language = segments.next()?.strip_suffix(".tar")?;

        if segments.next().is_some() || state_code.is_empty() || language.is_empty() {
            return None;
        }

        Some(Self::new(state_code, constituency, language))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.state_code, self.constituency, self.language
        )
    }
}

/// Path builder rooted at the configured data directory
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tier_dir(&self, tier: Tier) -> PathBuf {
        self.root.join(tier.dir_name())
    }

    // ===== Catalog cache files =====

    pub fn state_list_file(&self) -> PathBuf {
        self.tier_dir(Tier::Raw).join("state_list.json")
    }

    pub fn state_dir(&self, state_code: &str) -> PathBuf {
        self.tier_dir(Tier::Raw).join(state_code)
    }

    pub fn district_list_file(&self, state_code: &str) -> PathBuf {
        self.state_dir(state_code).join("district_list.json")
    }

    pub fn constituency_list_file(&self, state_code: &str) -> PathBuf {
        self.state_dir(state_code).join("constituency_list.json")
    }

    pub fn constituency_dir(&self, state_code: &str, constituency: u32) -> PathBuf {
        self.state_dir(state_code).join(constituency.to_string())
    }

    pub fn languages_file(&self, state_code: &str, constituency: u32) -> PathBuf {
        self.constituency_dir(state_code, constituency)
            .join("langs.json")
    }

    pub fn parts_file(&self, state_code: &str, constituency: u32) -> PathBuf {
        self.constituency_dir(state_code, constituency)
            .join("parts.json")
    }

    // ===== Language groups =====

    /// Directory accumulating a group's files on the given tier
    pub fn language_dir(&self, key: &GroupKey, tier: Tier) -> PathBuf {
        self.tier_dir(tier)
            .join(&key.state_code)
            .join(key.constituency.to_string())
            .join(&key.language)
    }

    /// Local archive file of a group on the given tier
    pub fn archive_file(&self, key: &GroupKey, tier: Tier) -> PathBuf {
        self.tier_dir(tier)
            .join(&key.state_code)
            .join(key.constituency.to_string())
            .join(format!("{}.tar", key.language))
    }

    // ===== Parts =====

    /// Raw PDF path of one part as produced by one variant
    pub fn part_file(&self, key: &GroupKey, part: u32, variant: DocumentVariant) -> PathBuf {
        self.language_dir(key, Tier::Raw)
            .join(format!("{}{}.pdf", variant.file_prefix(), part))
    }

    /// The file a part was resolved to, checking variants in priority order
    pub fn resolved_part(&self, key: &GroupKey, part: u32) -> Option<(DocumentVariant, PathBuf)> {
        DocumentVariant::ALL.iter().find_map(|variant| {
            let path = self.part_file(key, part, *variant);
            path.is_file().then_some((*variant, path))
        })
    }

    /// Size-based status of a part's raw file
    pub fn part_status(&self, key: &GroupKey, part: u32) -> io::Result<PartStatus> {
        match self.resolved_part(key, part) {
            Some((_, path)) => PartStatus::of_file(&path),
            None => Ok(PartStatus::Missing),
        }
    }

    /// Directory receiving the page images of one part
    pub fn pages_part_dir(&self, key: &GroupKey, part: u32) -> PathBuf {
        self.language_dir(key, Tier::Pages).join(part.to_string())
    }

    /// Part numbers present in a group's raw directory, for groups whose
    /// catalog listing is not cached locally
    pub fn scan_part_numbers(&self, key: &GroupKey) -> io::Result<Vec<u32>> {
        let dir = self.language_dir(key, Tier::Raw);
        let mut parts = Vec::new();

        for entry in std::fs::read_dir(&dir)? {
            let name = entry?.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".pdf")) else {
                continue;
            };
            let number = DocumentVariant::ALL
                .iter()
                .find_map(|v| stem.strip_prefix(v.file_prefix())?.parse::<u32>().ok());
            if let Some(number) = number {
                parts.push(number);
            }
        }

        parts.sort_unstable();
        parts.dedup();
        Ok(parts)
    }
}

/// Temporary sibling a file is written to before being renamed into place
pub fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `contents` to `path` through a temporary sibling
///
/// Existence checks treat any file at `path` as complete, so a crash mid-write
/// must never leave a truncated file there.
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}
