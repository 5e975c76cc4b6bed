/// Part status definitions derived from raw file sizes
///
/// The crawler keeps no database: a part's progress is read back from the size
/// of its raw PDF file, which lets every stage resume from whatever the
/// filesystem holds.
use std::fmt;
use std::io;
use std::path::Path;

/// Content written over a PDF once its pages have been converted
pub const CONVERTED_SENTINEL: &[u8] = b"DONE";

/// Largest file size still treated as "no payload left to process"
pub const SENTINEL_MAX_SIZE: u64 = 4;

/// Represents the progress of one part, as observed on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartStatus {
    /// No file for any variant; a network fetch is needed
    Missing,

    /// Zero-byte placeholder: the portal confirmed no document exists
    Unavailable,

    /// Sentinel-sized file: the pages were already extracted
    Converted,

    /// A real PDF payload is present
    Fetched,
}

impl PartStatus {
    /// Classifies a raw file by its size
    pub fn from_size(size: u64) -> Self {
        match size {
            0 => Self::Unavailable,
            s if s <= SENTINEL_MAX_SIZE => Self::Converted,
            _ => Self::Fetched,
        }
    }

    /// Classifies the file at `path`, mapping a missing file to `Missing`
    pub fn of_file(path: &Path) -> io::Result<Self> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Self::from_size(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::Missing),
            Err(e) => Err(e),
        }
    }

    /// Returns true if the part has been resolved and needs no network call
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Missing)
    }

    /// Returns true if the PDF still has pages waiting to be extracted
    pub fn needs_conversion(&self) -> bool {
        matches!(self, Self::Fetched)
    }

    /// Raw-tier completion: payload present or confirmed unavailable
    pub fn is_raw_complete(&self) -> bool {
        matches!(self, Self::Fetched | Self::Unavailable)
    }

    /// Pages-tier completion: file exists and is at most sentinel-sized
    pub fn is_pages_complete(&self) -> bool {
        matches!(self, Self::Converted | Self::Unavailable)
    }
}

impl fmt::Display for PartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Missing => "missing",
            Self::Unavailable => "unavailable",
            Self::Converted => "converted",
            Self::Fetched => "fetched",
        };
        write!(f, "{}", s)
    }
}
