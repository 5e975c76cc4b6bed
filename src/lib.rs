//! Roll-Harvester: a resumable crawler for captcha-gated electoral roll archives
//!
//! This crate walks a hierarchical document catalog (state → district →
//! constituency → language → part), fetches every part through a captcha-gated
//! endpoint, converts fetched PDFs into per-page lossless WebP images, and ships
//! the results to tiered remote object storage. Every step is idempotent so an
//! interrupted run resumes where it stopped.

pub mod archive;
pub mod captcha;
pub mod catalog;
pub mod config;
pub mod convert;
pub mod crawler;
pub mod layout;
pub mod output;
pub mod state;

use thiserror::Error;

/// Main error type for Roll-Harvester operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Could not open a portal session: {0}")]
    Session(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("{operation} failed after {attempts} attempts: {reason}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        reason: String,
    },

    #[error("{operation} gave up after {attempts} consecutive captcha rejections")]
    CaptchaAttemptsExhausted { operation: String, attempts: u32 },

    #[error("No document variant is published for {item}")]
    VariantsExhausted { item: String },

    #[error("Crawl aborted after {attempts} sessions, last error: {last_error}")]
    SessionsExhausted { attempts: u32, last_error: String },

    #[error("Captcha solver error: {0}")]
    Captcha(#[from] captcha::CaptchaError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] convert::ConversionError),

    #[error("Archive error: {0}")]
    Archive(#[from] archive::ArchiveError),

    #[error("Conversion pipeline closed: {0}")]
    Pipeline(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Roll-Harvester operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use layout::{DataLayout, GroupKey, Tier};
pub use state::{PartStatus, ResumeLedger, RetryState};
