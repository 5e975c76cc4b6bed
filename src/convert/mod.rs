//! Conversion module: fetched PDFs to per-page lossless WebP images
//!
//! # Components
//!
//! - `PageConverter`: Converts one document, fanning page encoding out on a
//!   fixed-size thread pool and writing the `DONE` sentinel over the PDF
//! - `ConversionPipeline`: Bounded queue between the crawl and the conversion
//!   worker threads, with sentinel shutdown
//! - `PagesShipper`: Packages and uploads a language group's pages tier as
//!   soon as its last document is converted

mod converter;
mod encode;
pub(crate) mod pdf;
mod pipeline;

pub use converter::{ConversionOutcome, PageConverter};
pub use encode::encode_lossless_webp;
pub use pipeline::{
    message_queue, ConversionJob, ConversionPipeline, ConversionReport, PagesShipper, QueueMessage,
};

use thiserror::Error;

/// Errors raised while converting a single document
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("page {page} has {found} embedded images, expected exactly one")]
    Structural { page: u32, found: usize },

    #[error("unsupported image on page {page}: {reason}")]
    UnsupportedImage { page: u32, reason: String },

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to build page pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
