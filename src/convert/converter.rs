use super::encode::{encode_lossless_webp, write_png};
use super::{pdf, ConversionError};
use crate::layout::{write_atomic, DataLayout, GroupKey};
use crate::state::{PartStatus, CONVERTED_SENTINEL};
use lopdf::Document;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::path::{Path, PathBuf};

/// What happened to a document handed to the converter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Pages were written and the PDF replaced by the sentinel
    Converted { pages: usize },
    /// Nothing to do: the file is a placeholder or already converted
    Skipped(PartStatus),
}

/// Converts one document at a time, encoding its pages in parallel
pub struct PageConverter {
    layout: DataLayout,
    pool: ThreadPool,
}

impl PageConverter {
    pub fn new(layout: DataLayout, page_threads: usize) -> Result<Self, ConversionError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(page_threads.max(1))
            .thread_name(|i| format!("page-encode-{}", i))
            .build()?;
        Ok(Self { layout, pool })
    }

    /// Converts part `part` of group `key`, whose PDF is at `pdf`
    ///
    /// # Process
    ///
    /// 1. Skip files at or below the sentinel size
    /// 2. Check every page holds exactly one image
    /// 3. Stage each page image as a PNG
    /// 4. Encode all PNGs to lossless WebP on the page pool
    /// 5. Once every page is done, overwrite the PDF with the sentinel
    pub fn convert(&self, key: &GroupKey, part: u32, pdf: &Path) -> Result<ConversionOutcome, ConversionError> {
        let status = PartStatus::of_file(pdf)?;
        if !status.needs_conversion() {
            return Ok(ConversionOutcome::Skipped(status));
        }

        let out_dir = self.layout.pages_part_dir(key, part);
        let staged = self.stage_pages(pdf, &out_dir)?;
        let pages = staged.len();

        self.pool.install(|| {
            staged
                .par_iter()
                .map(|(png, webp)| encode_lossless_webp(png, webp))
                .collect::<Result<Vec<()>, ConversionError>>()
        })?;

        write_atomic(pdf, CONVERTED_SENTINEL)?;
        Ok(ConversionOutcome::Converted { pages })
    }

    /// Writes every page image as `{page}.png`, returning (png, webp) path pairs
    fn stage_pages(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>, ConversionError> {
        let doc = Document::load(pdf)?;
        let images = pdf::page_images(&doc)?;

        std::fs::create_dir_all(out_dir)?;
        let mut staged = Vec::with_capacity(images.len());
        for (page, id) in images {
            let image = pdf::decode_image(&doc, page, id)?;
            let png = out_dir.join(format!("{}.png", page));
            write_png(&image, &png)?;
            staged.push((png, out_dir.join(format!("{}.webp", page))));
        }
        Ok(staged)
    }
}
