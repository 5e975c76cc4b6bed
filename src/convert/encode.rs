use super::ConversionError;
use crate::layout::temp_sibling;
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Writes a page image to its PNG staging file
pub fn write_png(image: &DynamicImage, path: &Path) -> Result<(), ConversionError> {
    image.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Re-encodes a staged PNG as lossless WebP, then deletes the PNG
///
/// The WebP goes through a temporary sibling so a half-written file is never
/// mistaken for a finished page.
pub fn encode_lossless_webp(png: &Path, webp: &Path) -> Result<(), ConversionError> {
    let image = image::open(png)?;
    // the lossless encoder only takes 8-bit gray or RGB(A)
    let image = match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => image,
        other => DynamicImage::ImageRgba8(other.to_rgba8()),
    };

    let tmp = temp_sibling(webp);
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        image.write_with_encoder(WebPEncoder::new_lossless(&mut writer))?;
    }
    std::fs::rename(&tmp, webp)?;
    std::fs::remove_file(png)?;
    Ok(())
}
