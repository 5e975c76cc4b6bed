//! Page image extraction
//!
//! Roll PDFs are scans: every page is a single embedded image. Only that
//! shape is supported; anything else is a structural error for the document.

use super::ConversionError;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Follows a reference, returning direct objects unchanged
fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Result<&'a Object, lopdf::Error> {
    match object {
        Object::Reference(id) => doc.get_object(*id),
        other => Ok(other),
    }
}

/// Resources dictionary of a page, inherited from its ancestors if needed
fn page_resources<'a>(doc: &'a Document, page_id: ObjectId) -> Result<Option<&'a Dictionary>, lopdf::Error> {
    let mut node = doc.get_dictionary(page_id)?;
    loop {
        if let Ok(resources) = node.get(b"Resources") {
            return Ok(Some(resolve(doc, resources)?.as_dict()?));
        }
        match node.get(b"Parent") {
            Ok(parent) => node = resolve(doc, parent)?.as_dict()?,
            Err(_) => return Ok(None),
        }
    }
}

/// Image XObjects referenced from a page's resources
fn page_image_ids(doc: &Document, page_id: ObjectId) -> Result<Vec<ObjectId>, lopdf::Error> {
    let Some(resources) = page_resources(doc, page_id)? else {
        return Ok(Vec::new());
    };
    let Ok(xobjects) = resources.get(b"XObject") else {
        return Ok(Vec::new());
    };

    let mut images = Vec::new();
    for (_, entry) in resolve(doc, xobjects)?.as_dict()?.iter() {
        let Ok(id) = entry.as_reference() else {
            continue;
        };
        let Ok(stream) = doc.get_object(id).and_then(Object::as_stream) else {
            continue;
        };
        let is_image = stream
            .dict
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|name| name == b"Image")
            .unwrap_or(false);
        if is_image {
            images.push(id);
        }
    }
    Ok(images)
}

/// The single image of every page, keyed by 1-based page number
///
/// Every page is checked before anything is returned, so a malformed
/// document is rejected before any output is written.
pub fn page_images(doc: &Document) -> Result<Vec<(u32, ObjectId)>, ConversionError> {
    let mut pages = Vec::new();
    for (page, page_id) in doc.get_pages() {
        let images = page_image_ids(doc, page_id)?;
        if images.len() != 1 {
            return Err(ConversionError::Structural {
                page,
                found: images.len(),
            });
        }
        pages.push((page, images[0]));
    }
    Ok(pages)
}

fn filter_names(stream: &Stream) -> Vec<Vec<u8>> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(|n| n.to_vec()))
            .collect(),
        _ => Vec::new(),
    }
}

fn dimension(stream: &Stream, key: &[u8], page: u32) -> Result<u32, ConversionError> {
    stream
        .dict
        .get(key)
        .and_then(Object::as_i64)
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
        .ok_or_else(|| ConversionError::UnsupportedImage {
            page,
            reason: format!("missing {}", String::from_utf8_lossy(key)),
        })
}

/// Expands 1-bit samples (rows padded to a byte) to 8-bit gray
fn expand_bilevel(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let row_bytes = width.div_ceil(8) as usize;
    let mut out = Vec::with_capacity(width as usize * height as usize);
    for row in data.chunks(row_bytes).take(height as usize) {
        for x in 0..width as usize {
            let bit = (row[x / 8] >> (7 - (x % 8))) & 1;
            out.push(if bit == 1 { 255 } else { 0 });
        }
    }
    out
}

/// Decodes the image XObject `id` of `page`
///
/// JPEG (`DCTDecode`) streams are decoded as-is. Flate-compressed or
/// unfiltered streams are read as raw 8-bit gray or RGB samples (told apart
/// by their length) or as 1-bit gray.
pub fn decode_image(doc: &Document, page: u32, id: ObjectId) -> Result<DynamicImage, ConversionError> {
    let stream = doc.get_object(id)?.as_stream()?;
    let filters = filter_names(stream);

    if filters.iter().any(|f| f == b"DCTDecode") {
        return Ok(image::load_from_memory_with_format(
            &stream.content,
            ImageFormat::Jpeg,
        )?);
    }

    let samples = match filters.as_slice() {
        [] => stream.content.clone(),
        [only] if only == b"FlateDecode" => stream.decompressed_content()?,
        _ => {
            let names: Vec<String> = filters
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect();
            return Err(ConversionError::UnsupportedImage {
                page,
                reason: format!("filters {}", names.join(",")),
            });
        }
    };

    let width = dimension(stream, b"Width", page)?;
    let height = dimension(stream, b"Height", page)?;
    let bits = stream
        .dict
        .get(b"BitsPerComponent")
        .and_then(Object::as_i64)
        .unwrap_or(8);
    let pixels = width as usize * height as usize;

    let unsupported = |reason: String| ConversionError::UnsupportedImage { page, reason };

    match bits {
        8 if samples.len() == pixels => GrayImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| unsupported("gray sample buffer too small".to_string())),
        8 if samples.len() == pixels * 3 => RgbImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| unsupported("RGB sample buffer too small".to_string())),
        1 if samples.len() >= width.div_ceil(8) as usize * height as usize => {
            let gray = expand_bilevel(&samples, width, height);
            GrayImage::from_raw(width, height, gray)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| unsupported("bilevel sample buffer too small".to_string()))
        }
        _ => Err(unsupported(format!(
            "{} bits per component with {} bytes for {}x{}",
            bits,
            samples.len(),
            width,
            height
        ))),
    }
}
