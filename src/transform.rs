pub mod params;

use crate::transform::params::ResizeMode;
use crate::{Result, ThumbCacheError};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Produces a thumbnail of `source` at `target`.
///
/// This is the seam between the cache and the pixel work; the store only
/// cares that a file appears at `target` or an error comes back.
pub trait Resizer: Send + Sync {
    fn resize(
        &self,
        source: &Path,
        target: &Path,
        width: u32,
        height: u32,
        mode: ResizeMode,
        quality: u8,
    ) -> Result<()>;
}

/// `Resizer` backed by the `image` crate.
///
/// The output format follows the extension of `target`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageResizer;

impl Resizer for ImageResizer {
    fn resize(
        &self,
        source: &Path,
        target: &Path,
        width: u32,
        height: u32,
        mode: ResizeMode,
        quality: u8,
    ) -> Result<()> {
        let (img, guessed) = decode_image(source)?;
        let format = target
            .extension()
            .and_then(|e| e.to_str())
            .and_then(ImageFormat::from_extension)
            .or(guessed)
            .ok_or_else(|| {
                ThumbCacheError::Processing(format!("Cannot pick output format for {}", target.display()))
            })?;

        let thumb = thumbnail(&img, width, height, mode);
        let bytes = encode_image(&thumb, format, quality)?;
        std::fs::write(target, bytes)?;
        Ok(())
    }
}

/// Decodes an image file, detecting the format from its contents.
///
/// # Errors
/// Returns `ThumbCacheError::Processing` if the data is malformed or the
/// format is unsupported, and `Io` if the file cannot be opened.
pub fn decode_image(path: &Path) -> Result<(DynamicImage, Option<ImageFormat>)> {
    let reader = image::ImageReader::open(path)?
        .with_guessed_format()?;
    let format = reader.format();
    let img = reader
        .decode()
        .map_err(|e| ThumbCacheError::Processing(e.to_string()))?;
    Ok((img, format))
}

/// Builds a thumbnail that never upscales.
///
/// - Source fits inside the box: returned unchanged.
/// - `Inset`: scaled to fit within the box, aspect preserved, no crop.
/// - `Outbound`: the box is clamped to the source size, then the image is
///   scaled to cover it and centre-cropped to exactly that size.
pub fn thumbnail(img: &DynamicImage, width: u32, height: u32, mode: ResizeMode) -> DynamicImage {
    let (orig_w, orig_h) = img.dimensions();
    if orig_w <= width && orig_h <= height {
        return img.clone();
    }

    match mode {
        ResizeMode::Inset => img.resize(width, height, FilterType::Lanczos3),
        ResizeMode::Outbound => {
            let box_w = width.min(orig_w).max(1);
            let box_h = height.min(orig_h).max(1);
            img.resize_to_fill(box_w, box_h, FilterType::Lanczos3)
        }
    }
}

/// Encodes `img` as `fmt`.
///
/// Quality (clamped to 1-100) applies to JPEG, WebP (lossy via libwebp) and
/// AVIF. Other formats use the `image` crate's default encoder settings.
pub fn encode_image(img: &DynamicImage, fmt: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    let q = quality.clamp(1, 100);
    let mut out = Vec::new();

    match fmt {
        ImageFormat::Jpeg => {
            let rgb = img.to_rgb8();
            let (w, h) = rgb.dimensions();
            let enc = JpegEncoder::new_with_quality(&mut out, q);
            enc.write_image(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                .map_err(|e| ThumbCacheError::Processing(e.to_string()))?;
        }
        ImageFormat::WebP => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            let encoded = webp::Encoder::from_rgba(rgba.as_raw(), w, h).encode(q as f32);
            out.extend_from_slice(&encoded);
        }
        ImageFormat::Avif => {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            // Speed 4 balances encoding time and compression ratio
            let enc = AvifEncoder::new_with_speed_quality(&mut out, 4, q);
            enc.write_image(rgba.as_raw(), w, h, ExtendedColorType::Rgba8)
                .map_err(|e| ThumbCacheError::Processing(e.to_string()))?;
        }
        other => {
            img.write_to(&mut Cursor::new(&mut out), other)
                .map_err(|e| ThumbCacheError::Processing(e.to_string()))?;
        }
    }

    Ok(out)
}
