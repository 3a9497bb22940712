//! Image re-encoding.
//!
//! Generated images arrive as PNG (or whatever the endpoint returns) and are
//! far too heavy to publish as-is. Everything is flattened to RGB, bounded to
//! a maximum width, and re-encoded as JPEG.

use crate::error::PipelineError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, imageops};
use std::io::Cursor;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;
pub const DEFAULT_MAX_WIDTH: u32 = 1920;

/// Re-encode raw image bytes as a bounded JPEG.
///
/// Decodes any supported input format, drops alpha/palette data, downscales
/// with Lanczos3 when the width exceeds `max_width` (aspect ratio preserved),
/// and encodes at `quality`. Pure bytes-to-bytes; fails with
/// [`PipelineError::Compression`] on undecodable input.
pub fn compress_image(bytes: &[u8], quality: u8, max_width: u32) -> Result<Vec<u8>, PipelineError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| PipelineError::compression(format!("unsupported image data: {e}")))?;

    let mut rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width > max_width {
        let scaled_height =
            ((height as f64) * (max_width as f64) / (width as f64)).round().max(1.0) as u32;
        rgb = imageops::resize(&rgb, max_width, scaled_height, FilterType::Lanczos3);
    }

    let mut out = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| PipelineError::compression(format!("jpeg encoding failed: {e}")))?;

    Ok(out.into_inner())
}
