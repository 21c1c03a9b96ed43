//! Capture recompression — canvas PNG to a transport-sized JPEG.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;

use doodlebot_core::error::{DoodleBotError, Result};

/// Re-encode a PNG screenshot as JPEG, resized to fit within
/// `max_dimension` x `max_dimension` while preserving aspect ratio.
pub fn recompress(png: &[u8], max_dimension: u32, quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(png)
        .map_err(|e| DoodleBotError::Capture(format!("decode failed: {e}")))?;

    let img = if img.width() > max_dimension || img.height() > max_dimension {
        img.thumbnail(max_dimension, max_dimension)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = img.to_rgb8();

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| DoodleBotError::Capture(format!("encode failed: {e}")))?;

    Ok(out.into_inner())
}
