// SPDX-License-Identifier: GPL-3.0-only

//! Photo encoding
//!
//! - JPEG for stills produced by the virtual camera's still output
//! - PNG (lossless) for saved processed frames and relay payloads
//!
//! These are CPU-bound; async callers run them under `spawn_blocking`.

use crate::errors::PhotoError;
use crate::media::RgbaFrame;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{ImageFormat, RgbImage, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Supported encoding formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFormat {
    /// JPEG format (lossy compression)
    Jpeg,
    /// PNG format (lossless compression)
    Png,
}

impl EncodingFormat {
    /// Get file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            EncodingFormat::Jpeg => "jpg",
            EncodingFormat::Png => "png",
        }
    }
}

/// Encode an RGB image as JPEG at the given quality (1-100)
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, PhotoError> {
    let mut buffer = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
        &mut buffer,
        quality.clamp(1, 100),
    );

    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| PhotoError::EncodingFailed(format!("JPEG encoding failed: {}", e)))?;

    debug!(
        width = image.width(),
        height = image.height(),
        size = buffer.len(),
        "JPEG encoded"
    );
    Ok(buffer)
}

/// Encode an RGBA image as PNG
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PhotoError> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| PhotoError::EncodingFailed(format!("PNG encoding failed: {}", e)))?;
    Ok(buffer)
}

/// Encode a processed frame as PNG
pub fn encode_frame_png(frame: &RgbaFrame) -> Result<Vec<u8>, PhotoError> {
    let image = frame.to_image().ok_or_else(|| {
        PhotoError::EncodingFailed(format!(
            "Buffer of {} bytes does not match {}x{} RGBA",
            frame.data.len(),
            frame.width,
            frame.height
        ))
    })?;
    encode_png(&image)
}

/// PNG-encode a processed frame and return it as standard base64
pub fn encode_frame_base64(frame: &RgbaFrame) -> Result<String, PhotoError> {
    encode_frame_png(frame).map(|png| BASE64.encode(png))
}

/// Decode an encoded still (any format `image` can sniff) into RGBA
pub fn decode_to_rgba(data: &[u8]) -> Result<RgbaImage, PhotoError> {
    image::load_from_memory(data)
        .map(|img| img.to_rgba8())
        .map_err(|e| PhotoError::EncodingFailed(format!("Decoding failed: {}", e)))
}
