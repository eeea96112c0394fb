// SPDX-License-Identifier: GPL-3.0-only

//! Snapshot files
//!
//! Names carry a millisecond timestamp: `photo_<ms>.jpg` for stills and
//! `processed_<ms>.png` for saved processed frames. Writes run on the blocking
//! pool so callers on the async runtime are never stalled by disk I/O.

use crate::constants::APP_DIR_NAME;
use crate::errors::PhotoError;
use crate::media::RgbaFrame;
use crate::pipelines::photo::encoding::{EncodingFormat, encode_frame_png};
use std::path::{Path, PathBuf};
use tracing::info;

/// `~/Pictures/edge-camera`, or `$HOME/Pictures/edge-camera` without a
/// platform picture directory
pub fn default_output_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Pictures")
        })
        .join(APP_DIR_NAME)
}

/// File name for a snapshot taken at `timestamp_ms`
pub fn snapshot_file_name(prefix: &str, timestamp_ms: i64, format: EncodingFormat) -> String {
    format!("{}_{}.{}", prefix, timestamp_ms, format.extension())
}

/// Write an encoded still as `photo_<ms>.jpg`
pub async fn save_photo(dir: &Path, jpeg: Vec<u8>) -> Result<PathBuf, PhotoError> {
    let path = dir.join(snapshot_file_name(
        "photo",
        chrono::Utc::now().timestamp_millis(),
        EncodingFormat::Jpeg,
    ));
    write_file(path, jpeg).await
}

/// PNG-encode a processed frame and write it as `processed_<ms>.png`
pub async fn save_processed(dir: &Path, frame: RgbaFrame) -> Result<PathBuf, PhotoError> {
    let path = dir.join(snapshot_file_name(
        "processed",
        chrono::Utc::now().timestamp_millis(),
        EncodingFormat::Png,
    ));
    let png = tokio::task::spawn_blocking(move || encode_frame_png(&frame))
        .await
        .map_err(|e| PhotoError::EncodingFailed(format!("Encoding task failed: {}", e)))??;
    write_file(path, png).await
}

async fn write_file(path: PathBuf, data: Vec<u8>) -> Result<PathBuf, PhotoError> {
    let size = data.len();
    let written = tokio::task::spawn_blocking(move || {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, data).map(|_| path)
    })
    .await
    .map_err(|e| PhotoError::SaveFailed(format!("Save task failed: {}", e)))?
    .map_err(|e| PhotoError::SaveFailed(e.to_string()))?;

    info!(path = %written.display(), size, "Snapshot saved");
    Ok(written)
}
