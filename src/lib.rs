// SPDX-License-Identifier: GPL-3.0-only

//! Edge Camera - live camera preview with on-device processing and relay
//!
//! Frames from a camera device are converted from strided YUV 4:2:0 planes to
//! NV21, rotated upright, processed (RAW, GRAYSCALE or CANNY) and displayed.
//! Processed frames are relayed as JSON over a WebSocket at a bounded rate,
//! and full-resolution stills can be captured without pausing the preview.
//!
//! # Architecture
//!
//! - [`app`]: viewer session lifecycle and the render-side reader
//! - [`backends`]: camera device abstraction and the virtual camera
//! - [`media`]: plane conversion, rotation and frame processing
//! - [`pipelines`]: preview dispatch and still capture
//! - [`relay`]: throttled relay, WebSocket client and broadcast hub
//! - [`config`]: user configuration handling
//! - [`storage`]: snapshot files

pub mod app;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod media;
pub mod pipelines;
pub mod relay;
pub mod storage;

// Re-export commonly used types
pub use app::ViewerSession;
pub use config::Config;
pub use errors::{AppError, AppResult};
pub use media::ProcessingMode;
