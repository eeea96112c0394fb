// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Preview size used when the device reports no supported sizes
pub const DEFAULT_PREVIEW_WIDTH: u32 = 1280;
pub const DEFAULT_PREVIEW_HEIGHT: u32 = 720;

/// Preview sizes above this area are only used when nothing smaller exists (Full HD)
pub const MAX_PREVIEW_AREA: u64 = 1920 * 1080;

/// Aspect ratio the size selector tries to match (16:9)
pub const TARGET_ASPECT_RATIO: f64 = 16.0 / 9.0;

/// Fixed delay between the autofocus trigger and the still capture instruction
pub const STILL_SETTLE_DELAY: Duration = Duration::from_millis(200);

/// How long an issued still capture may take before it is considered lost
pub const STILL_CAPTURE_TIMEOUT: Duration = Duration::from_secs(3);

/// JPEG quality requested for still captures
pub const STILL_JPEG_QUALITY: u8 = 100;

/// Minimum interval between two relayed frames (~5 fps)
pub const RELAY_MIN_INTERVAL: Duration = Duration::from_millis(200);

/// Outgoing relay messages buffered before new ones are dropped
pub const RELAY_QUEUE_CAPACITY: usize = 2;

/// WebSocket path served by the relay hub
pub const RELAY_HUB_PATH: &str = "/frames";

/// Default bind address for the relay hub
pub const RELAY_HUB_DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// How long the frame worker waits for a frame before re-checking its stop signal
pub const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Canny hysteresis thresholds (L1 gradient magnitude)
pub const CANNY_LOW_THRESHOLD: f32 = 50.0;
pub const CANNY_HIGH_THRESHOLD: f32 = 150.0;

/// Sigma of the 5x5 Gaussian blur applied before edge detection
pub const CANNY_BLUR_SIGMA: f32 = 1.5;

/// Frame rate of the virtual camera's generator thread
pub const VIRTUAL_CAMERA_FPS: u32 = 30;

/// Application directory name used below the config and picture directories
pub const APP_DIR_NAME: &str = "edge-camera";
