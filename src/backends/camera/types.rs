// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use super::mailbox::FrameMailbox;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Rotation in degrees (clockwise), quantized to quarter turns
///
/// Used both for the sensor mounting angle relative to the device's natural
/// orientation and for the current display rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// No rotation
    #[default]
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl Rotation {
    /// All quarter turns in ascending order
    pub const ALL: [Rotation; 4] = [
        Rotation::None,
        Rotation::Rotate90,
        Rotation::Rotate180,
        Rotation::Rotate270,
    ];

    /// Parse an exact multiple of 90 (0, 90, 180, 270, also 360 and beyond)
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Self::None),
            90 => Some(Self::Rotate90),
            180 => Some(Self::Rotate180),
            270 => Some(Self::Rotate270),
            _ => None,
        }
    }

    /// Snap an arbitrary angle to the nearest quarter turn
    pub fn quantize(degrees: i32) -> Self {
        let normalized = degrees.rem_euclid(360);
        let quarter = ((normalized + 45) / 90) % 4;
        Self::ALL[quarter as usize]
    }

    /// Rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Rotate90 => 90,
            Self::Rotate180 => 180,
            Self::Rotate270 => 270,
        }
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Output resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count (u64 so 8K sensors cannot overflow)
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f64 / self.height as f64
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl std::str::FromStr for Size {
    type Err = String;

    /// Parse "1920x1080"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("Expected WIDTHxHEIGHT, got '{}'", s))?;
        let width = w
            .trim()
            .parse()
            .map_err(|e| format!("Invalid width '{}': {}", w, e))?;
        let height = h
            .trim()
            .parse()
            .map_err(|e| format!("Invalid height '{}': {}", h, e))?;
        Ok(Self { width, height })
    }
}

/// One image plane as delivered by the sensor
///
/// `row_stride` is the distance in bytes between the starts of two rows,
/// `pixel_stride` the distance between two horizontally adjacent samples
/// (2 when the two chroma channels share interleaved memory).
#[derive(Clone)]
pub struct Plane {
    pub data: Arc<[u8]>,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: impl Into<Arc<[u8]>>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data: data.into(),
            row_stride,
            pixel_stride,
        }
    }

    /// Bytes needed to address `rows` x `cols` samples with this plane's strides
    ///
    /// `None` when the strides overflow the address space.
    pub fn required_len(&self, cols: usize, rows: usize) -> Option<usize> {
        if cols == 0 || rows == 0 {
            return Some(0);
        }
        let last_row = (rows - 1).checked_mul(self.row_stride)?;
        let last_col = (cols - 1).checked_mul(self.pixel_stride)?;
        last_row.checked_add(last_col)?.checked_add(1)
    }
}

impl std::fmt::Debug for Plane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plane")
            .field("len", &self.data.len())
            .field("row_stride", &self.row_stride)
            .field("pixel_stride", &self.pixel_stride)
            .finish()
    }
}

/// A single YUV 4:2:0 exposure with three independently strided planes
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub y: Plane,
    pub u: Plane,
    pub v: Plane,
    /// Timestamp when frame was captured (for latency diagnostics)
    pub captured_at: Instant,
}

/// An encoded still image delivered on the dedicated still output
#[derive(Debug, Clone)]
pub struct EncodedStill {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Orientation tag the still was requested with
    pub orientation: u32,
}

/// Output a capture request is directed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    /// Continuous YUV preview output
    Preview,
    /// Dedicated high resolution still output
    Still,
}

/// Request template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
    StillCapture,
}

/// A capture instruction submitted to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub target: OutputTarget,
    pub template: RequestTemplate,
    /// Start an autofocus scan with this request
    pub af_trigger: bool,
    /// Orientation tag for encoded output (still requests only)
    pub jpeg_orientation: Option<u32>,
    /// Encoder quality (still requests only)
    pub jpeg_quality: Option<u8>,
}

impl CaptureRequest {
    /// Repeating request feeding the preview output
    pub fn preview() -> Self {
        Self {
            target: OutputTarget::Preview,
            template: RequestTemplate::Preview,
            af_trigger: false,
            jpeg_orientation: None,
            jpeg_quality: None,
        }
    }

    /// One-shot autofocus trigger against the preview output
    pub fn autofocus_trigger() -> Self {
        Self {
            af_trigger: true,
            ..Self::preview()
        }
    }

    /// One-shot still capture against the still output
    pub fn still(orientation: u32, quality: u8) -> Self {
        Self {
            target: OutputTarget::Still,
            template: RequestTemplate::StillCapture,
            af_trigger: false,
            jpeg_orientation: Some(orientation),
            jpeg_quality: Some(quality),
        }
    }
}

/// Sizes the session is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub preview_size: Size,
    pub still_size: Size,
}

/// Sender for encoded stills
pub type StillSender = tokio::sync::mpsc::UnboundedSender<EncodedStill>;

/// Receiver for encoded stills
pub type StillReceiver = tokio::sync::mpsc::UnboundedReceiver<EncodedStill>;

/// Both outputs of a capture session, configured once at open
///
/// Stills never require reconfiguring the session because the still output
/// exists alongside the preview output from the start.
#[derive(Clone)]
pub struct SessionOutputs {
    pub preview: Arc<FrameMailbox<RawFrame>>,
    pub still: StillSender,
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Camera access was not granted
    PermissionDenied(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Capture session could not be created
    SessionFailed(String),
    /// A capture instruction was rejected by the device
    SubmissionFailed(String),
    /// Operation requires an open session
    NotOpen,
    /// Format not supported
    FormatNotSupported(String),
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::SessionFailed(msg) => write!(f, "Session failed: {}", msg),
            BackendError::SubmissionFailed(msg) => write!(f, "Submission failed: {}", msg),
            BackendError::NotOpen => write!(f, "Device is not open"),
            BackendError::FormatNotSupported(msg) => write!(f, "Format not supported: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}
