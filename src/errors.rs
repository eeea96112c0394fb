// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the camera application

use crate::backends::camera::BackendError;
use crate::media::nv21_converter::ConvertError;
use crate::relay::RelayError;
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera device errors
    Camera(BackendError),
    /// Still capture errors
    Photo(PhotoError),
    /// Relay transport errors
    Relay(RelayError),
    /// Malformed sensor planes
    Convert(ConvertError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Photo capture errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoError {
    /// The preview pipeline is not running
    NoCameraSession,
    /// A still request is already outstanding and the policy rejects new ones
    CaptureInProgress,
    /// Capture failed
    CaptureFailed(String),
    /// The request was superseded or the pipeline stopped before completion
    Abandoned,
    /// Encoding failed
    EncodingFailed(String),
    /// Save failed
    SaveFailed(String),
    /// No frame available for capture
    NoFrameAvailable,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Photo(e) => write!(f, "Photo error: {}", e),
            AppError::Relay(e) => write!(f, "Relay error: {}", e),
            AppError::Convert(e) => write!(f, "Conversion error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for PhotoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhotoError::NoCameraSession => write!(f, "Camera is not running"),
            PhotoError::CaptureInProgress => write!(f, "A still capture is already in progress"),
            PhotoError::CaptureFailed(msg) => write!(f, "Capture failed: {}", msg),
            PhotoError::Abandoned => write!(f, "Capture request was abandoned"),
            PhotoError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
            PhotoError::SaveFailed(msg) => write!(f, "Save failed: {}", msg),
            PhotoError::NoFrameAvailable => write!(f, "No frame available for capture"),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for PhotoError {}

// Conversions from sub-errors to AppError
impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Camera(err)
    }
}

impl From<PhotoError> for AppError {
    fn from(err: PhotoError) -> Self {
        AppError::Photo(err)
    }
}

impl From<RelayError> for AppError {
    fn from(err: RelayError) -> Self {
        AppError::Relay(err)
    }
}

impl From<ConvertError> for AppError {
    fn from(err: ConvertError) -> Self {
        AppError::Convert(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}
