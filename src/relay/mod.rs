// SPDX-License-Identifier: GPL-3.0-only

//! Best-effort frame relay to remote viewers
//!
//! Processed frames are PNG-encoded, wrapped in a small JSON message and
//! pushed through a [`RelaySink`]. [`ThrottledRelay`] enforces a minimum
//! interval between two forwarded frames; anything offered earlier is
//! dropped, never queued. Send failures are logged and swallowed so the
//! relay can never disturb preview or capture.
//!
//! # Modules
//!
//! - [`websocket`]: client sink over a persistent WebSocket connection
//! - [`hub`]: broadcast server that fans messages out to every viewer

pub mod hub;
pub mod websocket;

pub use hub::RelayHub;
pub use websocket::WsRelayClient;

use crate::constants::RELAY_MIN_INTERVAL;
use crate::media::RgbaFrame;
use crate::pipelines::photo::encoding::encode_frame_base64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Relay transport errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// No connection is open
    NotConnected,
    /// Connecting failed
    Connect(String),
    /// The message could not be handed to the transport
    Send(String),
    /// The frame could not be encoded
    Encode(String),
    /// The connection was closed
    Closed,
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::NotConnected => write!(f, "Relay is not connected"),
            RelayError::Connect(msg) => write!(f, "Failed to connect: {}", msg),
            RelayError::Send(msg) => write!(f, "Failed to send: {}", msg),
            RelayError::Encode(msg) => write!(f, "Failed to encode frame: {}", msg),
            RelayError::Closed => write!(f, "Relay connection closed"),
        }
    }
}

impl std::error::Error for RelayError {}

/// Wire message, one JSON object per text frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub width: u32,
    pub height: u32,
    /// Label of whatever produced the image (`CANNY`, `GRAYSCALE`, `JPEG`, …)
    pub format: String,
    /// Base64 of a PNG encoding of the image
    pub base64: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl RelayMessage {
    /// Encode a frame into a wire message
    pub fn from_frame(frame: &RelayFrame) -> Result<Self, RelayError> {
        let base64 =
            encode_frame_base64(&frame.image).map_err(|e| RelayError::Encode(e.to_string()))?;
        Ok(Self {
            width: frame.image.width,
            height: frame.image.height,
            format: frame.format.clone(),
            base64,
            timestamp: frame.timestamp,
        })
    }

    pub fn to_json(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::Encode(e.to_string()))
    }
}

/// A display-ready frame tagged with the label of the mode that produced it
#[derive(Debug, Clone)]
pub struct RelayFrame {
    pub image: RgbaFrame,
    pub format: String,
    pub timestamp: i64,
}

impl RelayFrame {
    /// Tag `image` with `format`, stamped with the current wall clock
    pub fn new(image: RgbaFrame, format: impl Into<String>) -> Self {
        Self {
            image,
            format: format.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Transport accepting serialized relay messages
pub trait RelaySink: Send + Sync {
    /// Hand one text message to the transport without blocking
    fn send_text(&self, text: String) -> Result<(), RelayError>;

    fn is_connected(&self) -> bool {
        true
    }
}

/// Encode and send a frame immediately, bypassing any throttle
pub fn send_frame(sink: &dyn RelaySink, frame: &RelayFrame) -> Result<(), RelayError> {
    let json = RelayMessage::from_frame(frame)?.to_json()?;
    sink.send_text(json)
}

/// Rate-limited forwarding to a sink
///
/// Owned by the frame worker, so the interval check needs no locking.
pub struct ThrottledRelay {
    sink: Arc<dyn RelaySink>,
    min_interval: Duration,
    last_sent: Option<Instant>,
    dropped: u64,
}

impl ThrottledRelay {
    pub fn new(sink: Arc<dyn RelaySink>) -> Self {
        Self::with_interval(sink, RELAY_MIN_INTERVAL)
    }

    pub fn with_interval(sink: Arc<dyn RelaySink>, min_interval: Duration) -> Self {
        Self {
            sink,
            min_interval,
            last_sent: None,
            dropped: 0,
        }
    }

    /// Whether a frame offered at `now` would be forwarded
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_sent
            .is_none_or(|last| now.saturating_duration_since(last) >= self.min_interval)
    }

    /// Offer a frame at the current instant
    pub fn offer(&mut self, frame: &RelayFrame) -> bool {
        self.offer_at(frame, Instant::now())
    }

    /// Offer a frame as if at `now`; returns whether it was forwarded
    ///
    /// Frames within the minimum interval of the last successful send are
    /// dropped before any encoding work. A failed send does not advance the
    /// interval, so the next frame is tried again.
    pub fn offer_at(&mut self, frame: &RelayFrame, now: Instant) -> bool {
        if !self.is_due(now) {
            self.dropped += 1;
            return false;
        }
        if !self.sink.is_connected() {
            return false;
        }

        match send_frame(self.sink.as_ref(), frame) {
            Ok(()) => {
                self.last_sent = Some(now);
                debug!(
                    width = frame.image.width,
                    height = frame.image.height,
                    format = %frame.format,
                    "Frame relayed"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "Relay send failed");
                false
            }
        }
    }

    /// Frames dropped by the throttle so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
