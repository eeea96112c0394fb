// SPDX-License-Identifier: GPL-3.0-only

//! Sensor and display orientation reconciliation
//!
//! The sensor is mounted at a fixed angle relative to the device's natural
//! orientation. Preview frames are rotated by the difference between that
//! angle and the display rotation, sampled once when the session starts.
//! Stills carry an orientation tag computed from a fixed rear-camera table.

use super::types::{BackendResult, Rotation};
use tracing::{debug, warn};

/// Source of the current display rotation
pub trait DisplayRotationProvider: Send + Sync {
    /// Current quantized display rotation
    fn current_rotation(&self) -> BackendResult<Rotation>;
}

/// Display rotation that never changes
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDisplayRotation(pub Rotation);

impl DisplayRotationProvider for FixedDisplayRotation {
    fn current_rotation(&self) -> BackendResult<Rotation> {
        Ok(self.0)
    }
}

/// Orientation snapshot taken when the preview starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orientation {
    pub sensor: Rotation,
    pub device: Rotation,
    /// Rotation applied to every preview frame
    pub relative: Rotation,
}

impl Orientation {
    pub fn new(sensor: Rotation, device: Rotation) -> Self {
        let degrees = (sensor.degrees() + 360 - device.degrees()) % 360;
        let relative = Rotation::from_degrees(degrees).unwrap_or_default();
        Self {
            sensor,
            device,
            relative,
        }
    }

    /// Query the display rotation, treating failure as 0°
    pub fn resolve(sensor: Rotation, display: &dyn DisplayRotationProvider) -> Self {
        let device = match display.current_rotation() {
            Ok(rotation) => rotation,
            Err(e) => {
                warn!(error = %e, "Display rotation unavailable, assuming 0°");
                Rotation::None
            }
        };
        let orientation = Self::new(sensor, device);
        debug!(
            sensor = orientation.sensor.degrees(),
            device = orientation.device.degrees(),
            relative = orientation.relative.degrees(),
            "Resolved orientation"
        );
        orientation
    }

    /// Orientation tag for encoded stills
    ///
    /// The table compensates for the rear sensor's mounting offset regardless
    /// of how the preview is rotated.
    pub fn still_orientation(&self) -> u32 {
        let mapped = match self.device {
            Rotation::None => 90,
            Rotation::Rotate90 => 0,
            Rotation::Rotate180 => 270,
            Rotation::Rotate270 => 180,
        };
        (mapped + self.sensor.degrees()) % 360
    }
}
