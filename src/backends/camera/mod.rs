// SPDX-License-Identifier: GPL-3.0-only
// Camera backend with trait-based abstraction over the device SDK

//! Camera backend abstraction
//!
//! The pipeline never talks to a platform camera SDK directly. Everything it
//! needs from a sensor is expressed by the small [`CameraDevice`] capability
//! trait, so the same pipeline runs against real hardware or the synthetic
//! [`VirtualCamera`](crate::backends::virtual_camera::VirtualCamera).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  PreviewPipeline    │  ← Size selection, orientation, worker lifecycle
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ CameraDevice Trait  │  ← open / set_repeating_capture / capture_once / close
//! └──────────┬──────────┘
//!            │
//!      ┌─────┴─────┐
//!      ▼           ▼
//!  preview      still
//!  mailbox      channel
//! ```

pub mod frame_loop;
pub mod mailbox;
pub mod orientation;
pub mod size_selector;
pub mod types;

pub use frame_loop::{FrameWorker, LoopAction};
pub use mailbox::FrameMailbox;
pub use orientation::{DisplayRotationProvider, FixedDisplayRotation, Orientation};
pub use size_selector::{select_largest_size, select_optimal_size};
pub use types::*;

/// Capability interface of a camera device
///
/// Both outputs are handed over in [`open`](CameraDevice::open): preview
/// frames go to a latest-wins mailbox and encoded stills to a channel, so a
/// still capture never requires the session to be reconfigured.
pub trait CameraDevice: Send {
    /// Mounting angle of the sensor relative to the device's natural orientation
    fn sensor_orientation(&self) -> Rotation;

    /// Sizes the preview (YUV) output supports
    fn preview_sizes(&self) -> Vec<Size>;

    /// Sizes the still (JPEG) output supports
    fn still_sizes(&self) -> Vec<Size>;

    /// Open the device and create a session with both outputs
    ///
    /// # Returns
    /// * `Err(BackendError::PermissionDenied)` - Access was not granted; the
    ///   pipeline must not start
    /// * `Err(BackendError::SessionFailed)` - The session could not be created
    fn open(&mut self, config: &SessionConfig, outputs: SessionOutputs) -> BackendResult<()>;

    /// Replace the repeating request feeding the preview output
    fn set_repeating_capture(&mut self, request: &CaptureRequest) -> BackendResult<()>;

    /// Submit a single request
    ///
    /// Requests targeting [`OutputTarget::Still`] produce one encoded image on
    /// the still output some time after this returns.
    fn capture_once(&mut self, request: &CaptureRequest) -> BackendResult<()>;

    /// Stop all output and release the device
    fn close(&mut self);
}
