// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for camera capture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            Pipelines / App Layer             │
//! └────────────────────┬────────────────────────┘
//!                      │ CameraDevice
//! ┌────────────────────┴────────────────────────┐
//! │              Backend Layer                   │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │      Camera      │  │ Virtual Camera  │  │
//! │  │ (trait + types)  │  │ (test pattern)  │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! - [`camera`]: device capability trait, frame types, sizing and orientation
//! - [`virtual_camera`]: software device producing strided YUV planes

pub mod camera;
pub mod virtual_camera;
