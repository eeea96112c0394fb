// SPDX-License-Identifier: GPL-3.0-only

//! Still photo capture and encoding
//!
//! ```text
//! request ─▶ AF trigger ─▶ settle ─▶ capture_once ─▶ still output ─▶ handle
//! ```
//!
//! Saved files are written by [`crate::storage`]; this module only produces
//! the encoded bytes.

pub mod capture;
pub mod encoding;

pub use capture::{
    SharedDevice, StillCaptureHandle, StillCaptureOrchestrator, StillCaptureSettings,
    StillCaptureState, StillRequestPolicy, lock_device,
};
pub use encoding::{
    EncodingFormat, decode_to_rgba, encode_frame_base64, encode_frame_png, encode_jpeg,
    encode_png,
};
