// SPDX-License-Identifier: GPL-3.0-only

//! Capture pipelines
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Camera Frame │ ──▶ │ Preview Pipeline  │ ──▶ │   Display    │
//! │ (YUV 4:2:0)  │     │  - YUV→NV21       │     │   + Relay    │
//! │              │     │  - Rotation       │     │              │
//! │              │     │  - Processing     │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Still Output │ ──▶ │  Photo Pipeline   │ ──▶ │  JPEG / PNG  │
//! │   (JPEG)     │     │  - AF + capture   │     │              │
//! │              │     │  - Encoding       │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! - [`preview`]: frame worker, conversion, rotation and dispatch
//! - [`photo`]: still capture orchestration and image encoding

pub mod photo;
pub mod preview;
