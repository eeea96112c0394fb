// SPDX-License-Identifier: GPL-3.0-only

//! Frame processing from NV21 to display-ready RGBA
//!
//! The processor is an optional collaborator of the preview pipeline: it
//! takes an upright NV21 frame and a mode and returns an RGBA buffer, or
//! `None` when the frame cannot be processed (the frame is then skipped).
//!
//! [`CpuProcessor`] is the built-in implementation:
//! - **RAW**: BT.601 NV21 → RGBA
//! - **GRAYSCALE**: RGBA luminance replicated to all channels
//! - **CANNY**: Gaussian blur, Sobel gradients, non-maximum suppression and
//!   hysteresis thresholding, drawn as white edges on black

use super::PackedFrame;
use crate::constants::{CANNY_BLUR_SIGMA, CANNY_HIGH_THRESHOLD, CANNY_LOW_THRESHOLD};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Processing applied to preview frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    /// Color preview without processing
    Raw,
    /// Luminance only
    Grayscale,
    /// Edge detection
    #[default]
    Canny,
}

impl ProcessingMode {
    pub const ALL: [ProcessingMode; 3] = [
        ProcessingMode::Raw,
        ProcessingMode::Grayscale,
        ProcessingMode::Canny,
    ];

    /// Stable numeric code (RAW=0, GRAYSCALE=1, CANNY=2)
    pub fn code(&self) -> u8 {
        match self {
            ProcessingMode::Raw => 0,
            ProcessingMode::Grayscale => 1,
            ProcessingMode::Canny => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.code() == code)
    }

    /// Label used as the relay `format` field
    pub fn label(&self) -> &'static str {
        match self {
            ProcessingMode::Raw => "RAW",
            ProcessingMode::Grayscale => "GRAYSCALE",
            ProcessingMode::Canny => "CANNY",
        }
    }

    /// Next mode in the Raw → Grayscale → Canny cycle
    pub fn next(&self) -> Self {
        match self {
            ProcessingMode::Raw => ProcessingMode::Grayscale,
            ProcessingMode::Grayscale => ProcessingMode::Canny,
            ProcessingMode::Canny => ProcessingMode::Raw,
        }
    }

    /// Whether frames in this mode go through the processor and the relay
    pub fn is_processed(&self) -> bool {
        !matches!(self, ProcessingMode::Raw)
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for ProcessingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "0" => Ok(ProcessingMode::Raw),
            "grayscale" | "gray" | "1" => Ok(ProcessingMode::Grayscale),
            "canny" | "edges" | "2" => Ok(ProcessingMode::Canny),
            other => Err(format!("Unknown processing mode '{}'", other)),
        }
    }
}

/// Processed frame, 4 bytes per pixel in R,G,B,A order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RgbaFrame {
    /// Copy into an `image` buffer for encoding
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }
}

/// Turns an upright NV21 frame into a display-ready RGBA frame
pub trait FrameProcessor: Send + Sync {
    /// Returns `None` when the frame cannot be processed
    fn process(&self, frame: &PackedFrame, mode: ProcessingMode) -> Option<RgbaFrame>;
}

/// Pure CPU implementation of all three modes
#[derive(Debug, Clone, Copy)]
pub struct CpuProcessor {
    low_threshold: f32,
    high_threshold: f32,
    blur_sigma: f32,
}

impl Default for CpuProcessor {
    fn default() -> Self {
        Self {
            low_threshold: CANNY_LOW_THRESHOLD,
            high_threshold: CANNY_HIGH_THRESHOLD,
            blur_sigma: CANNY_BLUR_SIGMA,
        }
    }
}

impl CpuProcessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameProcessor for CpuProcessor {
    fn process(&self, frame: &PackedFrame, mode: ProcessingMode) -> Option<RgbaFrame> {
        let (width, height) = (frame.width, frame.height);
        if frame.data.len() != PackedFrame::buffer_len(width, height) {
            warn!(
                width,
                height,
                len = frame.data.len(),
                "Frame size does not match NV21 layout, skipping"
            );
            return None;
        }

        let rgba = nv21_to_rgba(frame);
        let data = match mode {
            ProcessingMode::Raw => rgba,
            ProcessingMode::Grayscale => gray_to_rgba(&rgba_to_gray(&rgba)),
            ProcessingMode::Canny => {
                let blurred = gaussian_blur_5x5(
                    &rgba_to_gray(&rgba),
                    width as usize,
                    height as usize,
                    self.blur_sigma,
                );
                let edges = canny_edges(
                    &blurred,
                    width as usize,
                    height as usize,
                    self.low_threshold,
                    self.high_threshold,
                );
                gray_to_rgba(&edges)
            }
        };

        Some(RgbaFrame {
            width,
            height,
            data,
        })
    }
}

/// BT.601 video-range conversion, one chroma pair per 2x2 block
fn nv21_to_rgba(frame: &PackedFrame) -> Vec<u8> {
    let w = frame.width as usize;
    let luma = frame.luma();
    let chroma = frame.chroma();
    let mut out = vec![0u8; luma.len() * 4];

    for (i, px) in out.chunks_exact_mut(4).enumerate() {
        let (x, y) = (i % w, i / w);
        let pair = (y / 2) * w + (x & !1);
        let c = (luma[i] as i32 - 16).max(0);
        let e = chroma[pair] as i32 - 128;
        let d = chroma[pair + 1] as i32 - 128;

        px[0] = clamp_u8((298 * c + 409 * e + 128) >> 8);
        px[1] = clamp_u8((298 * c - 100 * d - 208 * e + 128) >> 8);
        px[2] = clamp_u8((298 * c + 516 * d + 128) >> 8);
        px[3] = 255;
    }
    out
}

fn rgba_to_gray(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(4)
        .map(|px| {
            let (r, g, b) = (px[0] as u32, px[1] as u32, px[2] as u32);
            ((r * 299 + g * 587 + b * 114 + 500) / 1000) as u8
        })
        .collect()
}

fn gray_to_rgba(gray: &[u8]) -> Vec<u8> {
    gray.iter().flat_map(|&v| [v, v, v, 255]).collect()
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

const WEAK: u8 = 1;
const STRONG: u8 = 2;

/// Normalized 5-tap Gaussian weights for offsets -2..=2
fn gaussian_kernel_5(sigma: f32) -> [f32; 5] {
    let mut kernel = [0f32; 5];
    for (i, weight) in kernel.iter_mut().enumerate() {
        let x = i as f32 - 2.0;
        *weight = (-(x * x) / (2.0 * sigma * sigma)).exp();
    }
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|weight| *weight /= sum);
    kernel
}

/// Separable 5x5 Gaussian blur with clamp-to-edge borders
fn gaussian_blur_5x5(src: &[u8], width: usize, height: usize, sigma: f32) -> Vec<u8> {
    let kernel = gaussian_kernel_5(sigma);
    let mut horizontal = vec![0f32; src.len()];
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        for x in 0..width {
            horizontal[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let sx = (x + k).saturating_sub(2).min(width - 1);
                    row[sx] as f32 * weight
                })
                .sum();
        }
    }

    let mut out = vec![0u8; src.len()];
    for y in 0..height {
        for x in 0..width {
            let value: f32 = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let sy = (y + k).saturating_sub(2).min(height - 1);
                    horizontal[sy * width + x] * weight
                })
                .sum();
            out[y * width + x] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Canny edges on an already blurred luminance buffer; 255 marks an edge
fn canny_edges(src: &[u8], width: usize, height: usize, low: f32, high: f32) -> Vec<u8> {
    let mut edges = vec![0u8; width * height];
    if width < 3 || height < 3 {
        return edges;
    }

    let sample = |x: isize, y: isize| -> i32 {
        let x = x.clamp(0, width as isize - 1) as usize;
        let y = y.clamp(0, height as isize - 1) as usize;
        src[y * width + x] as i32
    };

    let mut magnitude = vec![0f32; width * height];
    let mut direction = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let (xi, yi) = (x as isize, y as isize);
            let gx = sample(xi + 1, yi - 1) + 2 * sample(xi + 1, yi) + sample(xi + 1, yi + 1)
                - sample(xi - 1, yi - 1)
                - 2 * sample(xi - 1, yi)
                - sample(xi - 1, yi + 1);
            let gy = sample(xi - 1, yi + 1) + 2 * sample(xi, yi + 1) + sample(xi + 1, yi + 1)
                - sample(xi - 1, yi - 1)
                - 2 * sample(xi, yi - 1)
                - sample(xi + 1, yi - 1);
            let i = y * width + x;
            magnitude[i] = (gx.abs() + gy.abs()) as f32;
            direction[i] = quantize_direction(gx, gy);
        }
    }

    // Non-maximum suppression along the gradient, then classify
    let mut class = vec![0u8; width * height];
    let mut stack = Vec::new();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let i = y * width + x;
            let m = magnitude[i];
            if m <= low {
                continue;
            }
            let (dx, dy) = DIRECTION_STEPS[direction[i] as usize];
            let ahead = magnitude[(y as isize + dy) as usize * width + (x as isize + dx) as usize];
            let behind = magnitude[(y as isize - dy) as usize * width + (x as isize - dx) as usize];
            if m > ahead && m >= behind {
                if m > high {
                    class[i] = STRONG;
                    edges[i] = 255;
                    stack.push(i);
                } else {
                    class[i] = WEAK;
                }
            }
        }
    }

    // Hysteresis: grow strong edges through 8-connected weak pixels
    while let Some(i) = stack.pop() {
        let (x, y) = ((i % width) as isize, (i / width) as isize);
        for dy in -1..=1isize {
            for dx in -1..=1isize {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= width as isize || ny >= height as isize {
                    continue;
                }
                let n = ny as usize * width + nx as usize;
                if class[n] == WEAK && edges[n] == 0 {
                    edges[n] = 255;
                    stack.push(n);
                }
            }
        }
    }

    edges
}

/// Horizontal, diagonal, vertical and anti-diagonal neighbour offsets
const DIRECTION_STEPS: [(isize, isize); 4] = [(1, 0), (1, 1), (0, 1), (-1, 1)];

fn quantize_direction(gx: i32, gy: i32) -> u8 {
    let angle = (gy as f32).atan2(gx as f32).to_degrees().rem_euclid(180.0);
    if !(22.5..157.5).contains(&angle) {
        0
    } else if angle < 67.5 {
        1
    } else if angle < 112.5 {
        2
    } else {
        3
    }
}
