// SPDX-License-Identifier: GPL-3.0-only

//! YUV 4:2:0 plane repacking into NV21
//!
//! The sensor delivers Y, U and V as separate buffers, each with its own row
//! stride (row padding) and pixel stride (1 for planar chroma, 2 when U and V
//! share interleaved memory). The output is always tightly packed luma
//! followed by V,U pairs, whatever the native interleaving was.
//!
//! Plane metadata that cannot describe the frame is rejected before any byte
//! is copied, so a conversion either fully succeeds or produces nothing.

use super::PackedFrame;
use crate::backends::camera::{Plane, RawFrame};
use std::fmt;

/// Plane metadata that violates the converter's preconditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Width or height is zero or odd
    InvalidDimensions { width: u32, height: u32 },
    /// Row or pixel stride of zero, or a row stride shorter than one row
    InvalidStride {
        plane: &'static str,
        row_stride: usize,
        pixel_stride: usize,
    },
    /// Plane buffer is shorter than its strides require
    PlaneTooShort {
        plane: &'static str,
        needed: usize,
        actual: usize,
    },
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::InvalidDimensions { width, height } => {
                write!(f, "Invalid frame dimensions {}x{} (must be even)", width, height)
            }
            ConvertError::InvalidStride {
                plane,
                row_stride,
                pixel_stride,
            } => write!(
                f,
                "Invalid {} plane strides (row {}, pixel {})",
                plane, row_stride, pixel_stride
            ),
            ConvertError::PlaneTooShort {
                plane,
                needed,
                actual,
            } => write!(
                f,
                "{} plane too short: need {} bytes, got {}",
                plane, needed, actual
            ),
        }
    }
}

impl std::error::Error for ConvertError {}

/// Convert a three-plane sensor frame into a packed NV21 frame
pub fn yuv420_to_nv21(frame: &RawFrame) -> Result<PackedFrame, ConvertError> {
    let (width, height) = (frame.width, frame.height);
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(ConvertError::InvalidDimensions { width, height });
    }

    let w = width as usize;
    let h = height as usize;
    let (cw, ch) = (w / 2, h / 2);

    validate_plane("Y", &frame.y, w, h)?;
    validate_plane("U", &frame.u, cw, ch)?;
    validate_plane("V", &frame.v, cw, ch)?;

    let y_size = w * h;
    let mut out = vec![0u8; PackedFrame::buffer_len(width, height)];

    copy_luma(&frame.y, w, h, &mut out[..y_size]);
    interleave_chroma(&frame.v, &frame.u, cw, ch, &mut out[y_size..]);

    Ok(PackedFrame {
        width,
        height,
        data: out,
    })
}

fn validate_plane(
    name: &'static str,
    plane: &Plane,
    cols: usize,
    rows: usize,
) -> Result<(), ConvertError> {
    let invalid = || ConvertError::InvalidStride {
        plane: name,
        row_stride: plane.row_stride,
        pixel_stride: plane.pixel_stride,
    };
    let min_row = (cols - 1)
        .checked_mul(plane.pixel_stride)
        .and_then(|len| len.checked_add(1))
        .ok_or_else(invalid)?;
    if plane.pixel_stride == 0 || plane.row_stride < min_row {
        return Err(invalid());
    }
    let needed = plane.required_len(cols, rows).ok_or_else(invalid)?;
    if plane.data.len() < needed {
        return Err(ConvertError::PlaneTooShort {
            plane: name,
            needed,
            actual: plane.data.len(),
        });
    }
    Ok(())
}

/// Copy luma rows, dropping row padding and skipping samples between pixels
fn copy_luma(plane: &Plane, width: usize, height: usize, out: &mut [u8]) {
    let src = &plane.data;
    if plane.pixel_stride == 1 {
        for (row, dst) in out.chunks_exact_mut(width).take(height).enumerate() {
            let start = row * plane.row_stride;
            dst.copy_from_slice(&src[start..start + width]);
        }
    } else {
        // Only the addressed part of the row is read; the last row may lack padding
        let row_len = (width - 1) * plane.pixel_stride + 1;
        for (row, dst) in out.chunks_exact_mut(width).take(height).enumerate() {
            let start = row * plane.row_stride;
            let row_data = &src[start..start + row_len];
            for (col, byte) in dst.iter_mut().enumerate() {
                *byte = row_data[col * plane.pixel_stride];
            }
        }
    }
}

/// Write one (V,U) pair per chroma sample, addressing each plane with its own strides
fn interleave_chroma(v: &Plane, u: &Plane, cols: usize, rows: usize, out: &mut [u8]) {
    let mut pairs = out.chunks_exact_mut(2);
    for row in 0..rows {
        let v_row = row * v.row_stride;
        let u_row = row * u.row_stride;
        for col in 0..cols {
            if let Some(pair) = pairs.next() {
                pair[0] = v.data[v_row + col * v.pixel_stride];
                pair[1] = u.data[u_row + col * u.pixel_stride];
            }
        }
    }
}
