// SPDX-License-Identifier: GPL-3.0-only

//! Media processing utilities for color conversion, rotation and filtering
//!
//! Sensor frames arrive as three independently strided YUV 4:2:0 planes. The
//! preview path repacks them into one NV21 buffer ([`nv21_converter`]), turns
//! that buffer upright ([`rotation`]) and optionally hands it to a
//! [`processing::FrameProcessor`] that produces RGBA for display.
//!
//! # Modules
//!
//! - [`nv21_converter`]: stride-aware plane repacking into NV21
//! - [`rotation`]: quarter-turn rotation that keeps V,U pairs intact
//! - [`processing`]: RAW/GRAYSCALE/CANNY processing to RGBA

pub mod nv21_converter;
pub mod processing;
pub mod rotation;

pub use nv21_converter::{ConvertError, yuv420_to_nv21};
pub use processing::{CpuProcessor, FrameProcessor, ProcessingMode, RgbaFrame};
pub use rotation::rotate_nv21;

/// Packed NV21 frame: full-resolution luma followed by interleaved V,U pairs
///
/// The chroma plane holds one (V,U) pair per 2x2 luma block, so the buffer is
/// always exactly `width * height * 3 / 2` bytes and both dimensions are even.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PackedFrame {
    /// Wrap an existing buffer, checking the NV21 size invariant
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, ConvertError> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(ConvertError::InvalidDimensions { width, height });
        }
        let expected = Self::buffer_len(width, height);
        if data.len() != expected {
            return Err(ConvertError::PlaneTooShort {
                plane: "packed",
                needed: expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// NV21 buffer size for the given dimensions
    pub fn buffer_len(width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        luma + luma / 2
    }

    /// Luma plane
    pub fn luma(&self) -> &[u8] {
        &self.data[..self.width as usize * self.height as usize]
    }

    /// Interleaved V,U plane
    pub fn chroma(&self) -> &[u8] {
        &self.data[self.width as usize * self.height as usize..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_frame_invariant() {
        assert!(PackedFrame::new(4, 2, vec![0; 12]).is_ok());
        assert!(PackedFrame::new(4, 2, vec![0; 11]).is_err());
        assert!(PackedFrame::new(3, 2, vec![0; 9]).is_err());
    }

    #[test]
    fn test_planes_split_at_luma_size() {
        let frame = PackedFrame::new(2, 2, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(frame.luma(), &[1, 2, 3, 4]);
        assert_eq!(frame.chroma(), &[5, 6]);
    }
}
