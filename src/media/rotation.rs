// SPDX-License-Identifier: GPL-3.0-only

//! Quarter-turn rotation of NV21 buffers
//!
//! Luma is rotated sample by sample. Chroma is rotated in units of one (V,U)
//! pair so the two bytes of a pair always stay adjacent and in V,U order.

use super::PackedFrame;
use crate::backends::camera::Rotation;

/// Rotate a packed frame clockwise, swapping dimensions for 90° and 270°
pub fn rotate_nv21(frame: PackedFrame, rotation: Rotation) -> PackedFrame {
    let PackedFrame {
        width,
        height,
        data,
    } = frame;
    let (w, h) = (width as usize, height as usize);

    match rotation {
        Rotation::None => PackedFrame {
            width,
            height,
            data,
        },
        Rotation::Rotate90 => PackedFrame {
            width: height,
            height: width,
            data: rotate_90(&data, w, h),
        },
        Rotation::Rotate180 => PackedFrame {
            width,
            height,
            data: rotate_180(&data, w, h),
        },
        Rotation::Rotate270 => PackedFrame {
            width: height,
            height: width,
            data: rotate_270(&data, w, h),
        },
    }
}

fn rotate_90(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let y_size = width * height;
    let mut out = Vec::with_capacity(data.len());

    for x in 0..width {
        for y in (0..height).rev() {
            out.push(data[y * width + x]);
        }
    }

    // Chroma rows hold width bytes (width/2 pairs); step over whole pairs
    let chroma = &data[y_size..];
    let chroma_rows = height / 2;
    for x in (0..width).step_by(2) {
        for y in (0..chroma_rows).rev() {
            let pos = y * width + x;
            out.extend_from_slice(&chroma[pos..pos + 2]);
        }
    }
    out
}

fn rotate_180(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let y_size = width * height;
    let mut out = Vec::with_capacity(data.len());

    out.extend(data[..y_size].iter().rev());
    for pair in data[y_size..].chunks_exact(2).rev() {
        out.extend_from_slice(pair);
    }
    out
}

fn rotate_270(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let y_size = width * height;
    let mut out = Vec::with_capacity(data.len());

    for x in (0..width).rev() {
        for y in 0..height {
            out.push(data[y * width + x]);
        }
    }

    let chroma = &data[y_size..];
    let chroma_rows = height / 2;
    for x in (0..width).step_by(2).rev() {
        for y in 0..chroma_rows {
            let pos = y * width + x;
            out.extend_from_slice(&chroma[pos..pos + 2]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(width: u32, height: u32) -> PackedFrame {
        let len = PackedFrame::buffer_len(width, height);
        let data = (0..len).map(|i| (i % 251) as u8).collect();
        PackedFrame::new(width, height, data).unwrap()
    }

    #[test]
    fn test_rotate_90_layout() {
        // Luma 4x2:  0 1 2 3 / 4 5 6 7, chroma row: (8,9) (10,11)
        let frame = numbered(4, 2);
        let rotated = rotate_nv21(frame, Rotation::Rotate90);

        assert_eq!((rotated.width, rotated.height), (2, 4));
        assert_eq!(rotated.luma(), &[4, 0, 5, 1, 6, 2, 7, 3]);
        assert_eq!(rotated.chroma(), &[8, 9, 10, 11]);
    }

    #[test]
    fn test_rotate_180_keeps_pair_order() {
        let frame = numbered(4, 2);
        let rotated = rotate_nv21(frame, Rotation::Rotate180);

        assert_eq!(rotated.luma(), &[7, 6, 5, 4, 3, 2, 1, 0]);
        assert_eq!(rotated.chroma(), &[10, 11, 8, 9]);
    }

    #[test]
    fn test_rotate_270_layout() {
        let frame = numbered(4, 2);
        let rotated = rotate_nv21(frame, Rotation::Rotate270);

        assert_eq!((rotated.width, rotated.height), (2, 4));
        assert_eq!(rotated.luma(), &[3, 7, 2, 6, 1, 5, 0, 4]);
        assert_eq!(rotated.chroma(), &[10, 11, 8, 9]);
    }

    #[test]
    fn test_four_quarter_turns_are_identity() {
        let original = numbered(8, 6);
        let mut frame = original.clone();
        for _ in 0..4 {
            frame = rotate_nv21(frame, Rotation::Rotate90);
        }
        assert_eq!(frame, original);
    }

    #[test]
    fn test_half_turn_twice_is_identity() {
        let original = numbered(6, 4);
        let frame = rotate_nv21(original.clone(), Rotation::Rotate180);
        assert_ne!(frame, original);
        assert_eq!(rotate_nv21(frame, Rotation::Rotate180), original);
    }

    #[test]
    fn test_90_then_270_is_identity() {
        let original = numbered(8, 4);
        let frame = rotate_nv21(original.clone(), Rotation::Rotate90);
        assert_eq!(rotate_nv21(frame, Rotation::Rotate270), original);
    }

    #[test]
    fn test_zero_is_identity() {
        let original = numbered(4, 4);
        assert_eq!(rotate_nv21(original.clone(), Rotation::None), original);
    }
}
