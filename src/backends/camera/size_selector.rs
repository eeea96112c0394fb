// SPDX-License-Identifier: GPL-3.0-only

//! Preview resolution selection

use super::types::Size;
use crate::constants::{
    DEFAULT_PREVIEW_HEIGHT, DEFAULT_PREVIEW_WIDTH, MAX_PREVIEW_AREA, TARGET_ASPECT_RATIO,
};

/// Pick the preview size from the sizes a device supports
///
/// Candidates at or below Full HD are preferred; only when none exist is the
/// full list considered. Among the remaining sizes the one closest to 16:9
/// wins, with larger area breaking ties. An empty list yields 1280x720.
pub fn select_optimal_size(candidates: &[Size]) -> Size {
    if candidates.is_empty() {
        return Size::new(DEFAULT_PREVIEW_WIDTH, DEFAULT_PREVIEW_HEIGHT);
    }

    let capped: Vec<Size> = candidates
        .iter()
        .copied()
        .filter(|s| s.area() <= MAX_PREVIEW_AREA)
        .collect();
    let pool = if capped.is_empty() {
        candidates.to_vec()
    } else {
        capped
    };

    // min_by keeps the first of equal elements, so the result is deterministic
    pool.into_iter()
        .min_by(|a, b| {
            aspect_distance(a)
                .total_cmp(&aspect_distance(b))
                .then_with(|| b.area().cmp(&a.area()))
        })
        .unwrap_or(Size::new(DEFAULT_PREVIEW_WIDTH, DEFAULT_PREVIEW_HEIGHT))
}

/// Largest-area size, used for the still output
pub fn select_largest_size(candidates: &[Size]) -> Option<Size> {
    candidates.iter().copied().max_by_key(Size::area)
}

fn aspect_distance(size: &Size) -> f64 {
    (size.aspect_ratio() - TARGET_ASPECT_RATIO).abs()
}
