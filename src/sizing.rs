//! Preview and capture size selection.
//!
//! Both selectors walk the candidate list once. The preview policy is a
//! "good enough" convergence toward the target area, not a nearest-distance
//! search: a later candidate only replaces the current best when it moves
//! toward the target from the side the best currently sits on, so the result
//! depends on candidate order and earlier candidates win ties.

use crate::types::{DisplayInfo, Size};

/// Capture target: roughly 1080x1080, big enough for social-media uploads.
pub const TARGET_CAPTURE_AREA: u64 = 1_166_400;

/// Preview target area for a display: a quarter of the screen.
pub fn preview_target_area(display: &DisplayInfo, divisor: u32) -> u64 {
    display.area() / divisor.max(1) as u64
}

pub fn select_preview_size(candidates: &[Size], target_area: u64) -> Option<Size> {
    let mut best: Option<Size> = None;
    for &candidate in candidates {
        let area = candidate.area();
        log::debug!("select_preview_size: candidate {} = {}", candidate, area);
        match best {
            None => best = Some(candidate),
            Some(current) => {
                let best_area = current.area();
                // Shrink while over target, grow while under it.
                if (best_area > target_area && area < best_area)
                    || (best_area < target_area && area > best_area)
                {
                    best = Some(candidate);
                }
            }
        }
    }
    if let Some(size) = best {
        log::debug!("select_preview_size: using {} (target {})", size, target_area);
    }
    best
}

pub fn select_capture_size(candidates: &[Size], target_area: u64) -> Option<Size> {
    let mut best: Option<(Size, u64)> = None;
    for &candidate in candidates {
        let area = candidate.area();
        let delta = area.abs_diff(target_area);
        log::debug!(
            "select_capture_size: candidate {} = {} ({})",
            candidate,
            area,
            delta
        );
        match best {
            None => best = Some((candidate, delta)),
            Some((_, best_delta)) if delta < best_delta && area >= target_area => {
                best = Some((candidate, delta))
            }
            Some(_) => {}
        }
    }
    let size = best.map(|(size, _)| size);
    if let Some(size) = size {
        log::debug!("select_capture_size: using {}", size);
    }
    size
}
