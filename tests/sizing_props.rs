//! Property-Based Tests for size negotiation and orientation correction
//!
//! These tests verify invariants of the pure selection and geometry code
//! using proptest for input generation and shrinking.

use camfeed::geometry::resolve;
use camfeed::sizing::{select_capture_size, select_preview_size, TARGET_CAPTURE_AREA};
use camfeed::{Facing, Rotation, Size};
use image::{Rgb, RgbImage};
use proptest::prelude::*;

fn size_strategy() -> impl Strategy<Value = Size> {
    (1u32..4000, 1u32..3000).prop_map(|(w, h)| Size::new(w, h))
}

fn facing_strategy() -> impl Strategy<Value = Facing> {
    prop_oneof![Just(Facing::Front), Just(Facing::Back)]
}

fn rotation_strategy() -> impl Strategy<Value = Rotation> {
    prop_oneof![
        Just(Rotation::Deg0),
        Just(Rotation::Deg90),
        Just(Rotation::Deg180),
        Just(Rotation::Deg270),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
// SIZE SELECTION INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: Preview selection only ever returns one of the candidates
    #[test]
    fn preview_never_invents_sizes(
        candidates in prop::collection::vec(size_strategy(), 0..12),
        target in 1u64..8_000_000,
    ) {
        match select_preview_size(&candidates, target) {
            Some(size) => prop_assert!(candidates.contains(&size)),
            None => prop_assert!(candidates.is_empty()),
        }
    }

    /// INVARIANT: A leading exact match is never replaced
    #[test]
    fn preview_keeps_leading_exact_match(
        first in size_strategy(),
        rest in prop::collection::vec(size_strategy(), 0..12),
    ) {
        let mut candidates = vec![first];
        candidates.extend(rest);
        prop_assert_eq!(select_preview_size(&candidates, first.area()), Some(first));
    }

    /// INVARIANT: With every candidate on one side of the target, the walk
    /// ends on the candidate closest to it (earliest on ties)
    #[test]
    fn preview_one_sided_candidates_converge(
        candidates in prop::collection::vec(size_strategy(), 1..12),
        target in 1u64..8_000_000,
    ) {
        let chosen = select_preview_size(&candidates, target).unwrap();
        let areas: Vec<u64> = candidates.iter().map(Size::area).collect();
        if areas.iter().all(|&a| a > target) {
            let min = *areas.iter().min().unwrap();
            let first_min = candidates[areas.iter().position(|&a| a == min).unwrap()];
            prop_assert_eq!(chosen, first_min);
        }
        if areas.iter().all(|&a| a < target) {
            let max = *areas.iter().max().unwrap();
            let first_max = candidates[areas.iter().position(|&a| a == max).unwrap()];
            prop_assert_eq!(chosen, first_max);
        }
    }

    /// INVARIANT: Capture selection only ever returns a candidate, and
    /// anything other than the first candidate is at or above the target
    #[test]
    fn capture_replacements_stay_at_or_above_target(
        candidates in prop::collection::vec(size_strategy(), 1..12),
        target in 1u64..8_000_000,
    ) {
        let chosen = select_capture_size(&candidates, target).unwrap();
        prop_assert!(candidates.contains(&chosen));
        if chosen != candidates[0] {
            prop_assert!(chosen.area() >= target);
        }
    }

    /// INVARIANT: A first candidate at or above target is only replaced by
    /// one that is closer and still at or above target
    #[test]
    fn capture_never_drops_below_target_from_above(
        first in size_strategy(),
        rest in prop::collection::vec(size_strategy(), 0..12),
    ) {
        prop_assume!(first.area() >= TARGET_CAPTURE_AREA);
        let mut candidates = vec![first];
        candidates.extend(rest);
        let chosen = select_capture_size(&candidates, TARGET_CAPTURE_AREA).unwrap();
        prop_assert!(chosen.area() >= TARGET_CAPTURE_AREA);
        prop_assert!(chosen.area() <= first.area());
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// ORIENTATION INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// INVARIANT: Only quarter turns of 90 or 270 swap dimensions, and only
    /// front sensors on an unrotated display are mirrored
    #[test]
    fn transform_shape_follows_rotation(
        facing in facing_strategy(),
        mount in rotation_strategy(),
        display in rotation_strategy(),
        half_w in 1u32..1000,
        half_h in 1u32..1000,
    ) {
        let preview = Size::new(half_w * 2, half_h * 2);
        let t = resolve(facing, mount, display, preview);
        let swapped = matches!(t.rotation(), Rotation::Deg90 | Rotation::Deg270);
        prop_assert_eq!(t.dimensions_swapped(), swapped);
        prop_assert_eq!(
            t.output_size(),
            if swapped { preview.swapped() } else { preview }
        );
        prop_assert_eq!(t.is_flipped(), facing == Facing::Front && display == Rotation::Deg0);
    }

    /// INVARIANT: The matrix maps the preview rectangle exactly onto the
    /// corrected rectangle
    #[test]
    fn matrix_maps_corners_onto_output(
        facing in facing_strategy(),
        mount in rotation_strategy(),
        display in rotation_strategy(),
        half_w in 1u32..1000,
        half_h in 1u32..1000,
    ) {
        let preview = Size::new(half_w * 2, half_h * 2);
        let t = resolve(facing, mount, display, preview);
        let out = t.output_size();
        let (w, h) = (preview.width as f64, preview.height as f64);
        for (x, y) in [(0.0, 0.0), (w, 0.0), (0.0, h), (w, h)] {
            let (mx, my) = t.matrix().map(x, y);
            prop_assert!(mx == 0.0 || mx == out.width as f64, "x {} for {:?}", mx, (x, y));
            prop_assert!(my == 0.0 || my == out.height as f64, "y {} for {:?}", my, (x, y));
        }
    }

    /// INVARIANT: Drawing through the matrix and re-orienting a whole image
    /// give the same pixels
    #[test]
    fn draw_into_agrees_with_apply_to_new(
        facing in facing_strategy(),
        mount in rotation_strategy(),
        display in rotation_strategy(),
        half_w in 1u32..8,
        half_h in 1u32..8,
    ) {
        let preview = Size::new(half_w * 2, half_h * 2);
        let src = RgbImage::from_fn(preview.width, preview.height, |x, y| {
            Rgb([x as u8, y as u8, (x * 31 + y * 7) as u8])
        });
        let t = resolve(facing, mount, display, preview);
        let out = t.output_size();
        let mut drawn = RgbImage::new(out.width, out.height);
        t.draw_into(&src, &mut drawn);
        prop_assert_eq!(drawn, t.apply_to_new(&src));
    }
}
