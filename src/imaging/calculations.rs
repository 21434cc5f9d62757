//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Dimensions after an aspect-preserving resize that fits inside `bounds`.
///
/// Never upscales: an image already inside the box keeps its size. Each
/// output dimension is at least 1px.
///
/// # Examples
/// ```
/// # use img_convert::imaging::fit_inside;
/// // 2000x1500 inside a 1000px box → 1000x750
/// assert_eq!(fit_inside((2000, 1500), (1000, 1000)), (1000, 750));
///
/// // portrait 1500x2000 inside a 1000px box → 750x1000
/// assert_eq!(fit_inside((1500, 2000), (1000, 1000)), (750, 1000));
/// ```
pub fn fit_inside(original: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (orig_w, orig_h) = original;
    let (max_w, max_h) = bounds;

    if orig_w == 0 || orig_h == 0 || (orig_w <= max_w && orig_h <= max_h) {
        return original;
    }

    let ratio = f64::min(max_w as f64 / orig_w as f64, max_h as f64 / orig_h as f64);
    let w = ((orig_w as f64 * ratio).round() as u32).max(1);
    let h = ((orig_h as f64 * ratio).round() as u32).max(1);
    (w.min(max_w.max(1)), h.min(max_h.max(1)))
}

/// Whether a breakpoint yields a variant smaller than the original.
///
/// True when the threshold is strictly below the original width *or* height;
/// otherwise the variant would be the original size or larger.
pub fn breakpoint_smaller_than(breakpoint: u32, original: (u32, u32)) -> bool {
    let (width, height) = original;
    breakpoint < width || breakpoint < height
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // fit_inside tests
    // =========================================================================

    #[test]
    fn fit_landscape_into_square_box() {
        assert_eq!(fit_inside((2000, 1500), (1000, 1000)), (1000, 750));
    }

    #[test]
    fn fit_portrait_into_square_box() {
        assert_eq!(fit_inside((1500, 2000), (750, 750)), (563, 750));
    }

    #[test]
    fn fit_never_upscales() {
        assert_eq!(fit_inside((400, 300), (1000, 1000)), (400, 300));
    }

    #[test]
    fn fit_exact_match_is_unchanged() {
        assert_eq!(fit_inside((500, 500), (500, 500)), (500, 500));
    }

    #[test]
    fn fit_only_one_side_over() {
        // 1200x400 in a 1000 box: width bounds it
        assert_eq!(fit_inside((1200, 400), (1000, 1000)), (1000, 333));
    }

    #[test]
    fn fit_extreme_aspect_keeps_one_pixel() {
        assert_eq!(fit_inside((10000, 2), (100, 100)), (100, 1));
    }

    // =========================================================================
    // breakpoint_smaller_than tests
    // =========================================================================

    #[test]
    fn breakpoint_below_width() {
        assert!(breakpoint_smaller_than(1000, (2000, 500)));
    }

    #[test]
    fn breakpoint_below_height_only() {
        assert!(breakpoint_smaller_than(750, (600, 800)));
    }

    #[test]
    fn breakpoint_equal_to_both_is_not_smaller() {
        assert!(!breakpoint_smaller_than(500, (500, 500)));
    }

    #[test]
    fn breakpoint_above_both_is_not_smaller() {
        assert!(!breakpoint_smaller_than(1000, (800, 600)));
    }

    #[test]
    fn predicate_matches_definition_over_grid() {
        for t in [0u32, 1, 499, 500, 501, 1000] {
            for w in [0u32, 1, 500, 999, 1000, 1001] {
                for h in [0u32, 1, 500, 1000, 2000] {
                    assert_eq!(breakpoint_smaller_than(t, (w, h)), t < w || t < h);
                }
            }
        }
    }
}
