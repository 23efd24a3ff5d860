//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Calculate the dimensions of `source` shrunk to fit inside `bounds`.
///
/// The aspect ratio is preserved and the image is never enlarged: a source
/// that already fits is returned unchanged. Neither output edge drops below 1.
///
/// # Examples
/// ```
/// # use batch_convert::imaging::fit_within;
/// // Landscape limited by width
/// assert_eq!(fit_within((4000, 3000), (800, 800)), (800, 600));
///
/// // Portrait limited by height
/// assert_eq!(fit_within((3000, 4000), (800, 800)), (600, 800));
///
/// // Already small enough
/// assert_eq!(fit_within((640, 480), (800, 800)), (640, 480));
/// ```
pub fn fit_within(source: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (max_w, max_h) = bounds;

    if src_w <= max_w && src_h <= max_h {
        return source;
    }

    let scale_w = max_w as f64 / src_w as f64;
    let scale_h = max_h as f64 / src_h as f64;
    let scale = scale_w.min(scale_h);

    let w = ((src_w as f64 * scale).round() as u32).clamp(1, max_w.max(1));
    let h = ((src_h as f64 * scale).round() as u32).clamp(1, max_h.max(1));
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_limited_by_width() {
        assert_eq!(fit_within((1600, 900), (800, 800)), (800, 450));
    }

    #[test]
    fn portrait_limited_by_height() {
        assert_eq!(fit_within((900, 1600), (800, 800)), (450, 800));
    }

    #[test]
    fn non_square_bounds_pick_tighter_axis() {
        // width scale 0.5, height scale 0.25 -> height wins
        assert_eq!(fit_within((1000, 1000), (500, 250)), (250, 250));
    }

    #[test]
    fn never_upscales() {
        assert_eq!(fit_within((100, 50), (800, 600)), (100, 50));
    }

    #[test]
    fn exact_fit_is_unchanged() {
        assert_eq!(fit_within((800, 600), (800, 600)), (800, 600));
    }

    #[test]
    fn extreme_ratio_keeps_at_least_one_pixel() {
        assert_eq!(fit_within((10000, 1), (100, 100)), (100, 1));
    }
}
