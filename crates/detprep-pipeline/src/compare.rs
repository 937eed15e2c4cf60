//! Side-by-side comparison images for manual QA.
//!
//! Original on the left, enhanced on the right. Both halves are scaled
//! down to at most [`DEFAULT_MAX_HEIGHT`] pixels tall and cropped to the
//! shorter of the two so that the rows line up.

use image::imageops::replace;

use crate::resize::fit_height;
use crate::types::RgbImage;

/// Default height cap for each half of the comparison.
pub const DEFAULT_MAX_HEIGHT: u32 = 720;

/// Build a side-by-side comparison of `original` and `enhanced`.
#[must_use]
pub fn side_by_side(original: &RgbImage, enhanced: &RgbImage, max_height: u32) -> RgbImage {
    let left = fit_height(original, max_height);
    let right = fit_height(enhanced, max_height);
    let height = left.height().min(right.height());
    let width = left.width() + right.width();

    // Rows below `height` fall outside `out` and are clipped by `replace`.
    let mut out = RgbImage::new(width, height);
    replace(&mut out, &left, 0, 0);
    replace(&mut out, &right, i64::from(left.width()), 0);
    out
}
