//! Unsharp masking.
//!
//! `sharpened = original + amount * (original - blurred)`, computed per
//! channel and clamped to `0..=255`. With a non-zero threshold, pixels
//! whose blur difference (the luminance of `|original - blurred|`) is
//! below the threshold keep their original value, so flat and noisy
//! regions are not amplified.

use crate::blur::gaussian_blur_rgb;
use crate::types::{RgbImage, SharpenParams};

/// Luminance of a per-channel absolute difference, using the
/// ITU-R BT.601 weights.
fn difference_luma(original: [u8; 3], blurred: [u8; 3]) -> f32 {
    let d = |c: usize| f32::from(original[c].abs_diff(blurred[c]));
    0.299f32.mul_add(d(0), 0.587f32.mul_add(d(1), 0.114 * d(2)))
}

/// Sharpen one channel value.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sharpen_value(original: u8, blurred: u8, amount: f32) -> u8 {
    let o = f32::from(original);
    amount
        .mul_add(o - f32::from(blurred), o)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Apply unsharp masking to an RGB image.
///
/// A non-positive sigma makes the blurred copy identical to the input,
/// so the image is returned unchanged.
#[must_use = "returns the sharpened image"]
pub fn unsharp_mask(image: &RgbImage, params: &SharpenParams) -> RgbImage {
    if params.sigma <= 0.0 {
        return image.clone();
    }

    let blurred = gaussian_blur_rgb(image, params.sigma);
    let threshold = f32::from(params.threshold);

    let mut out = image.clone();
    for (pixel, blur) in out.pixels_mut().zip(blurred.pixels()) {
        if params.threshold > 0 && difference_luma(pixel.0, blur.0) < threshold {
            continue;
        }
        let original = pixel.0;
        pixel.0 = std::array::from_fn(|c| sharpen_value(original[c], blur.0[c], params.amount));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_possible_truncation)]
    fn textured_image() -> RgbImage {
        RgbImage::from_fn(32, 32, |x, y| {
            let v = if (x / 8 + y / 8) % 2 == 0 { 60 } else { 190 };
            image::Rgb([v, (v / 2) + (x as u8), 255 - v])
        })
    }

    fn params(threshold: u8) -> SharpenParams {
        SharpenParams {
            sigma: 1.0,
            amount: 1.5,
            threshold,
        }
    }

    #[test]
    fn zero_threshold_sharpens_every_pixel() {
        let img = textured_image();
        let p = params(0);
        let blurred = gaussian_blur_rgb(&img, p.sigma);
        let out = unsharp_mask(&img, &p);

        for ((o, b), s) in img.pixels().zip(blurred.pixels()).zip(out.pixels()) {
            for c in 0..3 {
                assert_eq!(s.0[c], sharpen_value(o.0[c], b.0[c], p.amount));
            }
        }
    }

    #[test]
    fn below_threshold_pixels_are_bit_identical() {
        let img = textured_image();
        let p = params(20);
        let blurred = gaussian_blur_rgb(&img, p.sigma);
        let out = unsharp_mask(&img, &p);

        let mut untouched = 0;
        let mut sharpened = 0;
        for ((o, b), s) in img.pixels().zip(blurred.pixels()).zip(out.pixels()) {
            if difference_luma(o.0, b.0) < 20.0 {
                assert_eq!(s.0, o.0);
                untouched += 1;
            } else {
                for c in 0..3 {
                    assert_eq!(s.0[c], sharpen_value(o.0[c], b.0[c], p.amount));
                }
                sharpened += 1;
            }
        }
        assert!(untouched > 0, "expected flat tile interiors to be skipped");
        assert!(sharpened > 0, "expected tile edges to be sharpened");
    }

    #[test]
    fn sharpening_increases_edge_contrast() {
        let img = RgbImage::from_fn(10, 10, |x, _| {
            if x < 5 {
                image::Rgb([80, 80, 80])
            } else {
                image::Rgb([160, 160, 160])
            }
        });
        let out = unsharp_mask(&img, &params(0));
        assert!(out.get_pixel(4, 5).0[0] < 80, "dark side should get darker");
        assert!(out.get_pixel(5, 5).0[0] > 160, "bright side should get brighter");
    }

    #[test]
    fn uniform_image_stays_near_original() {
        let img = RgbImage::from_pixel(12, 12, image::Rgb([70, 120, 200]));
        let out = unsharp_mask(&img, &params(0));
        for pixel in out.pixels() {
            for (c, expected) in [70i16, 120, 200].into_iter().enumerate() {
                let diff = i16::from(pixel.0[c]) - expected;
                assert!(diff.abs() <= 2, "channel {c}: got {}", pixel.0[c]);
            }
        }
    }

    #[test]
    fn zero_sigma_is_a_no_op() {
        let img = textured_image();
        let p = SharpenParams {
            sigma: 0.0,
            ..params(0)
        };
        assert_eq!(unsharp_mask(&img, &p), img);
    }

    #[test]
    fn saturated_values_clamp() {
        assert_eq!(sharpen_value(250, 100, 2.0), 255);
        assert_eq!(sharpen_value(5, 200, 2.0), 0);
    }
}
