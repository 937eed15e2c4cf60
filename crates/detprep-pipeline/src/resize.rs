//! Fixed-size resizing ahead of the filter chain.
//!
//! Training at a fixed input size is common, so the engine can resize
//! every image to an exact `width x height` before filtering. Aspect
//! ratio is not preserved.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, RgbImage};

/// Resampling filter used when resizing.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Area averaging when shrinking, bilinear when enlarging. Each
    /// output pixel of a downscale is the mean of the source pixels it
    /// covers, so fine texture does not alias.
    #[default]
    Area,
    /// Bilinear interpolation: fast.
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResizeFilter {
    /// The default filter, usable in const contexts.
    pub const DEFAULT: Self = Self::Area;

    /// Convert to the `image` crate's `FilterType`. `Area` has no
    /// counterpart there and maps to its enlarging fallback.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Area | Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Area => f.write_str("Area"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Resize to exactly `target`. Returns a copy when the size already
/// matches.
#[must_use]
pub fn resize(image: &RgbImage, target: Dimensions, filter: ResizeFilter) -> RgbImage {
    let source = Dimensions::of(image);
    if source == target {
        return image.clone();
    }
    if filter == ResizeFilter::Area
        && target.width <= source.width
        && target.height <= source.height
    {
        return image::imageops::thumbnail(image, target.width, target.height);
    }
    image::imageops::resize(
        image,
        target.width,
        target.height,
        filter.to_image_filter(),
    )
}

/// Scale down so the height is at most `max_height`, keeping the aspect
/// ratio. Images already short enough are returned unchanged.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn fit_height(image: &RgbImage, max_height: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if h <= max_height || h == 0 {
        return image.clone();
    }
    let scale = f64::from(max_height) / f64::from(h);
    let width = ((f64::from(w) * scale) as u32).max(1);
    resize(
        image,
        Dimensions {
            width,
            height: max_height,
        },
        ResizeFilter::Area,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb([128, 128, 128]))
    }

    #[test]
    fn default_filter_is_area() {
        assert_eq!(ResizeFilter::default(), ResizeFilter::Area);
        assert_eq!(ResizeFilter::DEFAULT, ResizeFilter::default());
    }

    #[test]
    fn area_downscale_averages_covered_pixels() {
        let checker = RgbImage::from_fn(2, 2, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let one = Dimensions {
            width: 1,
            height: 1,
        };
        let out = resize(&checker, one, ResizeFilter::Area);
        let [r, g, b] = out.get_pixel(0, 0).0;
        assert!((127..=128).contains(&r), "{r}");
        assert_eq!((r, g), (g, b));

        // A four-pixel stripe pattern averages out to flat grey.
        let stripes = RgbImage::from_fn(8, 4, |x, _| image::Rgb([if x % 2 == 0 { 0 } else { 200 }; 3]));
        let half = Dimensions {
            width: 4,
            height: 2,
        };
        let out = resize(&stripes, half, ResizeFilter::Area);
        assert!(out.pixels().all(|p| p.0[0].abs_diff(100) <= 1));
    }

    #[test]
    fn area_upscale_falls_back_to_interpolation() {
        let img = test_image(4, 4);
        let target = Dimensions {
            width: 9,
            height: 6,
        };
        let out = resize(&img, target, ResizeFilter::Area);
        assert_eq!(Dimensions::of(&out), target);
        assert!(out.pixels().all(|p| p.0.iter().all(|&c| c.abs_diff(128) <= 1)));
    }

    #[test]
    fn resize_hits_exact_target() {
        let img = test_image(100, 50);
        let target = Dimensions {
            width: 64,
            height: 64,
        };
        assert_eq!(Dimensions::of(&resize(&img, target, ResizeFilter::Lanczos3)), target);
    }

    #[test]
    fn same_size_is_a_copy() {
        let img = RgbImage::from_fn(8, 8, |x, y| image::Rgb([x as u8, y as u8, 0]));
        let out = resize(&img, Dimensions::of(&img), ResizeFilter::Nearest);
        assert_eq!(out, img);
    }

    #[test]
    fn fit_height_keeps_aspect_ratio() {
        let img = test_image(2000, 1000);
        let out = fit_height(&img, 720);
        assert_eq!(out.dimensions(), (1440, 720));
    }

    #[test]
    fn fit_height_leaves_short_images_alone() {
        let img = test_image(300, 200);
        assert_eq!(fit_height(&img, 720).dimensions(), (300, 200));
    }

    #[test]
    fn display_names() {
        assert_eq!(ResizeFilter::CatmullRom.to_string(), "CatmullRom");
        assert_eq!(ResizeFilter::Area.to_string(), "Area");
    }
}
