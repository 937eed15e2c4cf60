//! sRGB <-> CIE L\*a\*b\* conversion (D65 white point).
//!
//! Local-contrast enhancement and denoising work on a
//! luminance/chrominance split so that equalizing brightness does not
//! shift hues. Channels are kept as `f32` planes between the forward and
//! inverse transform so the chrominance survives unquantized; only the
//! luminance is quantized when a stage needs 8-bit histograms.

use crate::types::RgbImage;

/// Linear sRGB to CIE XYZ (D65), row-major.
const RGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.412_453, 0.357_580, 0.180_423],
    [0.212_671, 0.715_160, 0.072_169],
    [0.019_334, 0.119_193, 0.950_227],
];

/// CIE XYZ (D65) to linear sRGB, row-major.
const XYZ_TO_RGB: [[f32; 3]; 3] = [
    [3.240_479, -1.537_150, -0.498_535],
    [-0.969_256, 1.875_992, 0.041_556],
    [0.055_648, -0.204_043, 1.057_311],
];

/// D65 reference white.
const WHITE_X: f32 = 0.950_456;
const WHITE_Z: f32 = 1.088_754;

/// `(6/29)^3`: below this the cube root is replaced by a linear segment.
const EPSILON: f32 = 0.008_856;
const KAPPA_SLOPE: f32 = 7.787;
const KAPPA_OFFSET: f32 = 16.0 / 116.0;

/// Full-scale L\* value.
pub const L_MAX: f32 = 100.0;

/// An image split into L\*, a\* and b\* planes.
///
/// `l` is in `0.0..=100.0`; `a` and `b` are roughly `-128.0..=127.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabPlanes {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Lightness.
    pub l: Vec<f32>,
    /// Green-red axis.
    pub a: Vec<f32>,
    /// Blue-yellow axis.
    pub b: Vec<f32>,
}

impl LabPlanes {
    /// Convert an 8-bit sRGB image to L\*a\*b\*.
    #[must_use]
    pub fn from_rgb(image: &RgbImage) -> Self {
        let to_linear: [f32; 256] = std::array::from_fn(|i| {
            #[allow(clippy::cast_precision_loss)]
            srgb_to_linear(i as f32 / 255.0)
        });

        let n = image.as_raw().len() / 3;
        let mut l = Vec::with_capacity(n);
        let mut a = Vec::with_capacity(n);
        let mut b = Vec::with_capacity(n);

        for pixel in image.pixels() {
            let rgb = pixel.0.map(|c| to_linear[usize::from(c)]);
            let [x, y, z] = mat_mul(&RGB_TO_XYZ, rgb);
            let fx = lab_f(x / WHITE_X);
            let fy = lab_f(y);
            let fz = lab_f(z / WHITE_Z);
            l.push(116.0f32.mul_add(fy, -16.0).clamp(0.0, L_MAX));
            a.push(500.0 * (fx - fy));
            b.push(200.0 * (fy - fz));
        }

        Self {
            width: image.width(),
            height: image.height(),
            l,
            a,
            b,
        }
    }

    /// Convert back to an 8-bit sRGB image, clamping out-of-gamut values.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_rgb(&self) -> RgbImage {
        let mut out = RgbImage::new(self.width, self.height);
        for (i, pixel) in out.pixels_mut().enumerate() {
            let fy = (self.l[i] + 16.0) / 116.0;
            let fx = fy + self.a[i] / 500.0;
            let fz = fy - self.b[i] / 200.0;
            let xyz = [
                lab_f_inv(fx) * WHITE_X,
                lab_f_inv(fy),
                lab_f_inv(fz) * WHITE_Z,
            ];
            let rgb = mat_mul(&XYZ_TO_RGB, xyz);
            pixel.0 = rgb.map(|c| {
                (linear_to_srgb(c.clamp(0.0, 1.0)) * 255.0)
                    .round()
                    .clamp(0.0, 255.0) as u8
            });
        }
        out
    }
}

/// Quantize an L\* plane to `0..=255`, as 8-bit equalization expects.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantize_lightness(l: &[f32]) -> Vec<u8> {
    l.iter()
        .map(|&v| (v * 255.0 / L_MAX).round().clamp(0.0, 255.0) as u8)
        .collect()
}

/// Inverse of [`quantize_lightness`].
#[must_use]
pub fn dequantize_lightness(l: &[u8]) -> Vec<f32> {
    l.iter().map(|&v| f32::from(v) * L_MAX / 255.0).collect()
}

fn mat_mul(m: &[[f32; 3]; 3], v: [f32; 3]) -> [f32; 3] {
    std::array::from_fn(|row| {
        m[row][0].mul_add(v[0], m[row][1].mul_add(v[1], m[row][2] * v[2]))
    })
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.040_45 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055f32.mul_add(c.powf(1.0 / 2.4), -0.055)
    }
}

fn lab_f(t: f32) -> f32 {
    if t > EPSILON {
        t.cbrt()
    } else {
        KAPPA_SLOPE.mul_add(t, KAPPA_OFFSET)
    }
}

fn lab_f_inv(f: f32) -> f32 {
    let cube = f * f * f;
    if cube > EPSILON {
        cube
    } else {
        (f - KAPPA_OFFSET) / KAPPA_SLOPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_possible_truncation)]
    fn gradient_image() -> RgbImage {
        RgbImage::from_fn(16, 16, |x, y| {
            image::Rgb([(x * 16) as u8, (y * 16) as u8, ((x + y) * 8) as u8])
        })
    }

    #[test]
    fn round_trip_is_within_one_level() {
        let img = gradient_image();
        let back = LabPlanes::from_rgb(&img).to_rgb();
        for (orig, out) in img.pixels().zip(back.pixels()) {
            for c in 0..3 {
                let diff = i16::from(orig.0[c]) - i16::from(out.0[c]);
                assert!(
                    diff.abs() <= 1,
                    "channel {c}: {:?} became {:?}",
                    orig.0,
                    out.0,
                );
            }
        }
    }

    #[test]
    fn white_and_black_hit_lightness_extremes() {
        let img = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let lab = LabPlanes::from_rgb(&img);
        assert!(lab.l[0].abs() < 0.01, "black L = {}", lab.l[0]);
        assert!((lab.l[1] - 100.0).abs() < 0.05, "white L = {}", lab.l[1]);
    }

    #[test]
    fn gray_has_neutral_chrominance() {
        let img = RgbImage::from_pixel(1, 1, image::Rgb([128, 128, 128]));
        let lab = LabPlanes::from_rgb(&img);
        assert!(lab.a[0].abs() < 0.05, "a = {}", lab.a[0]);
        assert!(lab.b[0].abs() < 0.05, "b = {}", lab.b[0]);
    }

    #[test]
    fn lightness_quantization_round_trips() {
        let levels: Vec<u8> = (0..=255).collect();
        let back = quantize_lightness(&dequantize_lightness(&levels));
        assert_eq!(levels, back);
    }
}
