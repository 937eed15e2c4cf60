//! Non-local-means denoising.
//!
//! Each output pixel is a weighted average of the pixels in a
//! `search_window` neighbourhood, weighted by how similar the
//! `template_window` patch around each candidate is to the patch around
//! the pixel being denoised:
//!
//! ```text
//! weight = exp(-mean_squared_patch_distance / h^2)
//! ```
//!
//! Patch distances are computed one search offset at a time: the squared
//! difference between the image and its shifted copy is summed into an
//! integral image, after which every patch distance for that offset is a
//! four-lookup box sum. Cost is `O(pixels * search_window^2)` regardless
//! of the template size.
//!
//! Colour images are denoised in L\*a\*b\*: lightness with `h`, the two
//! chrominance planes jointly with `h_color`.

use crate::color::LabPlanes;
use crate::types::{DenoiseParams, RgbImage};

/// Lightness is rescaled to this range before measuring distances so
/// that `h` is expressed in 8-bit intensity steps.
const LIGHTNESS_SCALE: f32 = 255.0 / crate::color::L_MAX;

/// Denoise a colour image.
#[must_use = "returns the denoised image"]
pub fn denoise(image: &RgbImage, params: &DenoiseParams) -> RgbImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || (params.h <= 0.0 && params.h_color <= 0.0) {
        return image.clone();
    }

    let mut lab = LabPlanes::from_rgb(image);

    if params.h > 0.0 {
        let scaled: Vec<f32> = lab.l.iter().map(|v| v * LIGHTNESS_SCALE).collect();
        let [l] = non_local_means(
            [scaled.as_slice()],
            w,
            h,
            params.h,
            params.template_window,
            params.search_window,
        );
        lab.l = l.into_iter().map(|v| v / LIGHTNESS_SCALE).collect();
    }

    if params.h_color > 0.0 {
        let [a, b] = non_local_means(
            [lab.a.as_slice(), lab.b.as_slice()],
            w,
            h,
            params.h_color,
            params.template_window,
            params.search_window,
        );
        lab.a = a;
        lab.b = b;
    }

    lab.to_rgb()
}

/// Non-local means over `C` planes that share patch weights.
///
/// Planes must all be `width * height` long. Window sizes are rounded
/// down to the nearest odd number of at least 1. Out-of-image samples
/// replicate the nearest edge pixel.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn non_local_means<const C: usize>(
    planes: [&[f32]; C],
    width: u32,
    height: u32,
    h: f32,
    template_window: u32,
    search_window: u32,
) -> [Vec<f32>; C] {
    let (w, hgt) = (width as usize, height as usize);
    let n = w * hgt;
    debug_assert!(planes.iter().all(|p| p.len() == n), "plane size mismatch");

    if n == 0 || h <= 0.0 {
        return planes.map(<[f32]>::to_vec);
    }

    let t_radius = (template_window.max(1) / 2) as isize;
    let s_radius = (search_window.max(1) / 2) as isize;
    let inv_h2 = 1.0 / (h * h);

    let clamp_x = |x: isize| x.clamp(0, w as isize - 1) as usize;
    let clamp_y = |y: isize| y.clamp(0, hgt as isize - 1) as usize;

    let mut weight_sum = vec![0f32; n];
    let mut value_sum: [Vec<f32>; C] = std::array::from_fn(|_| vec![0f32; n]);

    // Integral image of the shifted squared difference, (w + 1) x (h + 1).
    let stride = w + 1;
    let mut integral = vec![0f64; stride * (hgt + 1)];

    for dy in -s_radius..=s_radius {
        for dx in -s_radius..=s_radius {
            for y in 0..hgt {
                let sy = clamp_y(y as isize + dy);
                let mut row_sum = 0f64;
                for x in 0..w {
                    let sx = clamp_x(x as isize + dx);
                    let (i, j) = (y * w + x, sy * w + sx);
                    let d2: f32 = planes.iter().map(|p| (p[i] - p[j]).powi(2)).sum();
                    row_sum += f64::from(d2);
                    integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
                }
            }

            for y in 0..hgt {
                let y0 = (y as isize - t_radius).max(0) as usize;
                let y1 = ((y as isize + t_radius) as usize).min(hgt - 1) + 1;
                let sy = clamp_y(y as isize + dy);
                for x in 0..w {
                    let x0 = (x as isize - t_radius).max(0) as usize;
                    let x1 = ((x as isize + t_radius) as usize).min(w - 1) + 1;
                    let box_sum = integral[y1 * stride + x1] - integral[y0 * stride + x1]
                        - integral[y1 * stride + x0]
                        + integral[y0 * stride + x0];
                    let count = ((y1 - y0) * (x1 - x0) * C) as f64;
                    let distance = (box_sum / count).max(0.0) as f32;
                    let weight = (-distance * inv_h2).exp();

                    let i = y * w + x;
                    let j = sy * w + clamp_x(x as isize + dx);
                    weight_sum[i] += weight;
                    for (acc, plane) in value_sum.iter_mut().zip(planes.iter()) {
                        acc[i] += weight * plane[j];
                    }
                }
            }
        }
    }

    value_sum.map(|mut acc| {
        for (v, &wsum) in acc.iter_mut().zip(weight_sum.iter()) {
            *v /= wsum;
        }
        acc
    })
}
