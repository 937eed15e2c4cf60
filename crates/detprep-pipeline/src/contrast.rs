//! Local-contrast enhancement: clipped adaptive histogram equalization
//! (CLAHE) applied to the luminance channel only.
//!
//! The image is divided into a `tile_grid x tile_grid` grid. Each tile
//! gets its own equalization lookup table built from a clipped
//! histogram; the clipped excess is spread evenly over all bins so that
//! no single intensity can be stretched more than the clip limit allows.
//! Every output pixel bilinearly interpolates the lookup tables of the
//! four nearest tile centres, which hides the tile seams.
//!
//! [`enhance_local_contrast`] runs this on L\* of an L\*a\*b\* split and
//! converts back, so colour balance is preserved.

use crate::color::{LabPlanes, dequantize_lightness, quantize_lightness};
use crate::types::{ContrastParams, GrayImage, RgbImage};

const BINS: usize = 256;

/// Equalize the luminance of a colour image.
#[must_use = "returns the enhanced image"]
pub fn enhance_local_contrast(image: &RgbImage, params: &ContrastParams) -> RgbImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }

    let mut lab = LabPlanes::from_rgb(image);
    let lightness = quantize_lightness(&lab.l);
    let equalized = clahe_plane(
        &lightness,
        image.width(),
        image.height(),
        params.clip_limit,
        params.tile_grid,
    );
    lab.l = dequantize_lightness(&equalized);
    lab.to_rgb()
}

/// CLAHE on a single-channel image.
#[must_use = "returns the equalized image"]
pub fn clahe(image: &GrayImage, params: &ContrastParams) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let out = clahe_plane(image.as_raw(), w, h, params.clip_limit, params.tile_grid);
    GrayImage::from_raw(w, h, out).unwrap_or_else(|| image.clone())
}

/// Tile layout along one axis.
///
/// Tile `i` covers `bounds[i]..bounds[i + 1]`. Bounds are spread with
/// integer division so that no tile is empty as long as there are no
/// more tiles than pixels.
struct Axis {
    bounds: Vec<usize>,
}

impl Axis {
    fn new(len: usize, requested_tiles: u32) -> Self {
        let tiles = (requested_tiles.max(1) as usize).min(len);
        let bounds = (0..=tiles).map(|i| i * len / tiles).collect();
        Self { bounds }
    }

    const fn tiles(&self) -> usize {
        self.bounds.len() - 1
    }

    #[allow(clippy::cast_precision_loss)]
    fn center(&self, tile: usize) -> f32 {
        (self.bounds[tile] + self.bounds[tile + 1] - 1) as f32 / 2.0
    }

    /// For every coordinate, the two neighbouring tiles and the weight of
    /// the second one.
    #[allow(clippy::cast_precision_loss)]
    fn interpolation(&self, len: usize) -> Vec<(usize, usize, f32)> {
        let last = self.tiles() - 1;
        let mut left = 0;
        (0..len)
            .map(|pos| {
                let p = pos as f32;
                if p <= self.center(0) {
                    return (0, 0, 0.0);
                }
                if p >= self.center(last) {
                    return (last, last, 0.0);
                }
                while p >= self.center(left + 1) {
                    left += 1;
                }
                let c0 = self.center(left);
                let c1 = self.center(left + 1);
                (left, left + 1, (p - c0) / (c1 - c0))
            })
            .collect()
    }
}

/// Build the equalization lookup table of one tile.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn tile_lut(hist: &mut [usize; BINS], area: usize, clip_limit: f32) -> [u8; BINS] {
    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f32 / BINS as f32) as usize).max(1);

        let mut excess = 0;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }

        let batch = excess / BINS;
        let residual = excess - batch * BINS;
        for bin in hist.iter_mut() {
            *bin += batch;
        }
        if residual > 0 {
            let step = (BINS / residual).max(1);
            for bin in hist.iter_mut().step_by(step).take(residual) {
                *bin += 1;
            }
        }
    }

    let scale = 255.0 / area as f32;
    let mut lut = [0u8; BINS];
    let mut cumulative = 0;
    for (entry, &count) in lut.iter_mut().zip(hist.iter()) {
        cumulative += count;
        *entry = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// CLAHE over a raw `width x height` luminance plane.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn clahe_plane(
    plane: &[u8],
    width: u32,
    height: u32,
    clip_limit: f32,
    tile_grid: u32,
) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    debug_assert_eq!(plane.len(), w * h, "plane size mismatch");

    let x_axis = Axis::new(w, tile_grid);
    let y_axis = Axis::new(h, tile_grid);
    let (tiles_x, tiles_y) = (x_axis.tiles(), y_axis.tiles());

    let mut luts = Vec::with_capacity(tiles_x * tiles_y);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = [0usize; BINS];
            let (x0, x1) = (x_axis.bounds[tx], x_axis.bounds[tx + 1]);
            let (y0, y1) = (y_axis.bounds[ty], y_axis.bounds[ty + 1]);
            for y in y0..y1 {
                for &v in &plane[y * w + x0..y * w + x1] {
                    hist[usize::from(v)] += 1;
                }
            }
            let area = (x1 - x0) * (y1 - y0);
            luts.push(tile_lut(&mut hist, area, clip_limit));
        }
    }

    let xs = x_axis.interpolation(w);
    let ys = y_axis.interpolation(h);

    let mut out = vec![0u8; w * h];
    for (y, &(ty0, ty1, wy)) in ys.iter().enumerate() {
        let top = &luts[ty0 * tiles_x..(ty0 + 1) * tiles_x];
        let bottom = &luts[ty1 * tiles_x..(ty1 + 1) * tiles_x];
        for (x, &(tx0, tx1, wx)) in xs.iter().enumerate() {
            let v = usize::from(plane[y * w + x]);
            let upper = f32::from(top[tx0][v]).mul_add(1.0 - wx, f32::from(top[tx1][v]) * wx);
            let lower =
                f32::from(bottom[tx0][v]).mul_add(1.0 - wx, f32::from(bottom[tx1][v]) * wx);
            let value = upper.mul_add(1.0 - wy, lower * wy);
            out[y * w + x] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}
