//! Shared types for the detprep filter chain.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resize::ResizeFilter;

/// Re-export `RgbImage` so downstream crates can pass decoded images
/// around without depending on `image` directly.
pub use image::RgbImage;

/// Re-export `GrayImage` for single-channel intermediates (luminance).
pub use image::GrayImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing image.
    #[must_use]
    pub fn of(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One stage of the filter chain.
///
/// The chain always runs stages in the order of [`StageKind::ALL`],
/// whichever subset is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    /// Non-local-means denoising.
    Denoise,
    /// Clipped adaptive histogram equalization on the luminance channel.
    LocalContrast,
    /// Unsharp masking.
    Sharpen,
}

impl StageKind {
    /// Every stage, in chain order.
    pub const ALL: [Self; 3] = [Self::Denoise, Self::LocalContrast, Self::Sharpen];
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Denoise => f.write_str("denoise"),
            Self::LocalContrast => f.write_str("local-contrast"),
            Self::Sharpen => f.write_str("sharpen"),
        }
    }
}

/// Which stages the caller asked for.
///
/// An all-`false` selection is not "run nothing": [`resolve`](Self::resolve)
/// turns it into the tuned default of local contrast plus sharpening,
/// leaving denoising off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSelection {
    /// Run [`StageKind::Denoise`].
    pub denoise: bool,
    /// Run [`StageKind::LocalContrast`].
    pub local_contrast: bool,
    /// Run [`StageKind::Sharpen`].
    pub sharpen: bool,
}

impl StageSelection {
    /// The selection used when nothing was requested explicitly.
    pub const DEFAULT_POLICY: Self = Self {
        denoise: false,
        local_contrast: true,
        sharpen: true,
    };

    /// Apply the default policy to an empty selection.
    #[must_use]
    pub const fn resolve(self) -> Self {
        if self.denoise || self.local_contrast || self.sharpen {
            self
        } else {
            Self::DEFAULT_POLICY
        }
    }

    /// Whether `stage` is selected.
    #[must_use]
    pub const fn contains(self, stage: StageKind) -> bool {
        match stage {
            StageKind::Denoise => self.denoise,
            StageKind::LocalContrast => self.local_contrast,
            StageKind::Sharpen => self.sharpen,
        }
    }
}

/// Non-local-means denoising parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseParams {
    /// Filter strength for the luminance channel. Larger values remove
    /// more noise and more detail.
    pub h: f32,
    /// Filter strength for the two chrominance channels.
    pub h_color: f32,
    /// Side of the square patch compared between pixels. Must be odd.
    pub template_window: u32,
    /// Side of the square neighbourhood searched for similar patches.
    /// Must be odd. Cost grows with its square.
    pub search_window: u32,
}

impl DenoiseParams {
    /// Default luminance strength.
    pub const DEFAULT_H: f32 = 3.0;
    /// Default chrominance strength.
    pub const DEFAULT_H_COLOR: f32 = 3.0;
    /// Default template window.
    pub const DEFAULT_TEMPLATE_WINDOW: u32 = 7;
    /// Default search window.
    pub const DEFAULT_SEARCH_WINDOW: u32 = 21;
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            h: Self::DEFAULT_H,
            h_color: Self::DEFAULT_H_COLOR,
            template_window: Self::DEFAULT_TEMPLATE_WINDOW,
            search_window: Self::DEFAULT_SEARCH_WINDOW,
        }
    }
}

/// Local-contrast (CLAHE) parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastParams {
    /// Histogram clip limit, relative to a flat histogram. Non-positive
    /// values disable clipping (plain adaptive equalization).
    pub clip_limit: f32,
    /// Number of tiles along each axis.
    pub tile_grid: u32,
}

impl ContrastParams {
    /// Default clip limit.
    pub const DEFAULT_CLIP_LIMIT: f32 = 1.8;
    /// Default tile grid size.
    pub const DEFAULT_TILE_GRID: u32 = 8;
}

impl Default for ContrastParams {
    fn default() -> Self {
        Self {
            clip_limit: Self::DEFAULT_CLIP_LIMIT,
            tile_grid: Self::DEFAULT_TILE_GRID,
        }
    }
}

/// Unsharp-mask parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharpenParams {
    /// Gaussian sigma of the blurred copy.
    pub sigma: f32,
    /// How much of `original - blurred` is added back.
    pub amount: f32,
    /// Pixels whose luminance difference from the blur is below this
    /// value are left untouched. Zero sharpens every pixel.
    pub threshold: u8,
}

impl SharpenParams {
    /// Default blur sigma.
    pub const DEFAULT_SIGMA: f32 = 0.8;
    /// Default amount.
    pub const DEFAULT_AMOUNT: f32 = 0.25;
    /// Default threshold.
    pub const DEFAULT_THRESHOLD: u8 = 0;
}

impl Default for SharpenParams {
    fn default() -> Self {
        Self {
            sigma: Self::DEFAULT_SIGMA,
            amount: Self::DEFAULT_AMOUNT,
            threshold: Self::DEFAULT_THRESHOLD,
        }
    }
}

/// Optional fixed-size resize applied before filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeConfig {
    /// Target size. Aspect ratio is not preserved.
    pub dimensions: Dimensions,
    /// Resampling filter.
    #[serde(default)]
    pub filter: ResizeFilter,
}

/// Configuration for the enhancement filter chain.
///
/// Built once by the caller and shared read-only between workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Enabled stages. Always run in [`StageKind::ALL`] order.
    pub stages: StageSelection,
    /// Denoise parameters (used only when denoising is enabled).
    pub denoise: DenoiseParams,
    /// Local-contrast parameters.
    pub contrast: ContrastParams,
    /// Sharpening parameters.
    pub sharpen: SharpenParams,
    /// Resize applied before the chain, if any.
    pub resize: Option<ResizeConfig>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            stages: StageSelection::DEFAULT_POLICY,
            denoise: DenoiseParams::default(),
            contrast: ContrastParams::default(),
            sharpen: SharpenParams::default(),
            resize: None,
        }
    }
}

impl FilterConfig {
    /// Create a configuration with default parameters for the given
    /// selection, applying the default policy to an empty selection.
    #[must_use]
    pub fn with_stages(selection: StageSelection) -> Self {
        Self {
            stages: selection.resolve(),
            ..Self::default()
        }
    }

    /// Enabled stages in chain order, after applying the default policy.
    pub fn enabled_stages(&self) -> impl Iterator<Item = StageKind> {
        let stages = self.stages.resolve();
        StageKind::ALL
            .into_iter()
            .filter(move |stage| stages.contains(*stage))
    }

    /// Check parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first
    /// offending parameter.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfig(msg));
        let stages = self.stages.resolve();

        if stages.denoise {
            let d = &self.denoise;
            if !(d.h.is_finite() && d.h_color.is_finite()) || d.h < 0.0 || d.h_color < 0.0 {
                return invalid(format!(
                    "denoise strengths must be finite and non-negative, got h={} h_color={}",
                    d.h, d.h_color,
                ));
            }
            if d.template_window == 0 || d.template_window % 2 == 0 {
                return invalid(format!(
                    "denoise template window must be odd, got {}",
                    d.template_window,
                ));
            }
            if d.search_window == 0 || d.search_window % 2 == 0 {
                return invalid(format!(
                    "denoise search window must be odd, got {}",
                    d.search_window,
                ));
            }
        }

        if stages.local_contrast {
            if !self.contrast.clip_limit.is_finite() {
                return invalid(format!(
                    "contrast clip limit must be finite, got {}",
                    self.contrast.clip_limit,
                ));
            }
            if self.contrast.tile_grid == 0 {
                return invalid("contrast tile grid must be at least 1".to_owned());
            }
        }

        if stages.sharpen {
            let s = &self.sharpen;
            if !s.sigma.is_finite() || s.sigma < 0.0 {
                return invalid(format!(
                    "sharpen sigma must be finite and non-negative, got {}",
                    s.sigma,
                ));
            }
            if !s.amount.is_finite() {
                return invalid(format!("sharpen amount must be finite, got {}", s.amount));
            }
        }

        if let Some(resize) = self.resize
            && (resize.dimensions.width == 0 || resize.dimensions.height == 0)
        {
            return invalid(format!(
                "resize dimensions must be non-zero, got {}",
                resize.dimensions,
            ));
        }

        Ok(())
    }
}

/// Errors produced by the filter pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[source] image::ImageError),

    /// Failed to encode the output image.
    #[error("failed to encode image: {0}")]
    ImageEncode(#[source] image::ImageError),

    /// No encoder exists for the requested output extension.
    #[error("unsupported output format: {0:?}")]
    UnsupportedFormat(String),

    /// Filter configuration is invalid.
    #[error("invalid filter configuration: {0}")]
    InvalidConfig(String),
}
