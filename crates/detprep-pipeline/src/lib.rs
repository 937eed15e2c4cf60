//! detprep-pipeline: Pure image enhancement filters (sans-IO).
//!
//! Prepares detection training images through:
//! decode -> optional resize -> denoise -> local contrast -> sharpen.
//! Every stage is optional, but enabled stages always run in that order.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and images. Filesystem traversal, label handling and
//! worker threads live in `detprep-dataset`.

pub mod blur;
pub mod chain;
pub mod codec;
pub mod color;
pub mod compare;
pub mod contrast;
pub mod denoise;
pub mod resize;
pub mod sharpen;
pub mod types;

pub use chain::{Filter, FilterChain};
pub use codec::{OutputFormat, decode_rgb, encode_rgb};
pub use resize::ResizeFilter;
pub use types::{
    ContrastParams, DenoiseParams, Dimensions, FilterConfig, PipelineError, ResizeConfig,
    RgbImage, SharpenParams, StageKind, StageSelection,
};

/// A decoded input image together with its filtered counterpart.
#[derive(Debug, Clone)]
pub struct Enhanced {
    /// The decoded source image.
    pub original: RgbImage,
    /// The output of the filter.
    pub enhanced: RgbImage,
}

/// Decode image bytes and run them through `filter`.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `image_bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image cannot be decoded.
pub fn process(image_bytes: &[u8], filter: &dyn Filter) -> Result<Enhanced, PipelineError> {
    let original = decode_rgb(image_bytes)?;
    let enhanced = filter.apply(&original);
    Ok(Enhanced { original, enhanced })
}
