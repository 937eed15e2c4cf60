//! Decoding input bytes and encoding output images.
//!
//! The enhancement engine reads whole files into memory and hands the
//! bytes here; encoding likewise produces an in-memory buffer so the
//! caller can write it atomically.

use std::io::Cursor;

use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;

use crate::types::{PipelineError, RgbImage};

/// Default JPEG quality for enhanced training images.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// JPEG quality used for QA comparison images.
pub const COMPARE_JPEG_QUALITY: u8 = 92;

/// Decode raw image bytes into 8-bit RGB.
///
/// Supports whatever the enabled `image` codecs can decode (PNG, JPEG,
/// BMP, TIFF, WebP). Alpha is dropped and 16-bit data is reduced.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the format is unrecognized
/// or the data is corrupt.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes).map_err(PipelineError::ImageDecode)?;
    Ok(img.to_rgb8())
}

/// Output container, chosen from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Lossy JPEG at the given quality (1-100).
    Jpeg {
        /// Encoder quality.
        quality: u8,
    },
    /// Any lossless format the `image` crate writes directly.
    Lossless(image::ImageFormat),
}

impl OutputFormat {
    /// Pick a format for `extension` (with or without the leading dot,
    /// any case).
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedFormat`] for extensions with
    /// no enabled encoder.
    pub fn from_extension(extension: &str, jpeg_quality: u8) -> Result<Self, PipelineError> {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpeg {
                quality: jpeg_quality.clamp(1, 100),
            }),
            "png" => Ok(Self::Lossless(image::ImageFormat::Png)),
            "bmp" => Ok(Self::Lossless(image::ImageFormat::Bmp)),
            "tif" | "tiff" => Ok(Self::Lossless(image::ImageFormat::Tiff)),
            "webp" => Ok(Self::Lossless(image::ImageFormat::WebP)),
            _ => Err(PipelineError::UnsupportedFormat(extension.to_owned())),
        }
    }
}

/// Encode an RGB image into an in-memory buffer.
///
/// # Errors
///
/// Returns [`PipelineError::ImageEncode`] if the encoder rejects the
/// image (for example a zero-sized one).
pub fn encode_rgb(image: &RgbImage, format: OutputFormat) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg { quality } => {
            JpegEncoder::new_with_quality(&mut buf, quality)
                .write_image(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    image::ExtendedColorType::Rgb8,
                )
                .map_err(PipelineError::ImageEncode)?;
        }
        OutputFormat::Lossless(fmt) => {
            image
                .write_to(&mut Cursor::new(&mut buf), fmt)
                .map_err(PipelineError::ImageEncode)?;
        }
    }
    Ok(buf)
}
