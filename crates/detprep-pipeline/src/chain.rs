//! The enhancement filter chain.
//!
//! This module defines the [`Filter`] trait, the seam the enhancement
//! engine calls through, and [`FilterChain`], the production filter that
//! runs the optional resize followed by the enabled stages in fixed
//! order.
//!
//! Filters take `&self` and allocate their working buffers per call, so
//! one instance is shared by every worker thread.

use crate::contrast::enhance_local_contrast;
use crate::denoise::denoise;
use crate::resize::resize;
use crate::sharpen::unsharp_mask;
use crate::types::{FilterConfig, PipelineError, RgbImage, StageKind};

/// A pure image-to-image transformation.
pub trait Filter: Send + Sync {
    /// Transform `image`, returning a new image.
    fn apply(&self, image: &RgbImage) -> RgbImage;
}

/// Resize plus denoise, local contrast and sharpen, as configured.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    config: FilterConfig,
}

impl FilterChain {
    /// Build a chain from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if a parameter of an
    /// enabled stage is out of range.
    pub fn new(config: FilterConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration this chain was built from.
    #[must_use]
    pub const fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Stages that will run, in order.
    #[must_use]
    pub fn stages(&self) -> Vec<StageKind> {
        self.config.enabled_stages().collect()
    }

    fn run_stage(&self, stage: StageKind, image: &RgbImage) -> RgbImage {
        match stage {
            StageKind::Denoise => denoise(image, &self.config.denoise),
            StageKind::LocalContrast => enhance_local_contrast(image, &self.config.contrast),
            StageKind::Sharpen => unsharp_mask(image, &self.config.sharpen),
        }
    }
}

impl Filter for FilterChain {
    fn apply(&self, image: &RgbImage) -> RgbImage {
        let mut current = match self.config.resize {
            Some(r) => resize(image, r.dimensions, r.filter),
            None => image.clone(),
        };
        for stage in self.config.enabled_stages() {
            current = self.run_stage(stage, &current);
        }
        current
    }
}
