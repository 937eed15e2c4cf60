//! The enhancement engine: one record in, one outcome out.
//!
//! For each record the engine reads the image, runs the filter, writes
//! the result atomically under the same stem, optionally writes a QA
//! comparison, and copies the label file byte-for-byte. Every record
//! yields exactly one [`Outcome`]; per-item failures are reported, never
//! raised.

use std::fs;
use std::path::{Path, PathBuf};

use detprep_pipeline::codec::{COMPARE_JPEG_QUALITY, DEFAULT_JPEG_QUALITY};
use detprep_pipeline::compare::{DEFAULT_MAX_HEIGHT, side_by_side};
use detprep_pipeline::{Filter, OutputFormat, encode_rgb};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::atomic::{copy_atomic, write_atomic};
use crate::error::{ItemError, SetupError};
use crate::record::{ImageRecord, label_path};

/// Extension used when neither the options nor the source name one.
const FALLBACK_EXTENSION: &str = "jpg";

/// Suffix appended to the stem of comparison images.
pub const COMPARE_SUFFIX: &str = "_compare";

/// Output behaviour of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceOptions {
    /// Force this output extension. `None` keeps the source extension.
    pub output_ext: Option<String>,
    /// JPEG quality for enhanced images.
    pub jpeg_quality: u8,
    /// Also write a side-by-side original/enhanced image.
    pub save_compare: bool,
    /// Do everything except touch the filesystem.
    pub dry_run: bool,
}

impl Default for EnhanceOptions {
    fn default() -> Self {
        Self {
            output_ext: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            save_compare: false,
            dry_run: false,
        }
    }
}

/// Where the engine writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDirs {
    /// Enhanced images.
    pub images: PathBuf,
    /// Copied labels.
    pub labels: PathBuf,
    /// Comparison images. Kept out of `images` so they never reach a
    /// training split.
    pub compare: PathBuf,
}

impl OutputDirs {
    /// Output directories with the comparison directory placed next to
    /// `images` as `compare/`.
    #[must_use]
    pub fn new(images: PathBuf, labels: PathBuf) -> Self {
        let compare = images
            .parent()
            .map_or_else(|| PathBuf::from("compare"), |p| p.join("compare"));
        Self {
            images,
            labels,
            compare,
        }
    }
}

/// Classification of one record.
#[derive(Debug)]
pub enum Outcome {
    /// Image written and label copied.
    Processed,
    /// Image written; the record had no label file. Still counts as
    /// processed.
    LabelMissing,
    /// The image could not be read or decoded. Nothing was written.
    ReadFailed(ItemError),
    /// The output could not be encoded or written. Nothing was left at
    /// the output path.
    WriteFailed(ItemError),
}

impl Outcome {
    /// Whether the image made it to the output.
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        matches!(self, Self::Processed | Self::LabelMissing)
    }

    /// Short name used in log lines.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::LabelMissing => "label missing",
            Self::ReadFailed(_) => "read failed",
            Self::WriteFailed(_) => "write failed",
        }
    }
}

/// The result of enhancing one record.
#[derive(Debug)]
pub struct EnhancementResult {
    /// The record's stem.
    pub stem: String,
    /// The input image.
    pub source: PathBuf,
    /// What happened.
    pub outcome: Outcome,
    /// Output image path, when the image was (or in a dry run would have
    /// been) written.
    pub image: Option<PathBuf>,
    /// Output label path, when a label was copied.
    pub label: Option<PathBuf>,
    /// Comparison image path, when one was written.
    pub compare: Option<PathBuf>,
}

impl EnhancementResult {
    fn failed(record: &ImageRecord, outcome: Outcome) -> Self {
        Self {
            stem: record.stem.clone(),
            source: record.image.clone(),
            outcome,
            image: None,
            label: None,
            compare: None,
        }
    }
}

/// Applies a filter to records and writes the results.
///
/// Holds only shared references and immutable settings, so one engine
/// serves every worker.
pub struct Enhancer<'f> {
    filter: &'f dyn Filter,
    dirs: OutputDirs,
    options: EnhanceOptions,
}

impl<'f> Enhancer<'f> {
    /// Create an engine writing into `dirs`.
    #[must_use]
    pub fn new(filter: &'f dyn Filter, dirs: OutputDirs, options: EnhanceOptions) -> Self {
        Self {
            filter,
            dirs,
            options,
        }
    }

    /// Output directories.
    #[must_use]
    pub const fn dirs(&self) -> &OutputDirs {
        &self.dirs
    }

    /// Engine options.
    #[must_use]
    pub const fn options(&self) -> &EnhanceOptions {
        &self.options
    }

    /// Create the output directories. Does nothing in a dry run.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Io`] for the first directory that could not
    /// be created.
    pub fn prepare(&self) -> Result<(), SetupError> {
        if self.options.dry_run {
            return Ok(());
        }
        let mut dirs = vec![&self.dirs.images, &self.dirs.labels];
        if self.options.save_compare {
            dirs.push(&self.dirs.compare);
        }
        for dir in dirs {
            fs::create_dir_all(dir).map_err(|source| SetupError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn output_extension<'r>(&'r self, record: &'r ImageRecord) -> &'r str {
        self.options
            .output_ext
            .as_deref()
            .map(|e| e.trim_start_matches('.'))
            .or_else(|| record.extension())
            .unwrap_or(FALLBACK_EXTENSION)
    }

    /// Enhance one record.
    #[must_use]
    pub fn enhance(&self, record: &ImageRecord) -> EnhancementResult {
        if !record.has_utf8_name() {
            let err = ItemError::InvalidName {
                path: record.image.clone(),
            };
            return EnhancementResult::failed(record, Outcome::ReadFailed(err));
        }

        let bytes = match fs::read(&record.image) {
            Ok(b) => b,
            Err(source) => {
                let err = ItemError::Io {
                    path: record.image.clone(),
                    source,
                };
                return EnhancementResult::failed(record, Outcome::ReadFailed(err));
            }
        };

        let enhanced = match detprep_pipeline::process(&bytes, self.filter) {
            Ok(e) => e,
            Err(source) => {
                let err = ItemError::Image {
                    path: record.image.clone(),
                    source,
                };
                return EnhancementResult::failed(record, Outcome::ReadFailed(err));
            }
        };

        let ext = self.output_extension(record);
        let out_image = self.dirs.images.join(format!("{}.{ext}", record.stem));

        let encoded = OutputFormat::from_extension(ext, self.options.jpeg_quality)
            .and_then(|format| encode_rgb(&enhanced.enhanced, format));
        let encoded = match encoded {
            Ok(b) => b,
            Err(source) => {
                let err = ItemError::Image {
                    path: out_image,
                    source,
                };
                return EnhancementResult::failed(record, Outcome::WriteFailed(err));
            }
        };

        if !self.options.dry_run
            && let Err(source) = write_atomic(&out_image, &encoded)
        {
            let err = ItemError::Io {
                path: out_image,
                source,
            };
            return EnhancementResult::failed(record, Outcome::WriteFailed(err));
        }

        let compare = if self.options.save_compare {
            self.write_compare(record, &enhanced.original, &enhanced.enhanced)
        } else {
            None
        };

        let (outcome, label) = match &record.label {
            None => (Outcome::LabelMissing, None),
            Some(src) => {
                let dst = label_path(&self.dirs.labels, &record.stem);
                match self.copy_label(src, &dst) {
                    Ok(()) => (Outcome::Processed, Some(dst)),
                    Err(source) => {
                        // Keep images and labels paired: drop the image
                        // whose label could not be copied.
                        if !self.options.dry_run
                            && let Err(e) = fs::remove_file(&out_image)
                        {
                            warn!("failed to remove {}: {e}", out_image.display());
                        }
                        let err = ItemError::Io { path: dst, source };
                        return EnhancementResult {
                            compare,
                            ..EnhancementResult::failed(record, Outcome::WriteFailed(err))
                        };
                    }
                }
            }
        };

        EnhancementResult {
            stem: record.stem.clone(),
            source: record.image.clone(),
            outcome,
            image: Some(out_image),
            label,
            compare,
        }
    }

    fn copy_label(&self, src: &Path, dst: &Path) -> std::io::Result<()> {
        if self.options.dry_run {
            // Still notices labels removed since discovery.
            fs::metadata(src).map(|_| ())
        } else {
            copy_atomic(src, dst)
        }
    }

    /// Write the QA image. Failures are logged and otherwise ignored: the
    /// comparison is not a training artifact.
    fn write_compare(
        &self,
        record: &ImageRecord,
        original: &detprep_pipeline::RgbImage,
        enhanced: &detprep_pipeline::RgbImage,
    ) -> Option<PathBuf> {
        let path = self
            .dirs
            .compare
            .join(format!("{}{COMPARE_SUFFIX}.jpg", record.stem));
        let image = side_by_side(original, enhanced, DEFAULT_MAX_HEIGHT);
        let bytes = match encode_rgb(
            &image,
            OutputFormat::Jpeg {
                quality: COMPARE_JPEG_QUALITY,
            },
        ) {
            Ok(b) => b,
            Err(e) => {
                warn!("comparison for {} not encoded: {e}", record.stem);
                return None;
            }
        };
        if !self.options.dry_run
            && let Err(e) = write_atomic(&path, &bytes)
        {
            warn!("comparison {} not written: {e}", path.display());
            return None;
        }
        debug!("comparison {}", path.display());
        Some(path)
    }
}
