//! Train/validation/test partitioning.
//!
//! The full record list is shuffled once, then cut by cumulative counts:
//! `floor(n * train)` records to train, `floor(n * val)` to val, and
//! whatever is left to test. Records are copied (never moved) into
//! `<target>/<subset>/images` and, when labeled, `<target>/<subset>/labels`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, StageError};
use crate::record::{DiscoveryOptions, ImageRecord, discover, label_path};

/// Fractions of the dataset assigned to train and val. Test gets the
/// remainder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitRatios {
    /// Training fraction.
    pub train: f64,
    /// Validation fraction.
    pub val: f64,
}

impl SplitRatios {
    /// Default training fraction.
    pub const DEFAULT_TRAIN: f64 = 0.8;
    /// Default validation fraction.
    pub const DEFAULT_VAL: f64 = 0.1;

    /// Build validated ratios.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] unless both values are in
    /// `[0, 1]` and sum to at most 1.
    pub fn new(train: f64, val: f64) -> Result<Self, ConfigError> {
        let ratios = Self { train, val };
        ratios.validate()?;
        Ok(ratios)
    }

    /// Check ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] unless both values are in
    /// `[0, 1]` and sum to at most 1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.train) || !in_unit(self.val) {
            return Err(ConfigError::Invalid(format!(
                "split ratios must be within [0, 1], got train={} val={}",
                self.train, self.val,
            )));
        }
        if self.train + self.val > 1.0 + f64::EPSILON {
            return Err(ConfigError::Invalid(format!(
                "train + val must not exceed 1, got {}",
                self.train + self.val,
            )));
        }
        Ok(())
    }

    /// The implied test fraction.
    #[must_use]
    pub fn test(&self) -> f64 {
        (1.0 - self.train - self.val).max(0.0)
    }

    /// Subset sizes for `n` records: `(train, val, test)`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn counts(&self, n: usize) -> (usize, usize, usize) {
        let floor = |ratio: f64| ((n as f64) * ratio).floor() as usize;
        let train = floor(self.train).min(n);
        let val = floor(self.val).min(n - train);
        (train, val, n - train - val)
    }
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: Self::DEFAULT_TRAIN,
            val: Self::DEFAULT_VAL,
        }
    }
}

/// Source of the shuffle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitSeed {
    /// Reproducible shuffle.
    Fixed(u64),
    /// A different shuffle every run.
    Entropy,
}

impl Default for SplitSeed {
    fn default() -> Self {
        Self::Fixed(0)
    }
}

impl SplitSeed {
    fn rng(self) -> StdRng {
        match self {
            Self::Fixed(seed) => StdRng::seed_from_u64(seed),
            Self::Entropy => StdRng::from_entropy(),
        }
    }
}

/// One of the three subsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subset {
    /// Training data.
    Train,
    /// Validation data.
    Val,
    /// Held-out test data.
    Test,
}

impl Subset {
    /// All subsets, in partition order.
    pub const ALL: [Self; 3] = [Self::Train, Self::Val, Self::Test];

    /// Directory name of the subset.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Three disjoint subsets covering the input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetSplit {
    /// Training records.
    pub train: Vec<ImageRecord>,
    /// Validation records.
    pub val: Vec<ImageRecord>,
    /// Test records.
    pub test: Vec<ImageRecord>,
}

impl DatasetSplit {
    /// Records of `subset`.
    #[must_use]
    pub fn subset(&self, subset: Subset) -> &[ImageRecord] {
        match subset {
            Subset::Train => &self.train,
            Subset::Val => &self.val,
            Subset::Test => &self.test,
        }
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    /// Whether there are no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shuffle `records` once and cut them into subsets.
#[must_use]
pub fn partition(mut records: Vec<ImageRecord>, ratios: SplitRatios, seed: SplitSeed) -> DatasetSplit {
    records.shuffle(&mut seed.rng());
    let (n_train, n_val, _) = ratios.counts(records.len());
    let test = records.split_off(n_train + n_val);
    let val = records.split_off(n_train);
    DatasetSplit {
        train: records,
        val,
        test,
    }
}

/// Per-subset counts of what was copied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SubsetCounts {
    /// Images copied.
    pub images: usize,
    /// Labels copied.
    pub labels: usize,
}

/// Counts for a materialized split.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitSummary {
    /// Where the split was written.
    pub target: PathBuf,
    /// Train subset counts.
    pub train: SubsetCounts,
    /// Val subset counts.
    pub val: SubsetCounts,
    /// Test subset counts.
    pub test: SubsetCounts,
}

impl SplitSummary {
    fn counts_mut(&mut self, subset: Subset) -> &mut SubsetCounts {
        match subset {
            Subset::Train => &mut self.train,
            Subset::Val => &mut self.val,
            Subset::Test => &mut self.test,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StageError + '_ {
    move |source| StageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Copy a split into `target`.
///
/// Existing `train`, `val` and `test` directories under `target` are
/// removed first so that re-running a split replaces it rather than
/// mixing two shuffles.
///
/// # Errors
///
/// Returns [`StageError::Io`] for the first directory or file operation
/// that fails.
pub fn write_split(split: &DatasetSplit, target: &Path) -> Result<SplitSummary, StageError> {
    let mut summary = SplitSummary {
        target: target.to_path_buf(),
        ..SplitSummary::default()
    };

    for subset in Subset::ALL {
        let root = target.join(subset.dir_name());
        if root.exists() {
            fs::remove_dir_all(&root).map_err(io_error(&root))?;
        }
        let images = root.join("images");
        let labels = root.join("labels");
        fs::create_dir_all(&images).map_err(io_error(&images))?;
        fs::create_dir_all(&labels).map_err(io_error(&labels))?;

        let counts = summary.counts_mut(subset);
        for record in split.subset(subset) {
            let Some(name) = record.image.file_name() else {
                continue;
            };
            let dst = images.join(name);
            fs::copy(&record.image, &dst).map_err(io_error(&record.image))?;
            counts.images += 1;

            if let Some(label) = &record.label {
                let dst = label_path(&labels, &record.stem);
                fs::copy(label, &dst).map_err(io_error(label))?;
                counts.labels += 1;
            }
        }
        debug!(
            "{subset}: {} images, {} labels",
            counts.images, counts.labels
        );
    }
    Ok(summary)
}

/// Discover records under `source` (`images/` and `labels/`), partition
/// them, and copy the result into `target`.
///
/// # Errors
///
/// Returns [`StageError::Config`] for invalid ratios,
/// [`StageError::Setup`] if the source has no images, and
/// [`StageError::Io`] if copying fails.
pub fn split_dataset(
    source: &Path,
    target: &Path,
    ratios: SplitRatios,
    seed: SplitSeed,
) -> Result<SplitSummary, StageError> {
    ratios.validate()?;
    let records = discover(
        &source.join("images"),
        &source.join("labels"),
        &DiscoveryOptions::default(),
    )?;
    let split = partition(records, ratios, seed);
    let summary = write_split(&split, target)?;
    info!(
        "split {} -> {}: train={} val={} test={}",
        source.display(),
        target.display(),
        summary.train.images,
        summary.val.images,
        summary.test.images,
    );
    Ok(summary)
}
