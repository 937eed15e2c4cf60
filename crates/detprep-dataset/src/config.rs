//! Project configuration (`detprep.yaml`).
//!
//! Every field has a default, so a missing file behaves like an empty
//! one. Paths are relative to the project root unless absolute.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::command::CommandTemplate;
use crate::error::ConfigError;
use crate::split::{SplitRatios, SplitSeed};

/// Default config file name, looked up in the project root.
pub const CONFIG_FILE_NAME: &str = "detprep.yaml";

/// Split settings as written in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitSettings {
    /// Training fraction.
    pub train: f64,
    /// Validation fraction.
    pub val: f64,
    /// Shuffle seed.
    pub seed: u64,
    /// Ignore `seed` and shuffle differently every run.
    pub random: bool,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            train: SplitRatios::DEFAULT_TRAIN,
            val: SplitRatios::DEFAULT_VAL,
            seed: 0,
            random: false,
        }
    }
}

impl SplitSettings {
    /// Validated ratios.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for out-of-range ratios.
    pub fn ratios(&self) -> Result<SplitRatios, ConfigError> {
        SplitRatios::new(self.train, self.val)
    }

    /// The shuffle seed.
    #[must_use]
    pub const fn seed(&self) -> SplitSeed {
        if self.random {
            SplitSeed::Entropy
        } else {
            SplitSeed::Fixed(self.seed)
        }
    }
}

/// Everything about a project that is not a per-command flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Dataset root holding `raw/`, `enhanced/`, `splits/` and the
    /// descriptors.
    pub dataset_dir: PathBuf,
    /// Where best weights are collected.
    pub models_dir: PathBuf,
    /// The trainer's project directory; each run writes
    /// `<runs_dir>/<run id>/weights/best.<ext>`.
    pub runs_dir: PathBuf,
    /// Class list, one name per line.
    pub classes_file: PathBuf,
    /// Dataset variants that are split, described, trained and evaluated.
    pub variants: Vec<String>,
    /// Split ratios and seed.
    pub split: SplitSettings,
    /// Training command. Placeholders: `{data}`, `{project}`, `{run}`.
    pub trainer: CommandTemplate,
    /// Evaluation command. Placeholders: `{data}`, `{model}`.
    pub evaluator: CommandTemplate,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("dataset"),
            models_dir: PathBuf::from("models"),
            runs_dir: PathBuf::from("runs/detect"),
            classes_file: PathBuf::from("dataset/classes.txt"),
            variants: vec!["raw".to_owned(), "enhanced".to_owned()],
            split: SplitSettings::default(),
            trainer: CommandTemplate::new(
                "yolo",
                &[
                    "detect",
                    "train",
                    "data={data}",
                    "model=yolov8s.pt",
                    "epochs=10",
                    "imgsz=640",
                    "batch=16",
                    "project={project}",
                    "name={run}",
                ],
            ),
            evaluator: CommandTemplate::new(
                "yolo",
                &[
                    "detect",
                    "val",
                    "model={model}",
                    "data={data}",
                    "split=test",
                    "imgsz=640",
                ],
            ),
        }
    }
}

impl ProjectConfig {
    /// Load `path`, falling back to defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file exists but cannot be
    /// read, [`ConfigError::Parse`] for malformed YAML or unknown keys,
    /// and [`ConfigError::Invalid`] for out-of-range values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML text. An empty document yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns the YAML error for malformed input or unknown keys.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.split.ratios()?;
        if self.variants.is_empty() {
            return Err(ConfigError::Invalid("at least one variant is required".to_owned()));
        }
        if let Some(bad) = self
            .variants
            .iter()
            .find(|v| v.is_empty() || v.contains(['/', '\\']))
        {
            return Err(ConfigError::Invalid(format!(
                "variant names must be non-empty path components, got {bad:?}"
            )));
        }
        if self.trainer.program.is_empty() || self.evaluator.program.is_empty() {
            return Err(ConfigError::Invalid(
                "trainer and evaluator programs must be set".to_owned(),
            ));
        }
        Ok(())
    }
}
