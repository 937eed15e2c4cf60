//! On-disk project layout.
//!
//! ```text
//! <root>/
//!   dataset/
//!     classes.txt
//!     raw/{images,labels}
//!     enhanced/{images,labels,compare}
//!     splits/<variant>/{train,val,test}/{images,labels}
//!     data_<variant>.yaml
//!   models/<tag>_<YYYY_MM_DD>_<NNN>_best.<ext>
//!   runs/detect/<run id>/weights/best.<ext>
//! ```

use std::path::{Path, PathBuf};

use crate::config::ProjectConfig;

/// Name of the unprocessed variant.
pub const RAW_VARIANT: &str = "raw";

/// Name of the enhanced variant.
pub const ENHANCED_VARIANT: &str = "enhanced";

/// Resolves project paths from a root and a [`ProjectConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
    dataset: PathBuf,
    models: PathBuf,
    runs: PathBuf,
    classes: PathBuf,
}

impl ProjectLayout {
    /// Layout of the project at `root`.
    #[must_use]
    pub fn new(root: &Path, config: &ProjectConfig) -> Self {
        Self {
            root: root.to_path_buf(),
            dataset: config.dataset_dir.clone(),
            models: config.models_dir.clone(),
            runs: config.runs_dir.clone(),
            classes: config.classes_file.clone(),
        }
    }

    /// Project root. External commands run here.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The dataset directory.
    #[must_use]
    pub fn dataset_dir(&self) -> PathBuf {
        self.root.join(&self.dataset)
    }

    /// Images of a variant (`dataset/<variant>/images`).
    #[must_use]
    pub fn images_dir(&self, variant: &str) -> PathBuf {
        self.dataset_dir().join(variant).join("images")
    }

    /// Labels of a variant (`dataset/<variant>/labels`).
    #[must_use]
    pub fn labels_dir(&self, variant: &str) -> PathBuf {
        self.dataset_dir().join(variant).join("labels")
    }

    /// Variant directory (`dataset/<variant>`), the split source.
    #[must_use]
    pub fn variant_dir(&self, variant: &str) -> PathBuf {
        self.dataset_dir().join(variant)
    }

    /// Split output of a variant, relative to the root. This is the form
    /// written into descriptors.
    #[must_use]
    pub fn split_dir_relative(&self, variant: &str) -> PathBuf {
        self.dataset.join("splits").join(variant)
    }

    /// Split output of a variant.
    #[must_use]
    pub fn split_dir(&self, variant: &str) -> PathBuf {
        self.root.join(self.split_dir_relative(variant))
    }

    /// Descriptor of a variant (`dataset/data_<variant>.yaml`).
    #[must_use]
    pub fn descriptor_path(&self, variant: &str) -> PathBuf {
        self.dataset_dir().join(format!("data_{variant}.yaml"))
    }

    /// The class list file.
    #[must_use]
    pub fn classes_file(&self) -> PathBuf {
        self.root.join(&self.classes)
    }

    /// Collected best weights.
    #[must_use]
    pub fn models_dir(&self) -> PathBuf {
        self.root.join(&self.models)
    }

    /// The trainer's project directory.
    #[must_use]
    pub fn runs_dir(&self) -> PathBuf {
        self.root.join(&self.runs)
    }
}
