//! Dataset descriptors for the external trainer.
//!
//! One YAML document per dataset variant, declaring the split root, the
//! three image subdirectories relative to it, and the class names.
//! Regenerating a descriptor from the same class list produces the same
//! bytes.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::atomic::write_atomic;
use crate::error::{SetupError, StageError};
use crate::split::Subset;

/// The descriptor document. Field order is the key order on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Dataset root, as seen from the trainer's working directory.
    pub path: String,
    /// Training images, relative to `path`.
    pub train: String,
    /// Validation images, relative to `path`.
    pub val: String,
    /// Test images, relative to `path`.
    pub test: String,
    /// Number of classes.
    pub nc: usize,
    /// Class names, index = class id.
    pub names: Vec<String>,
}

impl DatasetDescriptor {
    /// Describe the split rooted at `root` with the given classes.
    #[must_use]
    pub fn new(root: &Path, classes: Vec<String>) -> Self {
        let images = |s: Subset| format!("{}/images", s.dir_name());
        Self {
            path: root.to_string_lossy().replace('\\', "/"),
            train: images(Subset::Train),
            val: images(Subset::Val),
            test: images(Subset::Test),
            nc: classes.len(),
            names: classes,
        }
    }

    /// Render as YAML.
    ///
    /// # Errors
    ///
    /// Returns the serializer error, which only happens for values YAML
    /// cannot represent.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Parse a class list: one name per line, trimmed, blank lines skipped.
#[must_use]
pub fn parse_classes(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Read and parse the class list at `path`.
///
/// # Errors
///
/// Returns [`SetupError::Io`] if the file cannot be read and
/// [`SetupError::NoClasses`] if it names no classes.
pub fn read_classes(path: &Path) -> Result<Vec<String>, SetupError> {
    let text = fs::read_to_string(path).map_err(|source| SetupError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let classes = parse_classes(&text);
    if classes.is_empty() {
        return Err(SetupError::NoClasses {
            path: path.to_path_buf(),
        });
    }
    Ok(classes)
}

/// Write `descriptor` to `out` atomically.
///
/// # Errors
///
/// Returns [`StageError::Io`] if the file cannot be written.
pub fn write_descriptor(descriptor: &DatasetDescriptor, out: &Path) -> Result<(), StageError> {
    let yaml = descriptor.to_yaml().map_err(|e| StageError::Io {
        path: out.to_path_buf(),
        source: std::io::Error::other(e),
    })?;
    write_atomic(out, yaml.as_bytes()).map_err(|source| StageError::Io {
        path: out.to_path_buf(),
        source,
    })?;
    info!(
        "wrote {} ({} classes, root {})",
        out.display(),
        descriptor.nc,
        descriptor.path,
    );
    Ok(())
}
