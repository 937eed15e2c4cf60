//! Image records and their discovery on disk.
//!
//! A record is one image plus the label file sharing its stem, if any.
//! Records are discovered fresh on every invocation; nothing is cached.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::SetupError;

/// Extension of detection label files.
pub const LABEL_EXTENSION: &str = "txt";

/// One image and its optional label file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRecord {
    /// File name without extension. Shared with the label file.
    pub stem: String,
    /// The image file.
    pub image: PathBuf,
    /// The label file, when one exists.
    pub label: Option<PathBuf>,
}

impl ImageRecord {
    /// Build a record for `image`, attaching `<labels_dir>/<stem>.txt`
    /// when that file exists.
    ///
    /// A stem that is not valid UTF-8 is kept in lossy form and never
    /// gets a label; the engine reports such records as read failures.
    #[must_use]
    pub fn new(image: PathBuf, labels_dir: &Path) -> Self {
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let label = if Self::name_is_utf8(&image) {
            let candidate = label_path(labels_dir, &stem);
            candidate.is_file().then_some(candidate)
        } else {
            None
        };
        Self { stem, image, label }
    }

    fn name_is_utf8(image: &Path) -> bool {
        image.file_stem().and_then(|s| s.to_str()).is_some()
    }

    /// Whether the image's stem is valid UTF-8 and so can name outputs.
    #[must_use]
    pub fn has_utf8_name(&self) -> bool {
        Self::name_is_utf8(&self.image)
    }

    /// Whether a label file was found.
    #[must_use]
    pub const fn has_label(&self) -> bool {
        self.label.is_some()
    }

    /// The image's extension, without the dot.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        self.image.extension().and_then(|e| e.to_str())
    }
}

/// Where the label for `stem` lives in `labels_dir`.
#[must_use]
pub fn label_path(labels_dir: &Path, stem: &str) -> PathBuf {
    labels_dir.join(format!("{stem}.{LABEL_EXTENSION}"))
}

/// How images are found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryOptions {
    /// Accepted extensions, compared case-insensitively. A leading dot
    /// is optional.
    pub extensions: Vec<String>,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Keep only the first `limit` records after sorting. Zero keeps all.
    pub limit: usize,
}

impl DiscoveryOptions {
    /// Extensions accepted by default.
    pub const DEFAULT_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

    fn accepts(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            extensions: Self::DEFAULT_EXTENSIONS.map(str::to_owned).to_vec(),
            recursive: false,
            limit: 0,
        }
    }
}

/// Fail with [`SetupError::MissingDirectory`] unless `path` is a directory.
///
/// # Errors
///
/// Returns [`SetupError::MissingDirectory`] if `path` is not a directory.
pub fn require_dir(role: &'static str, path: &Path) -> Result<(), SetupError> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(SetupError::MissingDirectory {
            role,
            path: path.to_path_buf(),
        })
    }
}

/// Find the images in `images_dir` and pair each with its label in
/// `labels_dir`.
///
/// Records are sorted by path so that `limit` selects a stable subset.
/// `labels_dir` may be missing, in which case every record is unlabeled.
///
/// # Errors
///
/// Returns [`SetupError::MissingDirectory`] if `images_dir` does not
/// exist, [`SetupError::Io`] if it cannot be read, and
/// [`SetupError::NoImages`] if nothing matched.
pub fn discover(
    images_dir: &Path,
    labels_dir: &Path,
    options: &DiscoveryOptions,
) -> Result<Vec<ImageRecord>, SetupError> {
    require_dir("input images", images_dir)?;

    let max_depth = if options.recursive { usize::MAX } else { 1 };
    let mut paths = Vec::new();
    for entry in WalkDir::new(images_dir).min_depth(1).max_depth(max_depth) {
        let entry = entry.map_err(|e| SetupError::Io {
            path: e.path().unwrap_or(images_dir).to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() && options.accepts(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut records: Vec<ImageRecord> = paths
        .into_iter()
        .map(|p| ImageRecord::new(p, labels_dir))
        .collect();

    if options.limit > 0 {
        records.truncate(options.limit);
    }

    for record in records.iter().filter(|r| !r.has_utf8_name()) {
        warn!(
            "{}: file name is not valid UTF-8 and will fail to process",
            record.image.display(),
        );
    }

    let mut seen = HashSet::new();
    for record in &records {
        if !seen.insert(record.stem.as_str()) {
            warn!(
                "duplicate stem {:?}: {} shares its label and output name",
                record.stem,
                record.image.display(),
            );
        }
    }

    if records.is_empty() {
        return Err(SetupError::NoImages {
            path: images_dir.to_path_buf(),
        });
    }

    debug!(
        "discovered {} images ({} labeled) in {}",
        records.len(),
        records.iter().filter(|r| r.has_label()).count(),
        images_dir.display(),
    );
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn pairs_labels_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        let labels = dir.path().join("labels");
        touch(&images.join("a.jpg"));
        touch(&images.join("b.PNG"));
        touch(&labels.join("a.txt"));

        let records = discover(&images, &labels, &DiscoveryOptions::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].stem, "a");
        assert_eq!(records[0].label, Some(labels.join("a.txt")));
        assert_eq!(records[1].stem, "b");
        assert!(!records[1].has_label());
    }

    #[test]
    fn filters_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.jpg"));
        touch(&dir.path().join("notes.md"));
        touch(&dir.path().join("noext"));

        let records = discover(dir.path(), dir.path(), &DiscoveryOptions::default()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn custom_extensions_accept_leading_dot() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.jpg"));
        touch(&dir.path().join("b.png"));
        let options = DiscoveryOptions {
            extensions: vec![".PNG".to_owned()],
            ..DiscoveryOptions::default()
        };
        let records = discover(dir.path(), dir.path(), &options).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stem, "b");
    }

    #[test]
    fn recursion_is_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("top.jpg"));
        touch(&dir.path().join("nested/deep.jpg"));

        let flat = discover(dir.path(), dir.path(), &DiscoveryOptions::default()).unwrap();
        assert_eq!(flat.len(), 1);

        let options = DiscoveryOptions {
            recursive: true,
            ..DiscoveryOptions::default()
        };
        let deep = discover(dir.path(), dir.path(), &options).unwrap();
        assert_eq!(deep.len(), 2);
    }

    #[test]
    fn limit_takes_first_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.jpg", "a.jpg", "b.jpg"] {
            touch(&dir.path().join(name));
        }
        let options = DiscoveryOptions {
            limit: 2,
            ..DiscoveryOptions::default()
        };
        let records = discover(dir.path(), dir.path(), &options).unwrap();
        let stems: Vec<_> = records.iter().map(|r| r.stem.as_str()).collect();
        assert_eq!(stems, ["a", "b"]);
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_names_are_kept() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("ok.png"));
        touch(&dir.path().join(OsStr::from_bytes(b"bad\xff.png")));
        touch(&dir.path().join(OsStr::from_bytes(b"bad\xff.txt")));

        let records = discover(dir.path(), dir.path(), &DiscoveryOptions::default()).unwrap();
        assert_eq!(records.len(), 2);
        let bad: Vec<_> = records.iter().filter(|r| !r.has_utf8_name()).collect();
        assert_eq!(bad.len(), 1);
        assert!(bad[0].label.is_none());
        assert!(records.iter().any(|r| r.stem == "ok" && r.has_utf8_name()));
    }

    #[test]
    fn missing_directory_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let result = discover(&missing, dir.path(), &DiscoveryOptions::default());
        assert!(matches!(result, Err(SetupError::MissingDirectory { .. })));
    }

    #[test]
    fn empty_directory_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = discover(dir.path(), dir.path(), &DiscoveryOptions::default());
        assert!(matches!(result, Err(SetupError::NoImages { .. })));
    }
}
