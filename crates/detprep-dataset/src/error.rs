//! Error taxonomy for dataset operations.
//!
//! - [`SetupError`]: fatal, raised before any item is processed.
//! - [`ItemError`]: per-item, never aborts a batch; aggregated into
//!   [`EnhanceSummary`](crate::pool::EnhanceSummary) counts.
//! - [`StageError`]: a pipeline stage failed; fatal to the whole run.
//! - [`ConfigError`]: the project configuration could not be loaded.

use std::path::PathBuf;
use std::process::ExitStatus;

use detprep_pipeline::PipelineError;

/// Unrecoverable problems detected before processing starts.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    /// A required input directory does not exist.
    #[error("{role} directory not found: {}", path.display())]
    MissingDirectory {
        /// What the directory is for ("input images", "input labels", ...).
        role: &'static str,
        /// The path that was checked.
        path: PathBuf,
    },

    /// A required input file does not exist.
    #[error("{role} not found: {}", path.display())]
    MissingFile {
        /// What the file is for ("dataset descriptor", ...).
        role: &'static str,
        /// The path that was checked.
        path: PathBuf,
    },

    /// Discovery found no images to work on.
    #[error("no images found in {}", path.display())]
    NoImages {
        /// The directory that was scanned.
        path: PathBuf,
    },

    /// The class list is empty.
    #[error("no class names in {}", path.display())]
    NoClasses {
        /// The class list file.
        path: PathBuf,
    },

    /// The filter chain rejected its configuration.
    #[error(transparent)]
    Filter(#[from] PipelineError),

    /// Preparing an output location failed.
    #[error("failed to prepare {}: {source}", path.display())]
    Io {
        /// The path being created or read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Why a single record failed.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    /// Reading or writing a file failed.
    #[error("{}: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Decoding the input or encoding the output failed.
    #[error("{}: {source}", path.display())]
    Image {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: PipelineError,
    },

    /// The file name cannot be carried over to the outputs.
    #[error("{}: file name is not valid UTF-8", path.display())]
    InvalidName {
        /// The input image.
        path: PathBuf,
    },

    /// Processing the record panicked. The pool caught the panic.
    #[error("{}: worker panicked: {message}", path.display())]
    Panicked {
        /// The input image.
        path: PathBuf,
        /// The panic payload, when it was a string.
        message: String,
    },
}

/// A pipeline stage did not complete successfully.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    /// The stage could not start.
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// The stage's configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A filesystem operation failed mid-stage.
    #[error("{}: {source}", path.display())]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An external command could not be started.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An external command exited unsuccessfully.
    #[error("`{command}` exited with {status}")]
    ExitStatus {
        /// The rendered command line.
        command: String,
        /// Its exit status.
        status: ExitStatus,
    },

    /// Training reported success but left no best-weights file.
    #[error("trainer produced no best weights at {}", path.display())]
    MissingWeights {
        /// Where the weights were expected.
        path: PathBuf,
    },

    /// No trained model exists for the requested tag.
    #[error("no trained model for {tag:?} in {}", dir.display())]
    NoTrainedModel {
        /// The dataset variant tag.
        tag: String,
        /// The models directory that was scanned.
        dir: PathBuf,
    },
}

/// The project configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The config file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for a project config.
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        /// The config file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
