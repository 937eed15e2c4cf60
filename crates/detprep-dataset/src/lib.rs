//! detprep-dataset: dataset preparation around the pure filter chain.
//!
//! Everything that touches the filesystem or other processes lives here:
//!
//! - record discovery and label pairing ([`record`])
//! - the per-image enhancement engine ([`engine`]) and its bounded
//!   worker pool ([`pool`])
//! - train/val/test splitting ([`split`])
//! - run identifiers ([`version`]) and dataset descriptors
//!   ([`descriptor`])
//! - external trainer/evaluator commands ([`command`]) and the fail-fast
//!   stage sequencer ([`orchestrator`])

pub mod atomic;
pub mod command;
pub mod config;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod layout;
pub mod orchestrator;
pub mod pool;
pub mod record;
pub mod split;
pub mod stages;
pub mod version;

pub use config::ProjectConfig;
pub use engine::{EnhanceOptions, EnhancementResult, Enhancer, Outcome, OutputDirs};
pub use error::{ConfigError, ItemError, SetupError, StageError};
pub use layout::ProjectLayout;
pub use orchestrator::{Orchestrator, PipelineOutcome, Stage, StageName, StageReport};
pub use pool::{CancelToken, EnhanceSummary, WorkerPool};
pub use record::{DiscoveryOptions, ImageRecord};
pub use split::{DatasetSplit, SplitRatios, SplitSeed};
pub use version::RunId;
