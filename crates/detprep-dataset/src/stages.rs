//! The individual pipeline stages: enhance, split, describe, train,
//! evaluate.
//!
//! Each stage is usable on its own (one CLI subcommand each) and is also
//! wrapped as a [`Stage`](crate::orchestrator::Stage) by the
//! orchestrator.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use detprep_pipeline::{FilterChain, FilterConfig};
use tracing::info;

use crate::atomic::copy_atomic;
use crate::config::ProjectConfig;
use crate::descriptor::{DatasetDescriptor, read_classes, write_descriptor};
use crate::engine::{EnhanceOptions, Enhancer, OutputDirs};
use crate::error::{SetupError, StageError};
use crate::layout::ProjectLayout;
use crate::pool::{CancelToken, EnhanceSummary, WorkerPool};
use crate::record::{DiscoveryOptions, discover, require_dir};
use crate::split::{SplitSummary, split_dataset};
use crate::version::{RunId, artifact_names, latest_run, next_run_id};

/// Stem of the trainer's best-weights file.
const BEST_WEIGHTS_STEM: &str = "best";

/// Everything needed for one enhancement run.
#[derive(Debug, Clone)]
pub struct EnhanceRequest {
    /// Input images.
    pub in_images: PathBuf,
    /// Input labels.
    pub in_labels: PathBuf,
    /// Output directories.
    pub out: OutputDirs,
    /// Which images to pick up.
    pub discovery: DiscoveryOptions,
    /// Filter chain configuration.
    pub filter: FilterConfig,
    /// Output behaviour.
    pub options: EnhanceOptions,
    /// Worker count; `None` uses every hardware thread.
    pub workers: Option<NonZeroUsize>,
}

impl EnhanceRequest {
    /// Raw variant in, enhanced variant out, with default settings.
    #[must_use]
    pub fn from_layout(layout: &ProjectLayout, raw: &str, enhanced: &str) -> Self {
        Self {
            in_images: layout.images_dir(raw),
            in_labels: layout.labels_dir(raw),
            out: OutputDirs::new(layout.images_dir(enhanced), layout.labels_dir(enhanced)),
            discovery: DiscoveryOptions::default(),
            filter: FilterConfig::default(),
            options: EnhanceOptions::default(),
            workers: None,
        }
    }
}

/// Enhance every discovered image.
///
/// Per-item failures are counted in the summary, not returned.
///
/// # Errors
///
/// Returns a [`SetupError`] if an input directory is missing, the filter
/// configuration is invalid, no images are found, or an output directory
/// cannot be created. Nothing is processed in that case.
pub fn enhance(request: &EnhanceRequest, cancel: &CancelToken) -> Result<EnhanceSummary, SetupError> {
    require_dir("input images", &request.in_images)?;
    require_dir("input labels", &request.in_labels)?;
    let chain = FilterChain::new(request.filter.clone())?;
    let records = discover(&request.in_images, &request.in_labels, &request.discovery)?;

    info!(
        "enhancing {} images with stages [{}]{}",
        records.len(),
        chain
            .stages()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
        if request.options.dry_run { " (dry run)" } else { "" },
    );

    let engine = Enhancer::new(&chain, request.out.clone(), request.options.clone());
    engine.prepare()?;

    let pool = WorkerPool::new(request.workers);
    let summary = pool.run(&records, &engine, cancel);

    info!(
        "processed: {}, missing labels: {}, failed: {}{}",
        summary.processed,
        summary.missing_labels,
        summary.failed(),
        if summary.cancelled > 0 {
            format!(", cancelled: {}", summary.cancelled)
        } else {
            String::new()
        },
    );
    info!("output images: {}", summary.out_images.display());
    info!("output labels: {}", summary.out_labels.display());
    Ok(summary)
}

/// Split every configured variant independently.
///
/// # Errors
///
/// Returns the first variant's [`StageError`].
pub fn split_variants(
    layout: &ProjectLayout,
    config: &ProjectConfig,
) -> Result<Vec<SplitSummary>, StageError> {
    let ratios = config.split.ratios()?;
    config
        .variants
        .iter()
        .map(|variant| {
            split_dataset(
                &layout.variant_dir(variant),
                &layout.split_dir(variant),
                ratios,
                config.split.seed(),
            )
        })
        .collect()
}

/// Write `data_<variant>.yaml` for every configured variant.
///
/// # Errors
///
/// Returns [`StageError::Setup`] if the class list is missing or empty
/// and [`StageError::Io`] if a descriptor cannot be written.
pub fn describe_variants(
    layout: &ProjectLayout,
    config: &ProjectConfig,
) -> Result<Vec<PathBuf>, StageError> {
    let classes = read_classes(&layout.classes_file())?;
    let dataset_dir = layout.dataset_dir();
    fs::create_dir_all(&dataset_dir).map_err(|source| StageError::Io {
        path: dataset_dir.clone(),
        source,
    })?;
    config
        .variants
        .iter()
        .map(|variant| {
            let descriptor =
                DatasetDescriptor::new(&layout.split_dir_relative(variant), classes.clone());
            let out = layout.descriptor_path(variant);
            write_descriptor(&descriptor, &out)?;
            Ok(out)
        })
        .collect()
}

/// A completed training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainedModel {
    /// The run's identifier.
    pub run: RunId,
    /// The collected best weights under the models directory.
    pub weights: PathBuf,
}

fn require_descriptor(layout: &ProjectLayout, variant: &str) -> Result<PathBuf, SetupError> {
    let path = layout.descriptor_path(variant);
    if path.is_file() {
        Ok(path)
    } else {
        Err(SetupError::MissingFile {
            role: "dataset descriptor",
            path,
        })
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StageError + '_ {
    move |source| StageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// The trainer's best weights in `weights_dir`, preferring `best.pt`.
fn find_best_weights(weights_dir: &Path) -> Option<PathBuf> {
    let preferred = weights_dir.join(format!("{BEST_WEIGHTS_STEM}.pt"));
    if preferred.is_file() {
        return Some(preferred);
    }
    let mut candidates: Vec<PathBuf> = fs::read_dir(weights_dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.file_stem().is_some_and(|s| s == BEST_WEIGHTS_STEM))
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Train on `variant`'s descriptor and collect the best weights as
/// `<models>/<run id>_best.<ext>`.
///
/// # Errors
///
/// Returns [`StageError::Setup`] if the descriptor is missing,
/// [`StageError::Spawn`] / [`StageError::ExitStatus`] if the trainer
/// fails, [`StageError::MissingWeights`] if it succeeds without writing
/// best weights, and [`StageError::Io`] if the weights cannot be copied.
pub fn train(
    layout: &ProjectLayout,
    config: &ProjectConfig,
    variant: &str,
    date: NaiveDate,
) -> Result<TrainedModel, StageError> {
    let data = require_descriptor(layout, variant)?;
    let models_dir = layout.models_dir();
    fs::create_dir_all(&models_dir).map_err(io_error(&models_dir))?;

    let existing = artifact_names(&models_dir).map_err(io_error(&models_dir))?;
    let run = next_run_id(&existing, variant, date);
    info!("training {variant} as {run}");

    let project = layout.runs_dir();
    let run_name = run.to_string();
    let data_arg = data.to_string_lossy();
    let project_arg = project.to_string_lossy();
    config.trainer.run(
        &[
            ("data", data_arg.as_ref()),
            ("project", project_arg.as_ref()),
            ("run", run_name.as_str()),
        ],
        layout.root(),
    )?;

    let weights_dir = project.join(&run_name).join("weights");
    let best = find_best_weights(&weights_dir).ok_or_else(|| StageError::MissingWeights {
        path: weights_dir.join(format!("{BEST_WEIGHTS_STEM}.pt")),
    })?;
    let ext = best.extension().and_then(|e| e.to_str()).unwrap_or("pt");
    let weights = models_dir.join(format!("{run_name}_{BEST_WEIGHTS_STEM}.{ext}"));
    copy_atomic(&best, &weights).map_err(io_error(&weights))?;
    info!("saved model to {}", weights.display());

    Ok(TrainedModel { run, weights })
}

/// The newest collected model for `tag`, by run date then sequence.
///
/// # Errors
///
/// Returns [`StageError::Io`] if the models directory cannot be read and
/// [`StageError::NoTrainedModel`] if no model matches.
pub fn latest_model(models_dir: &Path, tag: &str) -> Result<TrainedModel, StageError> {
    let names = artifact_names(models_dir).map_err(io_error(models_dir))?;
    let best_suffix = format!("_{BEST_WEIGHTS_STEM}.");
    let run = latest_run(
        names.iter().filter(|n| n.contains(&best_suffix)),
        tag,
    )
    .ok_or_else(|| StageError::NoTrainedModel {
        tag: tag.to_owned(),
        dir: models_dir.to_path_buf(),
    })?;

    let prefix = format!("{run}{best_suffix}");
    let name = names
        .iter()
        .find(|n| n.starts_with(&prefix))
        .ok_or_else(|| StageError::NoTrainedModel {
            tag: tag.to_owned(),
            dir: models_dir.to_path_buf(),
        })?;
    Ok(TrainedModel {
        weights: models_dir.join(name),
        run,
    })
}

/// Evaluate the latest model for `variant` on its test subset.
///
/// # Errors
///
/// Returns [`StageError::Setup`] if the descriptor is missing,
/// [`StageError::NoTrainedModel`] if there is no model, and
/// [`StageError::Spawn`] / [`StageError::ExitStatus`] if the evaluator
/// fails.
pub fn evaluate(
    layout: &ProjectLayout,
    config: &ProjectConfig,
    variant: &str,
) -> Result<TrainedModel, StageError> {
    let data = require_descriptor(layout, variant)?;
    let model = latest_model(&layout.models_dir(), variant)?;
    info!("evaluating {variant} with {}", model.weights.display());
    let data_arg = data.to_string_lossy();
    let model_arg = model.weights.to_string_lossy();
    config.evaluator.run(
        &[("data", data_arg.as_ref()), ("model", model_arg.as_ref())],
        layout.root(),
    )?;
    Ok(model)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn latest_model_ignores_other_tags_and_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "raw_2024_01_01_002_best.pt",
            "raw_2024_01_03_001_best.pt",
            "raw_2024_01_03_001_notes.txt",
            "enhanced_2025_01_01_001_best.pt",
        ] {
            fs::write(dir.path().join(name), b"w").unwrap();
        }
        let model = latest_model(dir.path(), "raw").unwrap();
        assert_eq!(model.run.to_string(), "raw_2024_01_03_001");
        assert_eq!(model.weights, dir.path().join("raw_2024_01_03_001_best.pt"));
    }

    #[test]
    fn no_model_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            latest_model(dir.path(), "raw"),
            Err(StageError::NoTrainedModel { .. })
        ));
    }

    #[test]
    fn best_weights_prefers_pt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("best.onnx"), b"o").unwrap();
        fs::write(dir.path().join("best.pt"), b"p").unwrap();
        fs::write(dir.path().join("last.pt"), b"l").unwrap();
        assert_eq!(find_best_weights(dir.path()), Some(dir.path().join("best.pt")));
    }

    #[test]
    fn best_weights_falls_back_to_other_extensions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("best.safetensors"), b"s").unwrap();
        assert_eq!(
            find_best_weights(dir.path()),
            Some(dir.path().join("best.safetensors"))
        );
        assert_eq!(find_best_weights(&dir.path().join("missing")), None);
    }
}
