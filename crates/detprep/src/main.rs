//! detprep: prepare labeled image datasets for object-detection training.
//!
//! Enhances a raw dataset, splits each variant into train/val/test,
//! writes dataset descriptors, and drives an external trainer and
//! evaluator with versioned run identifiers.
//!
//! # Usage
//!
//! ```text
//! detprep [--root DIR] [--config FILE] [-v] <COMMAND> [OPTIONS]
//! ```
//!
//! Commands: `enhance`, `split`, `describe`, `train`, `evaluate`, `run`.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use detprep_dataset::config::CONFIG_FILE_NAME;
use detprep_dataset::layout::{ENHANCED_VARIANT, RAW_VARIANT};
use detprep_dataset::orchestrator::standard_pipeline;
use detprep_dataset::stages::{self, EnhanceRequest};
use detprep_dataset::{
    CancelToken, DiscoveryOptions, EnhanceOptions, OutputDirs, PipelineOutcome, ProjectConfig,
    ProjectLayout,
};
use detprep_pipeline::{
    ContrastParams, DenoiseParams, Dimensions, FilterConfig, ResizeConfig, ResizeFilter,
    SharpenParams, StageSelection,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Prepare, enhance and split object-detection datasets, then train and
/// evaluate on them.
#[derive(Parser)]
#[command(name = "detprep", version)]
struct Cli {
    /// Project root. Relative paths in the config resolve against it.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Project config file [default: <root>/detprep.yaml].
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Filter raw images into the enhanced variant, copying labels.
    Enhance(EnhanceCmd),
    /// Split dataset variants into train/val/test.
    Split(SplitArgs),
    /// Write a dataset descriptor for every variant.
    Describe,
    /// Train on dataset variants and collect the best weights.
    Train(VariantArgs),
    /// Evaluate the latest model of each variant on its test subset.
    Evaluate(VariantArgs),
    /// Enhance, split, describe, train and evaluate, stopping at the
    /// first failing stage.
    Run(RunArgs),
}

/// The `enhance` subcommand.
#[derive(Args)]
struct EnhanceCmd {
    #[command(flatten)]
    args: EnhanceArgs,

    /// Print the summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

/// Enhancement options.
#[derive(Args)]
struct EnhanceArgs {
    /// Input images [default: <dataset>/raw/images].
    #[arg(long)]
    in_images: Option<PathBuf>,

    /// Input labels [default: <dataset>/raw/labels].
    #[arg(long)]
    in_labels: Option<PathBuf>,

    /// Output images [default: <dataset>/enhanced/images].
    #[arg(long)]
    out_images: Option<PathBuf>,

    /// Output labels [default: <dataset>/enhanced/labels].
    #[arg(long)]
    out_labels: Option<PathBuf>,

    /// Accepted image extensions (repeatable) [default: jpg jpeg png bmp tif tiff webp].
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Search input images in subdirectories too.
    #[arg(long)]
    recursive: bool,

    /// Process at most this many images (0 = all).
    #[arg(long, default_value_t = 0)]
    limit: usize,

    /// Resize every image to exactly W x H before filtering.
    #[arg(long, num_args = 2, value_names = ["W", "H"])]
    resize: Option<Vec<u32>>,

    /// Resampling filter for --resize.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_RESAMPLE)]
    resize_filter: Resample,

    /// Force the output extension (jpg, png, bmp, tif, webp).
    #[arg(long)]
    output_ext: Option<String>,

    /// JPEG quality for enhanced images (1-100).
    #[arg(long, default_value_t = detprep_pipeline::codec::DEFAULT_JPEG_QUALITY, value_parser = clap::value_parser!(u8).range(1..=100))]
    jpg_quality: u8,

    /// Enable non-local-means denoising.
    #[arg(long)]
    denoise: bool,

    /// Enable CLAHE on the lightness channel.
    #[arg(long)]
    clahe: bool,

    /// Enable unsharp masking.
    #[arg(long)]
    sharpen: bool,

    /// CLAHE clip limit.
    #[arg(long, default_value_t = ContrastParams::DEFAULT_CLIP_LIMIT)]
    clahe_clip: f32,

    /// CLAHE tile grid size (tiles per side).
    #[arg(long, default_value_t = ContrastParams::DEFAULT_TILE_GRID)]
    clahe_grid: u32,

    /// Unsharp mask blur sigma.
    #[arg(long, default_value_t = SharpenParams::DEFAULT_SIGMA)]
    us_sigma: f32,

    /// Unsharp mask amount.
    #[arg(long, default_value_t = SharpenParams::DEFAULT_AMOUNT)]
    us_amount: f32,

    /// Unsharp mask threshold; smaller differences are left untouched.
    #[arg(long, default_value_t = SharpenParams::DEFAULT_THRESHOLD)]
    us_threshold: u8,

    /// Denoise filter strength for lightness.
    #[arg(long, default_value_t = DenoiseParams::DEFAULT_H)]
    dn_h: f32,

    /// Denoise filter strength for color.
    #[arg(long, default_value_t = DenoiseParams::DEFAULT_H_COLOR)]
    dn_h_color: f32,

    /// Denoise template window size (odd).
    #[arg(long, default_value_t = DenoiseParams::DEFAULT_TEMPLATE_WINDOW)]
    dn_template: u32,

    /// Denoise search window size (odd).
    #[arg(long, default_value_t = DenoiseParams::DEFAULT_SEARCH_WINDOW)]
    dn_search: u32,

    /// Also write side-by-side original/enhanced images to a `compare/`
    /// directory next to the output images.
    #[arg(long)]
    save_compare: bool,

    /// Process every image but write nothing.
    #[arg(long)]
    dry_run: bool,

    /// Worker threads [default: available parallelism].
    #[arg(long)]
    workers: Option<NonZeroUsize>,

    /// Full filter config as a JSON string.
    ///
    /// When provided, all stage and parameter flags are ignored. The JSON
    /// must be a valid `FilterConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

/// Split overrides on top of the project config.
#[derive(Args)]
struct SplitOverrides {
    /// Training fraction.
    #[arg(long)]
    train_ratio: Option<f64>,

    /// Validation fraction. The remainder goes to test.
    #[arg(long)]
    val_ratio: Option<f64>,

    /// Shuffle seed.
    #[arg(long, conflicts_with = "random")]
    seed: Option<u64>,

    /// Shuffle differently on every run.
    #[arg(long)]
    random: bool,
}

/// Split options.
#[derive(Args)]
struct SplitArgs {
    /// Variants to split [default: all configured variants].
    #[arg(long = "variant", value_name = "NAME")]
    variants: Vec<String>,

    #[command(flatten)]
    overrides: SplitOverrides,
}

/// Variant selection for train/evaluate.
#[derive(Args)]
struct VariantArgs {
    /// Variants to process [default: all configured variants].
    #[arg(long = "variant", value_name = "NAME")]
    variants: Vec<String>,
}

/// Options of the full run.
#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    enhance: EnhanceArgs,

    #[command(flatten)]
    split: SplitOverrides,
}

/// Resampling filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Resample {
    /// Nearest-neighbor (fastest, blocky).
    Nearest,
    /// Area averaging when shrinking, bilinear when enlarging.
    Area,
    /// Bilinear interpolation (fast).
    Triangle,
    /// Bicubic Catmull-Rom (moderate, good quality).
    CatmullRom,
    /// Gaussian (moderate, smooth).
    Gaussian,
    /// Lanczos with 3 lobes (slowest, sharpest).
    Lanczos3,
}

/// Maps a [`ResizeFilter`] to the local CLI [`Resample`] enum.
const fn resample_from_pipeline(f: ResizeFilter) -> Resample {
    match f {
        ResizeFilter::Nearest => Resample::Nearest,
        ResizeFilter::Area => Resample::Area,
        ResizeFilter::Triangle => Resample::Triangle,
        ResizeFilter::CatmullRom => Resample::CatmullRom,
        ResizeFilter::Gaussian => Resample::Gaussian,
        ResizeFilter::Lanczos3 => Resample::Lanczos3,
    }
}

/// The CLI default, derived from [`ResizeFilter::default`] so the two
/// cannot silently diverge.
const CLI_DEFAULT_RESAMPLE: Resample = resample_from_pipeline(ResizeFilter::DEFAULT);

const fn resample_to_pipeline(r: Resample) -> ResizeFilter {
    match r {
        Resample::Nearest => ResizeFilter::Nearest,
        Resample::Area => ResizeFilter::Area,
        Resample::Triangle => ResizeFilter::Triangle,
        Resample::CatmullRom => ResizeFilter::CatmullRom,
        Resample::Gaussian => ResizeFilter::Gaussian,
        Resample::Lanczos3 => ResizeFilter::Lanczos3,
    }
}

/// Build a [`FilterConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual stage and parameter flags are ignored.
fn filter_from_cli(args: &EnhanceArgs) -> Result<FilterConfig, String> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let resize = match args.resize.as_deref() {
        None => None,
        Some(&[width, height]) => Some(ResizeConfig {
            dimensions: Dimensions { width, height },
            filter: resample_to_pipeline(args.resize_filter),
        }),
        Some(other) => return Err(format!("--resize takes W H, got {other:?}")),
    };

    Ok(FilterConfig {
        stages: StageSelection {
            denoise: args.denoise,
            local_contrast: args.clahe,
            sharpen: args.sharpen,
        }
        .resolve(),
        denoise: DenoiseParams {
            h: args.dn_h,
            h_color: args.dn_h_color,
            template_window: args.dn_template,
            search_window: args.dn_search,
        },
        contrast: ContrastParams {
            clip_limit: args.clahe_clip,
            tile_grid: args.clahe_grid,
        },
        sharpen: SharpenParams {
            sigma: args.us_sigma,
            amount: args.us_amount,
            threshold: args.us_threshold,
        },
        resize,
    })
}

/// Build an [`EnhanceRequest`], deriving omitted directories from the
/// project layout.
fn enhance_request(args: &EnhanceArgs, layout: &ProjectLayout) -> Result<EnhanceRequest, String> {
    let defaults = EnhanceRequest::from_layout(layout, RAW_VARIANT, ENHANCED_VARIANT);
    let discovery = DiscoveryOptions {
        extensions: if args.extensions.is_empty() {
            defaults.discovery.extensions
        } else {
            args.extensions.clone()
        },
        recursive: args.recursive,
        limit: args.limit,
    };
    Ok(EnhanceRequest {
        in_images: args.in_images.clone().unwrap_or(defaults.in_images),
        in_labels: args.in_labels.clone().unwrap_or(defaults.in_labels),
        out: OutputDirs::new(
            args.out_images.clone().unwrap_or(defaults.out.images),
            args.out_labels.clone().unwrap_or(defaults.out.labels),
        ),
        discovery,
        filter: filter_from_cli(args)?,
        options: EnhanceOptions {
            output_ext: args.output_ext.clone(),
            jpeg_quality: args.jpg_quality,
            save_compare: args.save_compare,
            dry_run: args.dry_run,
        },
        workers: args.workers,
    })
}

/// Apply split overrides to a copy of the project config.
fn with_split_overrides(
    config: &ProjectConfig,
    overrides: &SplitOverrides,
) -> Result<ProjectConfig, String> {
    let mut config = config.clone();
    if let Some(train) = overrides.train_ratio {
        config.split.train = train;
    }
    if let Some(val) = overrides.val_ratio {
        config.split.val = val;
    }
    if let Some(seed) = overrides.seed {
        config.split.seed = seed;
        config.split.random = false;
    }
    if overrides.random {
        config.split.random = true;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Restrict `config` to the requested variants, or keep all of them when
/// none are requested.
fn with_variants(mut config: ProjectConfig, requested: &[String]) -> Result<ProjectConfig, String> {
    if !requested.is_empty() {
        config.variants = requested.to_vec();
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "detprep=debug" } else { "detprep=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<ProjectConfig, String> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.root.join(CONFIG_FILE_NAME));
    ProjectConfig::load(&path).map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(msg) => {
            error!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    let layout = ProjectLayout::new(&cli.root, &config);

    let result = match &cli.command {
        Command::Enhance(args) => run_enhance(args, &layout),
        Command::Split(args) => run_split(args, &layout, &config),
        Command::Describe => run_describe(&layout, &config),
        Command::Train(args) => run_train(args, &layout, &config),
        Command::Evaluate(args) => run_evaluate(args, &layout, &config),
        Command::Run(args) => run_all(args, &layout, &config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn run_enhance(cmd: &EnhanceCmd, layout: &ProjectLayout) -> Result<(), String> {
    let request = enhance_request(&cmd.args, layout)?;
    let summary = stages::enhance(&request, &CancelToken::new()).map_err(|e| e.to_string())?;
    if cmd.json {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| format!("Error serializing summary: {e}"))?;
        println!("{json}");
    }
    Ok(())
}

fn run_split(args: &SplitArgs, layout: &ProjectLayout, config: &ProjectConfig) -> Result<(), String> {
    let config = with_variants(with_split_overrides(config, &args.overrides)?, &args.variants)?;
    let summaries = stages::split_variants(layout, &config).map_err(|e| e.to_string())?;
    for (variant, s) in config.variants.iter().zip(&summaries) {
        println!(
            "{variant}: train={} val={} test={} -> {}",
            s.train.images,
            s.val.images,
            s.test.images,
            s.target.display(),
        );
    }
    Ok(())
}

fn run_describe(layout: &ProjectLayout, config: &ProjectConfig) -> Result<(), String> {
    let written = stages::describe_variants(layout, config).map_err(|e| e.to_string())?;
    for path in written {
        println!("{}", path.display());
    }
    Ok(())
}

fn run_train(args: &VariantArgs, layout: &ProjectLayout, config: &ProjectConfig) -> Result<(), String> {
    let config = with_variants(config.clone(), &args.variants)?;
    let date = chrono::Local::now().date_naive();
    for variant in &config.variants {
        let model = stages::train(layout, &config, variant, date).map_err(|e| e.to_string())?;
        println!("{}: {}", model.run, model.weights.display());
    }
    Ok(())
}

fn run_evaluate(
    args: &VariantArgs,
    layout: &ProjectLayout,
    config: &ProjectConfig,
) -> Result<(), String> {
    let config = with_variants(config.clone(), &args.variants)?;
    for variant in &config.variants {
        let model = stages::evaluate(layout, &config, variant).map_err(|e| e.to_string())?;
        info!("evaluated {}", model.run);
    }
    Ok(())
}

fn run_all(args: &RunArgs, layout: &ProjectLayout, config: &ProjectConfig) -> Result<(), String> {
    let config = with_split_overrides(config, &args.split)?;
    let request = enhance_request(&args.enhance, layout)?;
    let date = chrono::Local::now().date_naive();
    let cancel = CancelToken::new();

    match standard_pipeline(layout, &config, &request, date, &cancel).run() {
        PipelineOutcome::AllStagesCompleted => {
            println!("all stages completed");
            Ok(())
        }
        PipelineOutcome::HaltedAtStage { stage, diagnostic } => {
            Err(format!("pipeline halted at stage {stage}: {diagnostic}"))
        }
    }
}
