//! Fail-fast sequencing of pipeline stages.
//!
//! A pipeline is an ordered list of [`Stage`] descriptors, each a name,
//! an invoke function and a success predicate. The orchestrator runs them
//! one after another on the calling thread and stops at the first stage
//! that errors or whose report fails its predicate. Nothing is retried.

use std::fmt;

use chrono::NaiveDate;
use tracing::{error, info};

use crate::config::ProjectConfig;
use crate::error::StageError;
use crate::layout::ProjectLayout;
use crate::pool::CancelToken;
use crate::stages::{EnhanceRequest, describe_variants, enhance, evaluate, split_variants, train};

/// Names of the standard stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageName {
    /// Filter raw images into the enhanced variant.
    Enhance,
    /// Partition each variant into train/val/test.
    Split,
    /// Write the per-variant dataset descriptors.
    DescribeDataset,
    /// Run the external trainer.
    Train,
    /// Run the external evaluator.
    Evaluate,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Enhance => "enhance",
            Self::Split => "split",
            Self::DescribeDataset => "describe-dataset",
            Self::Train => "train",
            Self::Evaluate => "evaluate",
        })
    }
}

/// What a stage reports when its invoke function returns normally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Human-readable summary, also used as the diagnostic when the
    /// success predicate rejects the report.
    pub detail: String,
    /// Items the stage handled successfully.
    pub succeeded: usize,
    /// Items the stage failed on without erroring out.
    pub failed: usize,
}

impl StageReport {
    /// A report with only a summary line.
    #[must_use]
    pub fn done(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            ..Self::default()
        }
    }

    /// Predicate accepting any report.
    #[must_use]
    pub const fn always(_: &Self) -> bool {
        true
    }

    /// Predicate requiring at least one successful item.
    #[must_use]
    pub const fn any_succeeded(report: &Self) -> bool {
        report.succeeded > 0
    }
}

type Invoke<'a> = Box<dyn FnMut() -> Result<StageReport, StageError> + 'a>;

/// One step of a pipeline.
pub struct Stage<'a> {
    name: StageName,
    invoke: Invoke<'a>,
    success: fn(&StageReport) -> bool,
}

impl<'a> Stage<'a> {
    /// A stage that succeeds whenever `invoke` returns `Ok`.
    pub fn new<F>(name: StageName, invoke: F) -> Self
    where
        F: FnMut() -> Result<StageReport, StageError> + 'a,
    {
        Self {
            name,
            invoke: Box::new(invoke),
            success: StageReport::always,
        }
    }

    /// Replace the success predicate.
    #[must_use]
    pub fn with_success(mut self, success: fn(&StageReport) -> bool) -> Self {
        self.success = success;
        self
    }

    /// The stage's name.
    #[must_use]
    pub const fn name(&self) -> StageName {
        self.name
    }
}

impl fmt::Debug for Stage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every stage succeeded.
    AllStagesCompleted,
    /// A stage failed; later stages did not run.
    HaltedAtStage {
        /// The failing stage.
        stage: StageName,
        /// Its error or rejected report.
        diagnostic: String,
    },
}

impl PipelineOutcome {
    /// Whether every stage completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::AllStagesCompleted)
    }
}

/// Runs stages in order, halting on the first failure.
#[derive(Debug, Default)]
pub struct Orchestrator<'a> {
    stages: Vec<Stage<'a>>,
}

impl<'a> Orchestrator<'a> {
    /// An orchestrator with no stages.
    #[must_use]
    pub const fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage.
    #[must_use]
    pub fn stage(mut self, stage: Stage<'a>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Stage names, in order.
    #[must_use]
    pub fn names(&self) -> Vec<StageName> {
        self.stages.iter().map(Stage::name).collect()
    }

    /// Run every stage, consuming the orchestrator.
    pub fn run(self) -> PipelineOutcome {
        let total = self.stages.len();
        for (i, mut stage) in self.stages.into_iter().enumerate() {
            info!("[{}/{total}] {}", i + 1, stage.name);
            let diagnostic = match (stage.invoke)() {
                Ok(report) if (stage.success)(&report) => {
                    info!("{} done: {}", stage.name, report.detail);
                    continue;
                }
                Ok(report) => report.detail,
                Err(e) => e.to_string(),
            };
            error!("stopped at {}: {diagnostic}", stage.name);
            return PipelineOutcome::HaltedAtStage {
                stage: stage.name,
                diagnostic,
            };
        }
        info!("all stages completed");
        PipelineOutcome::AllStagesCompleted
    }
}

/// Enhance, split, describe, train and evaluate, with every variant in
/// `config` split, described, trained and evaluated in turn.
#[must_use]
pub fn standard_pipeline<'a>(
    layout: &'a ProjectLayout,
    config: &'a ProjectConfig,
    enhance_request: &'a EnhanceRequest,
    date: NaiveDate,
    cancel: &'a CancelToken,
) -> Orchestrator<'a> {
    Orchestrator::new()
        .stage(
            Stage::new(StageName::Enhance, move || {
                // Later stages read the config; reject it before any output.
                config.validate()?;
                let summary = enhance(enhance_request, cancel)?;
                Ok(StageReport {
                    detail: format!(
                        "{} processed, {} missing labels, {} failed",
                        summary.processed,
                        summary.missing_labels,
                        summary.failed(),
                    ),
                    succeeded: summary.processed,
                    failed: summary.failed(),
                })
            })
            .with_success(StageReport::any_succeeded),
        )
        .stage(Stage::new(StageName::Split, move || {
            let summaries = split_variants(layout, config)?;
            let detail = config
                .variants
                .iter()
                .zip(&summaries)
                .map(|(v, s)| {
                    format!(
                        "{v}: {}/{}/{}",
                        s.train.images, s.val.images, s.test.images
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            Ok(StageReport::done(detail))
        }))
        .stage(Stage::new(StageName::DescribeDataset, move || {
            let written = describe_variants(layout, config)?;
            Ok(StageReport::done(format!("{} descriptors", written.len())))
        }))
        .stage(Stage::new(StageName::Train, move || {
            let mut runs = Vec::new();
            for variant in &config.variants {
                runs.push(train(layout, config, variant, date)?.run.to_string());
            }
            Ok(StageReport::done(runs.join(", ")))
        }))
        .stage(Stage::new(StageName::Evaluate, move || {
            let mut models = Vec::new();
            for variant in &config.variants {
                models.push(evaluate(layout, config, variant)?.run.to_string());
            }
            Ok(StageReport::done(format!("evaluated {}", models.join(", "))))
        }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::error::SetupError;

    #[test]
    fn all_stages_run_in_order() {
        let log = RefCell::new(Vec::new());
        let step = |name: StageName| {
            let log = &log;
            Stage::new(name, move || {
                log.borrow_mut().push(name);
                Ok(StageReport::done("ok"))
            })
        };
        let outcome = Orchestrator::new()
            .stage(step(StageName::Enhance))
            .stage(step(StageName::Split))
            .stage(step(StageName::Train))
            .run();
        assert_eq!(outcome, PipelineOutcome::AllStagesCompleted);
        assert_eq!(
            *log.borrow(),
            [StageName::Enhance, StageName::Split, StageName::Train]
        );
    }

    #[test]
    fn error_halts_immediately() {
        let later_ran = RefCell::new(false);
        let outcome = Orchestrator::new()
            .stage(Stage::new(StageName::Split, || Ok(StageReport::done("ok"))))
            .stage(Stage::new(StageName::DescribeDataset, || {
                Err(SetupError::NoClasses {
                    path: "classes.txt".into(),
                }
                .into())
            }))
            .stage(Stage::new(StageName::Train, || {
                *later_ran.borrow_mut() = true;
                Ok(StageReport::done("ok"))
            }))
            .run();

        match outcome {
            PipelineOutcome::HaltedAtStage { stage, diagnostic } => {
                assert_eq!(stage, StageName::DescribeDataset);
                assert!(diagnostic.contains("classes.txt"), "{diagnostic}");
            }
            PipelineOutcome::AllStagesCompleted => unreachable!("pipeline should halt"),
        }
        assert!(!*later_ran.borrow());
    }

    #[test]
    fn rejected_report_halts_with_its_detail() {
        let outcome = Orchestrator::new()
            .stage(
                Stage::new(StageName::Enhance, || {
                    Ok(StageReport {
                        detail: "0 processed, 3 failed".to_owned(),
                        succeeded: 0,
                        failed: 3,
                    })
                })
                .with_success(StageReport::any_succeeded),
            )
            .stage(Stage::new(StageName::Split, || Ok(StageReport::done("ok"))))
            .run();
        assert_eq!(
            outcome,
            PipelineOutcome::HaltedAtStage {
                stage: StageName::Enhance,
                diagnostic: "0 processed, 3 failed".to_owned(),
            }
        );
    }

    #[test]
    fn empty_pipeline_completes() {
        assert!(Orchestrator::new().run().is_success());
    }

    #[test]
    fn standard_pipeline_order() {
        let layout = ProjectLayout::new(std::path::Path::new("."), &ProjectConfig::default());
        let config = ProjectConfig::default();
        let request = EnhanceRequest::from_layout(&layout, "raw", "enhanced");
        let cancel = CancelToken::new();
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let pipeline = standard_pipeline(&layout, &config, &request, date, &cancel);
        assert_eq!(
            pipeline.names(),
            [
                StageName::Enhance,
                StageName::Split,
                StageName::DescribeDataset,
                StageName::Train,
                StageName::Evaluate,
            ]
        );
    }
}
