//! Bounded worker pool for the enhancement engine.
//!
//! A feeder thread pushes record indices into a bounded channel sized to
//! the worker count; workers pull from it, run the engine, and send each
//! result back to the calling thread, which aggregates counts and logs
//! progress. Completion order is arbitrary but the aggregate counts are
//! not.
//!
//! Panics inside the engine are caught per item and reported as write
//! failures, so one bad image cannot take down the pool.

use std::num::NonZeroUsize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam::channel;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::{EnhancementResult, Enhancer, Outcome};
use crate::error::ItemError;
use crate::record::ImageRecord;

/// Cooperative cancellation flag, checked between items.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the pool to stop. Items already started run to completion.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether [`cancel`](Self::cancel) was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Aggregate counts for one enhancement run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnhanceSummary {
    /// Images written, with or without a label.
    pub processed: usize,
    /// Processed images that had no label file.
    pub missing_labels: usize,
    /// Images that could not be read or decoded.
    pub read_failed: usize,
    /// Images that could not be encoded or written.
    pub write_failed: usize,
    /// Images never started because the run was cancelled.
    pub cancelled: usize,
    /// Output image directory.
    pub out_images: PathBuf,
    /// Output label directory.
    pub out_labels: PathBuf,
}

impl EnhanceSummary {
    /// Read plus write failures.
    #[must_use]
    pub const fn failed(&self) -> usize {
        self.read_failed + self.write_failed
    }

    /// Every record that reached a classification.
    #[must_use]
    pub const fn completed(&self) -> usize {
        self.processed + self.failed()
    }

    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Processed => self.processed += 1,
            Outcome::LabelMissing => {
                self.processed += 1;
                self.missing_labels += 1;
            }
            Outcome::ReadFailed(_) => self.read_failed += 1,
            Outcome::WriteFailed(_) => self.write_failed += 1,
        }
    }
}

/// Runs the engine over many records with bounded concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPool {
    workers: NonZeroUsize,
    progress_interval: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(None)
    }
}

impl WorkerPool {
    /// Completed items between progress log lines.
    pub const DEFAULT_PROGRESS_INTERVAL: usize = 100;

    /// A pool with `workers` threads, or one per available hardware
    /// thread when `None`.
    #[must_use]
    pub fn new(workers: Option<NonZeroUsize>) -> Self {
        let workers = workers
            .or_else(|| thread::available_parallelism().ok())
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            workers,
            progress_interval: Self::DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Change how often progress is logged. Zero disables progress lines.
    #[must_use]
    pub const fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Number of worker threads.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers.get()
    }

    /// Enhance every record, returning aggregate counts.
    ///
    /// Each record is handed to exactly one worker. Records not yet
    /// started when `cancel` fires are counted as cancelled.
    pub fn run(
        &self,
        records: &[ImageRecord],
        engine: &Enhancer<'_>,
        cancel: &CancelToken,
    ) -> EnhanceSummary {
        self.run_with(records, engine, cancel, |_| {})
    }

    /// Like [`run`](Self::run), also passing each result to `on_result`
    /// on the calling thread.
    pub fn run_with<F>(
        &self,
        records: &[ImageRecord],
        engine: &Enhancer<'_>,
        cancel: &CancelToken,
        mut on_result: F,
    ) -> EnhanceSummary
    where
        F: FnMut(&EnhancementResult),
    {
        let total = records.len();
        let workers = self.workers.get().min(total.max(1));
        let mut summary = EnhanceSummary {
            out_images: engine.dirs().images.clone(),
            out_labels: engine.dirs().labels.clone(),
            ..EnhanceSummary::default()
        };

        let (task_tx, task_rx) = channel::bounded::<usize>(workers);
        let (result_tx, result_rx) = channel::unbounded::<EnhancementResult>();

        thread::scope(|scope| {
            scope.spawn(move || {
                for index in 0..total {
                    if cancel.is_cancelled() || task_tx.send(index).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..workers {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for index in task_rx {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let record = &records[index];
                        let result = enhance_guarded(engine, record);
                        if result_tx.send(result).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(task_rx);
            drop(result_tx);

            for result in result_rx {
                summary.record(&result.outcome);
                log_result(&result);
                on_result(&result);

                let done = summary.completed();
                if self.progress_interval > 0 && done % self.progress_interval == 0 {
                    info!("progress: {done}/{total}");
                }
            }
        });

        summary.cancelled = total - summary.completed();
        summary
    }
}

/// Run the engine on one record, turning a panic into a failed outcome.
fn enhance_guarded(engine: &Enhancer<'_>, record: &ImageRecord) -> EnhancementResult {
    catch_unwind(AssertUnwindSafe(|| engine.enhance(record))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_owned());
        EnhancementResult {
            stem: record.stem.clone(),
            source: record.image.clone(),
            outcome: Outcome::WriteFailed(ItemError::Panicked {
                path: record.image.clone(),
                message,
            }),
            image: None,
            label: None,
            compare: None,
        }
    })
}

fn log_result(result: &EnhancementResult) {
    match &result.outcome {
        Outcome::Processed => debug!("ok {}", result.source.display()),
        Outcome::LabelMissing => warn!("missing label for {}", result.stem),
        Outcome::ReadFailed(e) | Outcome::WriteFailed(e) => {
            warn!("{}: {e}", result.outcome.kind());
        }
    }
}
