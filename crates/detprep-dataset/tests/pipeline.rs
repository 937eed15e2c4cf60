//! Integration tests: the full enhance → evaluate pipeline with stand-in
//! trainer and evaluator commands.

#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use detprep_dataset::command::CommandTemplate;
use detprep_dataset::orchestrator::standard_pipeline;
use detprep_dataset::stages::{EnhanceRequest, evaluate, train};
use detprep_dataset::{CancelToken, PipelineOutcome, ProjectConfig, ProjectLayout, StageError, StageName};
use detprep_pipeline::RgbImage;

/// Writes `<project>/<run>/weights/best.pt`.
fn fake_trainer() -> CommandTemplate {
    CommandTemplate::new(
        "sh",
        &[
            "-c",
            r#"mkdir -p "$1/$2/weights" && echo weights > "$1/$2/weights/best.pt""#,
            "trainer",
            "{project}",
            "{run}",
        ],
    )
}

/// Appends the evaluated model path to `evaluated.log` in the project root.
fn fake_evaluator() -> CommandTemplate {
    CommandTemplate::new(
        "sh",
        &[
            "-c",
            r#"test -f "$1" && test -f "$2" && echo "$1" >> evaluated.log"#,
            "evaluator",
            "{model}",
            "{data}",
        ],
    )
}

struct Project {
    dir: tempfile::TempDir,
    config: ProjectConfig,
}

impl Project {
    fn new(images: u8) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("dataset/raw");
        fs::create_dir_all(raw.join("images")).unwrap();
        fs::create_dir_all(raw.join("labels")).unwrap();
        for i in 0..images {
            RgbImage::from_fn(16, 16, |x, y| {
                image::Rgb([i.wrapping_mul(20), (x * 15) as u8, (y * 15) as u8])
            })
            .save(raw.join(format!("images/f{i:02}.png")))
            .unwrap();
            fs::write(raw.join(format!("labels/f{i:02}.txt")), "0 0.5 0.5 0.2 0.2\n").unwrap();
        }
        fs::write(dir.path().join("dataset/classes.txt"), "car\nperson\n").unwrap();

        let config = ProjectConfig {
            trainer: fake_trainer(),
            evaluator: fake_evaluator(),
            ..ProjectConfig::default()
        };
        Self { dir, config }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn layout(&self) -> ProjectLayout {
        ProjectLayout::new(self.root(), &self.config)
    }

    fn run(&self, date: NaiveDate) -> PipelineOutcome {
        let layout = self.layout();
        let request = EnhanceRequest::from_layout(&layout, "raw", "enhanced");
        let cancel = CancelToken::new();
        standard_pipeline(&layout, &self.config, &request, date, &cancel).run()
    }

    fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.root().join("models"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn evaluated(&self) -> Vec<PathBuf> {
        fs::read_to_string(self.root().join("evaluated.log"))
            .unwrap_or_default()
            .lines()
            .map(PathBuf::from)
            .collect()
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
}

#[test]
fn pipeline_runs_every_stage() {
    let project = Project::new(10);
    assert_eq!(project.run(day(1)), PipelineOutcome::AllStagesCompleted);

    let root = project.root();
    assert_eq!(fs::read_dir(root.join("dataset/enhanced/images")).unwrap().count(), 10);
    for variant in ["raw", "enhanced"] {
        let splits = root.join("dataset/splits").join(variant);
        let counts: Vec<usize> = ["train", "val", "test"]
            .iter()
            .map(|s| fs::read_dir(splits.join(s).join("images")).unwrap().count())
            .collect();
        assert_eq!(counts, [8, 1, 1]);

        let descriptor =
            fs::read_to_string(root.join(format!("dataset/data_{variant}.yaml"))).unwrap();
        assert!(descriptor.contains("nc: 2"), "{descriptor}");
    }

    assert_eq!(
        project.models(),
        [
            "enhanced_2024_05_01_001_best.pt",
            "raw_2024_05_01_001_best.pt",
        ]
    );
    let evaluated = project.evaluated();
    assert_eq!(evaluated.len(), 2);
    assert!(evaluated[0].ends_with("raw_2024_05_01_001_best.pt"));
    assert!(evaluated[1].ends_with("enhanced_2024_05_01_001_best.pt"));
}

#[test]
fn repeated_training_gets_increasing_run_ids() {
    let project = Project::new(10);
    assert!(project.run(day(1)).is_success());

    let layout = project.layout();
    let second = train(&layout, &project.config, "raw", day(1)).unwrap();
    assert_eq!(second.run.to_string(), "raw_2024_05_01_002");
    let next_day = train(&layout, &project.config, "raw", day(2)).unwrap();
    assert_eq!(next_day.run.to_string(), "raw_2024_05_02_001");

    // Evaluation picks the newest run.
    let evaluated = evaluate(&layout, &project.config, "raw").unwrap();
    assert_eq!(evaluated.run, next_day.run);
    assert_eq!(evaluated.weights, next_day.weights);
}

#[test]
fn failing_trainer_halts_before_evaluation() {
    let mut project = Project::new(10);
    project.config.trainer = CommandTemplate::new("sh", &["-c", "exit 3"]);

    match project.run(day(1)) {
        PipelineOutcome::HaltedAtStage { stage, diagnostic } => {
            assert_eq!(stage, StageName::Train);
            assert!(diagnostic.contains("exit"), "{diagnostic}");
        }
        PipelineOutcome::AllStagesCompleted => unreachable!("trainer exit status was ignored"),
    }
    assert!(project.evaluated().is_empty());
    // Earlier stages still produced their outputs.
    assert!(project.root().join("dataset/data_raw.yaml").is_file());
}

#[test]
fn trainer_without_weights_is_a_failure() {
    let mut project = Project::new(10);
    project.config.trainer = CommandTemplate::new("true", &[]);

    match project.run(day(1)) {
        PipelineOutcome::HaltedAtStage { stage, diagnostic } => {
            assert_eq!(stage, StageName::Train);
            assert!(diagnostic.contains("best.pt"), "{diagnostic}");
        }
        PipelineOutcome::AllStagesCompleted => unreachable!("missing weights were ignored"),
    }
}

#[test]
fn missing_classes_halts_at_describe() {
    let project = Project::new(10);
    fs::remove_file(project.root().join("dataset/classes.txt")).unwrap();
    assert!(matches!(
        project.run(day(1)),
        PipelineOutcome::HaltedAtStage {
            stage: StageName::DescribeDataset,
            ..
        }
    ));
    assert!(!project.root().join("models").exists());
}

#[test]
fn no_readable_images_halts_at_enhance() {
    let project = Project::new(0);
    fs::write(project.root().join("dataset/raw/images/broken.png"), b"nope").unwrap();
    assert!(matches!(
        project.run(day(1)),
        PipelineOutcome::HaltedAtStage {
            stage: StageName::Enhance,
            ..
        }
    ));
    assert!(!project.root().join("dataset/splits").exists());
}

#[test]
fn invalid_split_ratio_halts_before_anything_is_written() {
    let mut project = Project::new(3);
    project.config.split.train = 2.0;
    let outcome = project.run(day(1));
    assert!(
        matches!(
            &outcome,
            PipelineOutcome::HaltedAtStage {
                stage: StageName::Enhance,
                diagnostic,
            } if diagnostic.contains("train=2")
        ),
        "{outcome:?}"
    );
    assert!(!project.root().join("dataset/enhanced").exists());
    assert!(!project.root().join("dataset/splits").exists());
}

#[test]
fn evaluating_without_a_model_fails() {
    let project = Project::new(10);
    assert!(project.run(day(1)).is_success());
    let layout = project.layout();
    fs::remove_dir_all(layout.models_dir()).unwrap();
    fs::create_dir_all(layout.models_dir()).unwrap();
    assert!(matches!(
        evaluate(&layout, &project.config, "enhanced"),
        Err(StageError::NoTrainedModel { .. })
    ));
}
