//! Integration tests: enhancement over a small on-disk dataset.
//!
//! Checks that every input gets exactly one classification, that output
//! images and labels stay paired, and that dry runs write nothing.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use detprep_dataset::record::{DiscoveryOptions, discover};
use detprep_dataset::stages::{EnhanceRequest, enhance};
use detprep_dataset::{
    CancelToken, EnhanceOptions, Enhancer, OutputDirs, SetupError, WorkerPool,
};
use detprep_pipeline::{Filter, RgbImage};

/// Records every image it sees, keyed by a per-image marker pixel.
struct Recording {
    seen: Mutex<Vec<[u8; 3]>>,
}

impl Recording {
    fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
        }
    }
}

impl Filter for Recording {
    fn apply(&self, image: &RgbImage) -> RgbImage {
        self.seen.lock().unwrap().push(image.get_pixel(0, 0).0);
        image.clone()
    }
}

struct Dataset {
    dir: tempfile::TempDir,
}

impl Dataset {
    /// `n` images; every third one unlabeled, and the stems listed in
    /// `corrupt` replaced by garbage bytes.
    fn new(n: u8, corrupt: &[u8]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("raw/images");
        let labels = dir.path().join("raw/labels");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&labels).unwrap();
        for i in 0..n {
            let path = images.join(format!("frame{i:03}.png"));
            if corrupt.contains(&i) {
                fs::write(&path, b"garbage").unwrap();
            } else {
                RgbImage::from_pixel(6, 5, image::Rgb([i, 255 - i, 7]))
                    .save(&path)
                    .unwrap();
            }
            if i % 3 != 0 {
                fs::write(
                    labels.join(format!("frame{i:03}.txt")),
                    format!("0 0.5 0.5 0.{i} 0.1\n"),
                )
                .unwrap();
            }
        }
        Self { dir }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn out_dirs(&self) -> OutputDirs {
        OutputDirs::new(self.path("enhanced/images"), self.path("enhanced/labels"))
    }

    fn request(&self, options: EnhanceOptions) -> EnhanceRequest {
        EnhanceRequest {
            in_images: self.path("raw/images"),
            in_labels: self.path("raw/labels"),
            out: self.out_dirs(),
            discovery: DiscoveryOptions::default(),
            filter: detprep_pipeline::FilterConfig::default(),
            options,
            workers: NonZeroUsize::new(3),
        }
    }
}

fn stems(dir: &Path) -> HashSet<String> {
    if !dir.exists() {
        return HashSet::new();
    }
    fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            e.unwrap()
                .path()
                .file_stem()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

fn file_count(dir: &Path) -> usize {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count()
}

#[test]
fn every_record_classified_once_and_filtered_once() {
    let ds = Dataset::new(30, &[4, 17]);
    let records = discover(
        &ds.path("raw/images"),
        &ds.path("raw/labels"),
        &DiscoveryOptions::default(),
    )
    .unwrap();
    assert_eq!(records.len(), 30);

    let filter = Recording::new();
    let engine = Enhancer::new(&filter, ds.out_dirs(), EnhanceOptions::default());
    engine.prepare().unwrap();
    let summary = WorkerPool::new(NonZeroUsize::new(4)).run(&records, &engine, &CancelToken::new());

    assert_eq!(summary.processed + summary.read_failed + summary.write_failed, 30);
    assert_eq!(summary.read_failed, 2);
    assert_eq!(summary.write_failed, 0);

    // Every decodable image went through the filter exactly once.
    let seen = filter.seen.into_inner().unwrap();
    let unique: HashSet<_> = seen.iter().copied().collect();
    assert_eq!(seen.len(), 28);
    assert_eq!(unique.len(), 28);
}

#[test]
fn outputs_are_paired_or_counted_missing() {
    let ds = Dataset::new(12, &[]);
    let summary = enhance(&ds.request(EnhanceOptions::default()), &CancelToken::new()).unwrap();

    let images = stems(&ds.path("enhanced/images"));
    let labels = stems(&ds.path("enhanced/labels"));

    assert_eq!(images.len(), 12);
    assert!(labels.is_subset(&images), "label without image");
    assert_eq!(images.difference(&labels).count(), summary.missing_labels);
    assert_eq!(summary.missing_labels, 4);

    // Labels are byte-for-byte copies.
    for stem in &labels {
        let name = format!("{stem}.txt");
        assert_eq!(
            fs::read(ds.path("enhanced/labels").join(&name)).unwrap(),
            fs::read(ds.path("raw/labels").join(&name)).unwrap(),
        );
    }
}

#[test]
fn dry_run_is_idempotent_and_writes_nothing() {
    let ds = Dataset::new(9, &[2]);
    let options = EnhanceOptions {
        dry_run: true,
        save_compare: true,
        ..EnhanceOptions::default()
    };
    let before = file_count(ds.dir.path());

    let first = enhance(&ds.request(options.clone()), &CancelToken::new()).unwrap();
    let second = enhance(&ds.request(options), &CancelToken::new()).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.processed, 8);
    assert_eq!(first.read_failed, 1);
    assert_eq!(file_count(ds.dir.path()), before);
    assert!(!ds.path("enhanced").exists());
}

#[test]
fn dry_run_matches_real_run_classification() {
    let ds = Dataset::new(9, &[5]);
    let dry = enhance(
        &ds.request(EnhanceOptions {
            dry_run: true,
            ..EnhanceOptions::default()
        }),
        &CancelToken::new(),
    )
    .unwrap();
    let real = enhance(&ds.request(EnhanceOptions::default()), &CancelToken::new()).unwrap();

    assert_eq!(
        (dry.processed, dry.missing_labels, dry.read_failed, dry.write_failed),
        (real.processed, real.missing_labels, real.read_failed, real.write_failed),
    );
}

#[test]
fn missing_label_directory_is_fatal() {
    let ds = Dataset::new(3, &[]);
    fs::remove_dir_all(ds.path("raw/labels")).unwrap();
    let result = enhance(&ds.request(EnhanceOptions::default()), &CancelToken::new());
    assert!(matches!(
        result,
        Err(SetupError::MissingDirectory { role: "input labels", .. })
    ));
    assert!(!ds.path("enhanced").exists());
}

#[test]
fn invalid_filter_config_is_fatal() {
    let ds = Dataset::new(3, &[]);
    let mut request = ds.request(EnhanceOptions::default());
    request.filter.sharpen.sigma = f32::NAN;
    assert!(matches!(
        enhance(&request, &CancelToken::new()),
        Err(SetupError::Filter(_))
    ));
}

#[test]
fn comparison_images_stay_out_of_the_output_images() {
    let ds = Dataset::new(4, &[]);
    let summary = enhance(
        &ds.request(EnhanceOptions {
            save_compare: true,
            ..EnhanceOptions::default()
        }),
        &CancelToken::new(),
    )
    .unwrap();
    assert_eq!(summary.processed, 4);
    assert_eq!(stems(&ds.path("enhanced/images")).len(), 4);
    assert_eq!(stems(&ds.path("enhanced/compare")).len(), 4);
}

#[cfg(unix)]
#[test]
fn non_utf8_file_name_is_counted_as_read_failure() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let ds = Dataset::new(3, &[]);
    let odd = ds
        .path("raw/images")
        .join(OsStr::from_bytes(b"frame\xff.png"));
    RgbImage::new(6, 5)
        .save_with_format(&odd, image::ImageFormat::Png)
        .unwrap();

    let summary = enhance(&ds.request(EnhanceOptions::default()), &CancelToken::new()).unwrap();

    assert_eq!(summary.completed(), 4);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.read_failed, 1);
    assert_eq!(stems(&ds.path("enhanced/images")).len(), 3);
}
