//! Batch prediction over a directory of images.
//!
//! Each image is decoded, run through the detector, annotated and written to
//! the run directory under its original file name. Reruns into the same
//! directory overwrite earlier outputs.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::{BatchSettings, DetectorSettings};
use crate::detect::{Detection, DetectionSet, DetectorBackend};
use crate::equipment::CompletenessResult;
use crate::render::{save_image, Annotator};
use crate::source::{collect_images, open_image};
use crate::ui::Ui;

pub const RUN_METADATA_FILE: &str = "args.toml";
pub const LABELS_DIR: &str = "labels";

#[derive(Clone, Debug)]
pub struct BatchOptions {
    pub source: PathBuf,
    pub project: PathBuf,
    pub name: String,
    /// Reuse `project/name` when it exists instead of picking a fresh name.
    pub exist_ok: bool,
    /// Also write YOLO-format label files.
    pub save_txt: bool,
}

impl From<&BatchSettings> for BatchOptions {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            source: settings.source.clone(),
            project: settings.project.clone(),
            name: settings.name.clone(),
            exist_ok: settings.exist_ok,
            save_txt: settings.save_txt,
        }
    }
}

#[derive(Debug, Serialize)]
struct RunMetadata<'a> {
    task: &'static str,
    mode: &'static str,
    backend: &'a str,
    source: &'a Path,
    save_dir: &'a Path,
    save_txt: bool,
    images: usize,
    #[serde(flatten)]
    detector: &'a DetectorSettings,
}

#[derive(Clone, Debug)]
pub struct ImageOutcome {
    pub source: PathBuf,
    pub output: PathBuf,
    pub detections: usize,
    pub completeness: CompletenessResult,
}

#[derive(Clone, Debug)]
pub struct BatchReport {
    pub output_dir: PathBuf,
    pub images: Vec<ImageOutcome>,
}

/// Directory a run writes into.
///
/// With `exist_ok` this is always `project/name`; otherwise the first of
/// `name`, `name2`, `name3`, ... that does not exist yet.
pub fn resolve_output_dir(project: &Path, name: &str, exist_ok: bool) -> PathBuf {
    let base = project.join(name);
    if exist_ok || !base.exists() {
        return base;
    }
    (2..)
        .map(|n| project.join(format!("{name}{n}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(base)
}

/// Run detection over every image in `options.source`.
///
/// The first failure (unreadable source, undecodable image, unwritable
/// output) aborts the run.
pub fn run_batch(
    detector: &mut dyn DetectorBackend,
    annotator: &Annotator,
    settings: &DetectorSettings,
    options: &BatchOptions,
    ui: &Ui,
) -> Result<BatchReport> {
    let images = collect_images(&options.source)?;
    let output_dir = resolve_output_dir(&options.project, &options.name, options.exist_ok);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    if options.save_txt {
        std::fs::create_dir_all(output_dir.join(LABELS_DIR))?;
    }
    write_run_metadata(&output_dir, detector.name(), settings, options, images.len())?;

    let total = images.len();
    let progress = ui.progress(total as u64);
    let mut outcomes = Vec::with_capacity(total);
    for (idx, path) in images.iter().enumerate() {
        let image = open_image(path)?;
        let started = Instant::now();
        let detections = detector.detect(&image)?;
        let elapsed = started.elapsed();

        let completeness = detections.completeness();
        log::info!(
            "image {}/{} {}: {}x{} {}, {:.1}ms",
            idx + 1,
            total,
            path.display(),
            image.width(),
            image.height(),
            describe_counts(&detections),
            elapsed.as_secs_f64() * 1000.0
        );
        log::info!(
            "  risk level {} ({}), missing: {}",
            completeness.risk_level(),
            completeness.risk_label(),
            if completeness.missing.is_empty() {
                "none".to_string()
            } else {
                completeness
                    .missing
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        );

        let file_name = path
            .file_name()
            .with_context(|| format!("{} has no file name", path.display()))?;
        let output = output_dir.join(file_name);
        let annotated = annotator.annotate(&image, &detections);
        save_image(&annotated, &output)?;

        if options.save_txt && !detections.is_empty() {
            let stem = path.file_stem().unwrap_or(file_name);
            let label_path = output_dir
                .join(LABELS_DIR)
                .join(Path::new(stem).with_extension("txt"));
            std::fs::write(&label_path, label_lines(&detections))
                .with_context(|| format!("failed to write {}", label_path.display()))?;
        }

        progress.advance(&file_name.to_string_lossy());
        outcomes.push(ImageOutcome {
            source: path.clone(),
            output,
            detections: detections.len(),
            completeness,
        });
    }
    progress.finish();

    log::info!("results saved to {}", output_dir.display());
    Ok(BatchReport {
        output_dir,
        images: outcomes,
    })
}

fn write_run_metadata(
    output_dir: &Path,
    backend: &str,
    settings: &DetectorSettings,
    options: &BatchOptions,
    images: usize,
) -> Result<()> {
    let metadata = RunMetadata {
        task: "detect",
        mode: "predict",
        backend,
        source: &options.source,
        save_dir: output_dir,
        save_txt: options.save_txt,
        images,
        detector: settings,
    };
    let body = toml::to_string(&metadata).context("failed to serialize run metadata")?;
    let path = output_dir.join(RUN_METADATA_FILE);
    std::fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))
}

/// `"1 FireExtinguisher, 2 ToolBox"` or `"(no detections)"`.
fn describe_counts(detections: &DetectionSet) -> String {
    if detections.is_empty() {
        return "(no detections)".to_string();
    }
    detections
        .class_counts()
        .iter()
        .map(|(label, count)| format!("{count} {label}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// YOLO label file body: `class cx cy w h` per line, normalised to the image.
pub fn label_lines(detections: &DetectionSet) -> String {
    let mut body = String::new();
    for detection in &detections.detections {
        let _ = writeln!(body, "{}", label_line(detection, detections));
    }
    body
}

fn label_line(detection: &Detection, set: &DetectionSet) -> String {
    let w = set.image_width.max(1) as f32;
    let h = set.image_height.max(1) as f32;
    let b = &detection.bbox;
    format!(
        "{} {:.6} {:.6} {:.6} {:.6}",
        detection.class_id,
        (b.x1 + b.x2) / 2.0 / w,
        (b.y1 + b.y2) / 2.0 / h,
        b.width() / w,
        b.height() / h
    )
}
