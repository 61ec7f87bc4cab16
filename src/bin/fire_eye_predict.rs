//! fire_eye_predict - batch prediction over a directory of images
//!
//! Writes one annotated copy of every input image, plus `args.toml` run
//! metadata, to `<project>/<name>` (default `runs/blind_test_output`).
//! Reruns overwrite earlier outputs unless `--no-exist-ok` is given.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use fire_eye::batch::{run_batch, BatchOptions};
use fire_eye::detect::build_registry;
use fire_eye::render::Annotator;
use fire_eye::ui::Ui;
use fire_eye::{FireEyeConfig, RiskLevel};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Image file or directory of images.
    #[arg(long, env = "FIRE_EYE_SOURCE")]
    source: Option<PathBuf>,
    /// Confidence threshold (default 0.25).
    #[arg(long)]
    conf: Option<f32>,
    /// Model input size (default 640).
    #[arg(long)]
    imgsz: Option<u32>,
    /// Parent directory for run outputs (default "runs").
    #[arg(long)]
    project: Option<PathBuf>,
    /// Run directory name (default "blind_test_output").
    #[arg(long)]
    name: Option<String>,
    /// Write into a fresh run directory instead of overwriting.
    #[arg(long)]
    no_exist_ok: bool,
    /// Also write YOLO-format label files under labels/.
    #[arg(long)]
    save_txt: bool,
    /// Detector backend: tract or stub.
    #[arg(long)]
    backend: Option<String>,
    /// ONNX model path.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Terminal output: auto, plain or pretty.
    #[arg(long)]
    ui: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = FireEyeConfig::load()?;
    apply_args(&mut cfg, &args);
    cfg.validate()?;

    let ui = Ui::from_args(args.ui.as_deref(), std::io::stderr().is_terminal());

    let registry = {
        let _stage = ui.stage("load detector");
        build_registry(&cfg)?
    };
    let backend = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;
    let mut detector = backend
        .lock()
        .map_err(|_| anyhow!("detector lock poisoned"))?;
    log::info!(
        "backend={}, conf={}, imgsz={}, classes={}",
        detector.name(),
        cfg.detector.confidence_threshold,
        cfg.detector.image_size,
        detector.class_names().join(",")
    );
    {
        let _stage = ui.stage("warm up");
        detector.warm_up()?;
    }

    let annotator = Annotator::new(&cfg.render)?;
    let options = BatchOptions::from(&cfg.batch);
    let report = run_batch(&mut *detector, &annotator, &cfg.detector, &options, &ui)?;

    let count = |risk: RiskLevel| {
        report
            .images
            .iter()
            .filter(|outcome| outcome.completeness.risk == risk)
            .count()
    };
    log::info!(
        "{} images: {} safe, {} moderate risk, {} high risk",
        report.images.len(),
        count(RiskLevel::Safe),
        count(RiskLevel::Moderate),
        count(RiskLevel::High)
    );
    println!("{}", report.output_dir.display());
    Ok(())
}

fn apply_args(cfg: &mut FireEyeConfig, args: &Args) {
    if let Some(source) = &args.source {
        cfg.batch.source = source.clone();
    }
    if let Some(conf) = args.conf {
        cfg.detector.confidence_threshold = conf;
    }
    if let Some(imgsz) = args.imgsz {
        cfg.detector.image_size = imgsz;
    }
    if let Some(project) = &args.project {
        cfg.batch.project = project.clone();
    }
    if let Some(name) = &args.name {
        cfg.batch.name = name.clone();
    }
    if args.no_exist_ok {
        cfg.batch.exist_ok = false;
    }
    if args.save_txt {
        cfg.batch.save_txt = true;
    }
    if let Some(backend) = &args.backend {
        cfg.backend = backend.clone();
    }
    if let Some(model) = &args.model {
        cfg.detector.model_path = model.clone();
    }
}
