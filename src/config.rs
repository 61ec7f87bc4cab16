use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::equipment::REQUIRED_EQUIPMENT;

const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_MODEL_PATH: &str = "best.onnx";
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IMAGE_SIZE: u32 = 640;
const DEFAULT_IOU: f32 = 0.7;
const DEFAULT_MAX_DETECTIONS: usize = 300;
const DEFAULT_DASHBOARD_ADDR: &str = "127.0.0.1:8501";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_TTS_COMMAND: &str = "espeak-ng";
const DEFAULT_TTS_RATE: u32 = 160;
const DEFAULT_LINE_WIDTH: u32 = 3;
const DEFAULT_FONT_SIZE: f32 = 18.0;
const DEFAULT_SOURCE: &str = "data/test/images";
const DEFAULT_PROJECT: &str = "runs";
const DEFAULT_RUN_NAME: &str = "blind_test_output";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct FireEyeConfigFile {
    backend: Option<String>,
    detector: Option<DetectorConfigFile>,
    dashboard: Option<DashboardConfigFile>,
    voice: Option<VoiceConfigFile>,
    render: Option<RenderConfigFile>,
    batch: Option<BatchConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    class_names: Option<Vec<String>>,
    confidence_threshold: Option<f32>,
    image_size: Option<u32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DashboardConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct VoiceConfigFile {
    enabled: Option<bool>,
    command: Option<String>,
    rate: Option<u32>,
    voice: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RenderConfigFile {
    font_path: Option<PathBuf>,
    font_size: Option<f32>,
    line_width: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct BatchConfigFile {
    source: Option<PathBuf>,
    project: Option<PathBuf>,
    name: Option<String>,
    exist_ok: Option<bool>,
    save_txt: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct FireEyeConfig {
    /// Detector backend name (`tract` or `stub`).
    pub backend: String,
    pub detector: DetectorSettings,
    pub dashboard: DashboardSettings,
    pub voice: VoiceSettings,
    pub render: RenderSettings,
    pub batch: BatchSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorSettings {
    pub model_path: PathBuf,
    /// Class names indexed by model class id.
    pub class_names: Vec<String>,
    pub confidence_threshold: f32,
    pub image_size: u32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub addr: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct VoiceSettings {
    /// Initial state of the dashboard's voice toggle.
    pub enabled: bool,
    pub command: String,
    /// Speaking rate in words per minute.
    pub rate: u32,
    pub voice: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub line_width: u32,
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub source: PathBuf,
    pub project: PathBuf,
    pub name: String,
    pub exist_ok: bool,
    pub save_txt: bool,
}

impl Default for FireEyeConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            detector: DetectorSettings::default(),
            dashboard: DashboardSettings {
                addr: DEFAULT_DASHBOARD_ADDR.to_string(),
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            voice: VoiceSettings {
                enabled: true,
                command: DEFAULT_TTS_COMMAND.to_string(),
                rate: DEFAULT_TTS_RATE,
                voice: None,
            },
            render: RenderSettings {
                font_path: None,
                font_size: DEFAULT_FONT_SIZE,
                line_width: DEFAULT_LINE_WIDTH,
            },
            batch: BatchSettings {
                source: PathBuf::from(DEFAULT_SOURCE),
                project: PathBuf::from(DEFAULT_PROJECT),
                name: DEFAULT_RUN_NAME.to_string(),
                exist_ok: true,
                save_txt: false,
            },
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            class_names: REQUIRED_EQUIPMENT.iter().map(|s| s.to_string()).collect(),
            confidence_threshold: DEFAULT_CONFIDENCE,
            image_size: DEFAULT_IMAGE_SIZE,
            iou_threshold: DEFAULT_IOU,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

impl FireEyeConfig {
    /// Defaults, then the file named by `FIRE_EYE_CONFIG`, then `FIRE_EYE_*`
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FIRE_EYE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FireEyeConfigFile) -> Self {
        let mut cfg = Self::default();
        if let Some(backend) = file.backend {
            cfg.backend = backend;
        }
        if let Some(det) = file.detector {
            let d = &mut cfg.detector;
            if let Some(model_path) = det.model_path {
                d.model_path = model_path;
            }
            if let Some(class_names) = det.class_names {
                d.class_names = class_names;
            }
            d.confidence_threshold = det.confidence_threshold.unwrap_or(d.confidence_threshold);
            d.image_size = det.image_size.unwrap_or(d.image_size);
            d.iou_threshold = det.iou_threshold.unwrap_or(d.iou_threshold);
            d.max_detections = det.max_detections.unwrap_or(d.max_detections);
        }
        if let Some(dash) = file.dashboard {
            if let Some(addr) = dash.addr {
                cfg.dashboard.addr = addr;
            }
            if let Some(limit) = dash.max_upload_bytes {
                cfg.dashboard.max_upload_bytes = limit;
            }
        }
        if let Some(voice) = file.voice {
            cfg.voice.enabled = voice.enabled.unwrap_or(cfg.voice.enabled);
            cfg.voice.rate = voice.rate.unwrap_or(cfg.voice.rate);
            if let Some(command) = voice.command {
                cfg.voice.command = command;
            }
            cfg.voice.voice = voice.voice.or(cfg.voice.voice);
        }
        if let Some(render) = file.render {
            cfg.render.font_path = render.font_path.or(cfg.render.font_path);
            cfg.render.font_size = render.font_size.unwrap_or(cfg.render.font_size);
            cfg.render.line_width = render.line_width.unwrap_or(cfg.render.line_width);
        }
        if let Some(batch) = file.batch {
            let b = &mut cfg.batch;
            if let Some(source) = batch.source {
                b.source = source;
            }
            if let Some(project) = batch.project {
                b.project = project;
            }
            if let Some(name) = batch.name {
                b.name = name;
            }
            b.exist_ok = batch.exist_ok.unwrap_or(b.exist_ok);
            b.save_txt = batch.save_txt.unwrap_or(b.save_txt);
        }
        cfg
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(model) = non_empty_env("FIRE_EYE_MODEL") {
            self.detector.model_path = PathBuf::from(model);
        }
        if let Some(backend) = non_empty_env("FIRE_EYE_BACKEND") {
            self.backend = backend;
        }
        if let Some(conf) = non_empty_env("FIRE_EYE_CONF") {
            self.detector.confidence_threshold = conf
                .parse()
                .map_err(|_| anyhow!("FIRE_EYE_CONF must be a number between 0 and 1"))?;
        }
        if let Some(imgsz) = non_empty_env("FIRE_EYE_IMGSZ") {
            self.detector.image_size = imgsz
                .parse()
                .map_err(|_| anyhow!("FIRE_EYE_IMGSZ must be a positive integer"))?;
        }
        if let Some(addr) = non_empty_env("FIRE_EYE_DASHBOARD_ADDR") {
            self.dashboard.addr = addr;
        }
        if let Some(voice) = non_empty_env("FIRE_EYE_VOICE") {
            self.voice.enabled = parse_bool(&voice)
                .ok_or_else(|| anyhow!("FIRE_EYE_VOICE must be one of 1/0/true/false/on/off"))?;
        }
        if let Some(command) = non_empty_env("FIRE_EYE_TTS_COMMAND") {
            self.voice.command = command;
        }
        if let Some(font) = non_empty_env("FIRE_EYE_FONT") {
            self.render.font_path = Some(PathBuf::from(font));
        }
        Ok(())
    }

    pub fn validate(&mut self) -> Result<()> {
        self.backend = self.backend.trim().to_lowercase();
        self.detector.validate()?;
        if self.dashboard.max_upload_bytes == 0 {
            return Err(anyhow!("dashboard.max_upload_bytes must be greater than zero"));
        }
        if self.voice.rate == 0 {
            return Err(anyhow!("voice.rate must be greater than zero"));
        }
        if self.render.line_width == 0 {
            return Err(anyhow!("render.line_width must be greater than zero"));
        }
        if self.render.font_size <= 0.0 || !self.render.font_size.is_finite() {
            return Err(anyhow!("render.font_size must be positive"));
        }
        if self.batch.name.trim().is_empty() {
            return Err(anyhow!("batch.name must not be empty"));
        }
        Ok(())
    }
}

impl DetectorSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(anyhow!(
                "confidence threshold {} is outside 0..1",
                self.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(anyhow!("iou threshold {} is outside 0..1", self.iou_threshold));
        }
        if self.image_size == 0 || self.image_size % 32 != 0 {
            return Err(anyhow!(
                "image size {} must be a positive multiple of 32",
                self.image_size
            ));
        }
        if self.max_detections == 0 {
            return Err(anyhow!("max_detections must be greater than zero"));
        }
        if self.class_names.is_empty() {
            return Err(anyhow!("class_names must list at least one class"));
        }
        if self.class_names.iter().any(|name| name.trim().is_empty()) {
            return Err(anyhow!("class_names must not contain empty names"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<FireEyeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
