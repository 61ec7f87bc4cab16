//! FIRE-EYE safety equipment console
//!
//! Runs a pretrained YOLOv8 detector over images and checks each image for
//! the required safety equipment (fire extinguisher, tool box, oxygen tank).
//!
//! # Module Structure
//!
//! - `equipment`: required-equipment check and risk classification
//! - `detect`: detector backends, detection types, YOLOv8 post-processing
//! - `source`: image files and uploads
//! - `render`: annotated images and dashboard HTML
//! - `speech`: spoken summaries
//! - `pipeline`: per-image detect/evaluate/annotate/speak flow
//! - `batch`: batch prediction into a results directory
//! - `dashboard`: single-threaded web dashboard
//! - `config`, `ui`: configuration and terminal output

pub mod batch;
pub mod config;
pub mod dashboard;
pub mod detect;
pub mod equipment;
pub mod pipeline;
pub mod render;
pub mod source;
pub mod speech;
pub mod ui;

pub use config::FireEyeConfig;
pub use detect::{BackendRegistry, Detection, DetectionSet, DetectorBackend};
pub use equipment::{evaluate, CompletenessResult, RiskLevel, Severity, REQUIRED_EQUIPMENT};
pub use pipeline::{Inspection, Inspector};
