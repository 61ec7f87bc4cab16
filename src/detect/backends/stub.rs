use anyhow::Result;
use image::DynamicImage;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection, DetectionSet};

/// Detection the stub reports for every image.
///
/// The box is given in normalized `0..1` coordinates and scaled to each
/// image's dimensions.
#[derive(Clone, Debug)]
pub struct ScriptedDetection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Stub backend for testing and model-less demo runs.
pub struct StubBackend {
    class_names: Vec<String>,
    script: Vec<ScriptedDetection>,
    calls: u64,
}

impl StubBackend {
    pub fn new(class_names: Vec<String>) -> Self {
        Self {
            class_names,
            script: Vec::new(),
            calls: 0,
        }
    }

    /// Report `labels` (each must name a known class) with the given
    /// confidence, laid out side by side across the image.
    pub fn with_labels(mut self, labels: &[(&str, f32)]) -> Self {
        let count = labels.len().max(1) as f32;
        for (i, (label, confidence)) in labels.iter().enumerate() {
            let class_id = self
                .class_names
                .iter()
                .position(|name| name == label)
                .unwrap_or(self.class_names.len());
            if class_id == self.class_names.len() {
                self.class_names.push(label.to_string());
            }
            let x1 = i as f32 / count;
            self.script.push(ScriptedDetection {
                class_id,
                confidence: *confidence,
                bbox: BoundingBox::new(x1 + 0.02, 0.1, x1 + 1.0 / count - 0.02, 0.9),
            });
        }
        self
    }

    /// Number of images seen so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<DetectionSet> {
        self.calls += 1;
        let (width, height) = (image.width(), image.height());
        let (w, h) = (width as f32, height as f32);
        let detections = self
            .script
            .iter()
            .map(|s| Detection {
                class_id: s.class_id,
                label: self.class_names[s.class_id].clone(),
                confidence: s.confidence,
                bbox: BoundingBox::new(s.bbox.x1 * w, s.bbox.y1 * h, s.bbox.x2 * w, s.bbox.y2 * h),
            })
            .collect();
        Ok(DetectionSet::new(width, height, detections))
    }
}
