#![cfg(feature = "backend-tract")]

use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, RgbImage};
use tract_onnx::prelude::*;

use crate::config::DetectorSettings;
use crate::detect::backend::DetectorBackend;
use crate::detect::postprocess::{
    decode_yolov8, into_detection_set, letterbox, non_max_suppression,
};
use crate::detect::result::DetectionSet;

/// Tract-based backend running a YOLOv8 ONNX export.
///
/// The model must take a `[1, 3, size, size]` f32 input in `0..1` and emit the
/// standard `[1, 4 + nc, anchors]` detection head.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    class_names: Vec<String>,
    image_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
    max_detections: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, settings: &DetectorSettings) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = settings.image_size as usize;
        let started = Instant::now();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;
        log::info!(
            "loaded {} ({} classes, imgsz {}) in {}ms",
            model_path.display(),
            settings.class_names.len(),
            settings.image_size,
            started.elapsed().as_millis()
        );

        Ok(Self {
            model,
            class_names: settings.class_names.clone(),
            image_size: settings.image_size,
            confidence_threshold: settings.confidence_threshold,
            iou_threshold: settings.iou_threshold,
            max_detections: settings.max_detections,
        })
    }

    fn build_input(&self, canvas: &RgbImage) -> Tensor {
        let size = self.image_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn detect(&mut self, image: &DynamicImage) -> Result<DetectionSet> {
        let (canvas, lb) = letterbox(image, self.image_size);
        let input = self.build_input(&canvas);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let dims = scores.shape().to_vec();
        let data: Vec<f32> = scores.iter().copied().collect();

        let candidates = decode_yolov8(
            &data,
            &dims,
            self.class_names.len(),
            self.confidence_threshold,
        )?;
        let kept = non_max_suppression(candidates, self.iou_threshold, self.max_detections);
        Ok(into_detection_set(
            kept,
            &lb,
            image.width(),
            image.height(),
            &self.class_names,
        ))
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = DynamicImage::ImageRgb8(RgbImage::new(self.image_size, self.image_size));
        self.detect(&blank).map(|_| ())
    }
}
