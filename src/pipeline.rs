//! Per-image inspection: detect, check equipment, annotate, speak.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use image::{DynamicImage, RgbImage};

use crate::detect::{DetectionSet, SharedBackend};
use crate::equipment::CompletenessResult;
use crate::render::Annotator;
use crate::speech::Speaker;

/// Everything derived from one image.
pub struct Inspection {
    pub detections: DetectionSet,
    pub completeness: CompletenessResult,
    pub annotated: RgbImage,
    pub summary: String,
    pub inference_time: Duration,
}

pub struct Inspector {
    detector: SharedBackend,
    annotator: Annotator,
    speaker: Box<dyn Speaker>,
}

impl Inspector {
    pub fn new(detector: SharedBackend, annotator: Annotator, speaker: Box<dyn Speaker>) -> Self {
        Self {
            detector,
            annotator,
            speaker,
        }
    }

    /// Run one image to completion. When `voice_enabled`, returns only after
    /// the summary has been spoken.
    pub fn inspect(&mut self, image: &DynamicImage, voice_enabled: bool) -> Result<Inspection> {
        let started = Instant::now();
        let detections = {
            let mut detector = self
                .detector
                .lock()
                .map_err(|_| anyhow!("detector lock poisoned"))?;
            detector.detect(image)?
        };
        let inference_time = started.elapsed();

        let completeness = detections.completeness();
        let annotated = self.annotator.annotate(image, &detections);
        let summary = completeness.spoken_summary();
        log::info!(
            "{} detections in {}ms, risk level {} ({})",
            detections.len(),
            inference_time.as_millis(),
            completeness.risk_level(),
            completeness.risk_label()
        );

        if voice_enabled {
            self.speaker.speak(&summary)?;
        }

        Ok(Inspection {
            detections,
            completeness,
            annotated,
            summary,
            inference_time,
        })
    }
}
