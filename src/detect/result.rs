use serde::Serialize;

use crate::equipment::{self, CompletenessResult};

/// Axis-aligned box in pixel coordinates of the source image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Clamp to `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let w = width as f32;
        let h = height as f32;
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }
}

/// One detected object.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// All detections for one image.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DetectionSet {
    pub image_width: u32,
    pub image_height: u32,
    pub detections: Vec<Detection>,
}

impl DetectionSet {
    pub fn new(image_width: u32, image_height: u32, detections: Vec<Detection>) -> Self {
        Self {
            image_width,
            image_height,
            detections,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// `(label, confidence)` pairs in detection order.
    pub fn label_confidences(&self) -> impl Iterator<Item = (&str, f32)> + '_ {
        self.detections
            .iter()
            .map(|d| (d.label.as_str(), d.confidence))
    }

    /// Per-label instance counts, sorted by label.
    pub fn class_counts(&self) -> Vec<(String, usize)> {
        let mut counts = std::collections::BTreeMap::<&str, usize>::new();
        for detection in &self.detections {
            *counts.entry(detection.label.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(label, count)| (label.to_string(), count))
            .collect()
    }

    pub fn completeness(&self) -> CompletenessResult {
        equipment::evaluate(self.label_confidences())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, confidence: f32) -> Detection {
        Detection {
            class_id: 0,
            label: label.to_string(),
            confidence,
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        }
    }

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);

        let half = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&half) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_boxes_have_zero_iou() {
        let point = BoundingBox::new(1.0, 1.0, 1.0, 1.0);
        assert_eq!(point.iou(&point), 0.0);
    }

    #[test]
    fn clamp_keeps_box_inside_image() {
        let b = BoundingBox::new(-5.0, -1.0, 120.0, 50.0).clamp_to(100, 40);
        assert_eq!(b, BoundingBox::new(0.0, 0.0, 100.0, 40.0));
    }

    #[test]
    fn counts_and_completeness_use_labels() {
        let set = DetectionSet::new(
            64,
            64,
            vec![det("ToolBox", 0.9), det("ToolBox", 0.4), det("OxygenTank", 0.7)],
        );
        assert_eq!(
            set.class_counts(),
            vec![("OxygenTank".to_string(), 1), ("ToolBox".to_string(), 2)]
        );
        let result = set.completeness();
        assert_eq!(result.risk_level(), 1);
        assert!(result.missing.contains("FireExtinguisher"));
    }
}
