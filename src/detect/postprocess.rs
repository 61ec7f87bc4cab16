//! YOLOv8 pre- and post-processing shared by model backends.
//!
//! The detector head emits one column per anchor holding `cx, cy, w, h`
//! followed by one score per class (no objectness term). Coordinates are in
//! the letterboxed model input space and are mapped back onto the source
//! image after non-maximum suppression.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};

use crate::detect::result::{BoundingBox, Detection, DetectionSet};

/// Grey used for letterbox padding.
pub const PAD_VALUE: u8 = 114;

/// Scale and offset applied when fitting an image onto the square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let scale = (size as f32 / width.max(1) as f32).min(size as f32 / height.max(1) as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, size);
        Self {
            scale,
            pad_x: (size - scaled_width) / 2,
            pad_y: (size - scaled_height) / 2,
            scaled_width,
            scaled_height,
        }
    }

    /// Map a box from model input space back onto the source image.
    pub fn to_source(&self, bbox: &BoundingBox) -> BoundingBox {
        let px = self.pad_x as f32;
        let py = self.pad_y as f32;
        BoundingBox {
            x1: (bbox.x1 - px) / self.scale,
            y1: (bbox.y1 - py) / self.scale,
            x2: (bbox.x2 - px) / self.scale,
            y2: (bbox.y2 - py) / self.scale,
        }
    }
}

/// Resize `image` into a `size x size` canvas, preserving aspect ratio.
pub fn letterbox(image: &DynamicImage, size: u32) -> (RgbImage, Letterbox) {
    let rgb = image.to_rgb8();
    let lb = Letterbox::fit(rgb.width(), rgb.height(), size);
    let resized = if lb.scaled_width == rgb.width() && lb.scaled_height == rgb.height() {
        rgb
    } else {
        imageops::resize(&rgb, lb.scaled_width, lb.scaled_height, FilterType::Triangle)
    };
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::replace(&mut canvas, &resized, lb.pad_x as i64, lb.pad_y as i64);
    (canvas, lb)
}

/// Box proposal in model input space.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Read anchor proposals out of a raw YOLOv8 output tensor.
///
/// `dims` is the tensor shape, either `[4 + nc, N]` or the transposed
/// `[N, 4 + nc]`, optionally with a leading batch dimension of 1.
pub fn decode_yolov8(
    data: &[f32],
    dims: &[usize],
    num_classes: usize,
    threshold: f32,
) -> Result<Vec<Candidate>> {
    let dims = match dims {
        [1, rest @ ..] if rest.len() == 2 => rest,
        other => other,
    };
    let (rows, cols) = match dims {
        [rows, cols] => (*rows, *cols),
        other => return Err(anyhow!("unexpected detector output shape {:?}", other)),
    };
    if rows * cols != data.len() {
        return Err(anyhow!(
            "detector output holds {} values, shape {:?} needs {}",
            data.len(),
            dims,
            rows * cols
        ));
    }

    let channels = 4 + num_classes;
    let (anchors, channels_first) = if rows == channels {
        (cols, true)
    } else if cols == channels {
        (rows, false)
    } else {
        return Err(anyhow!(
            "detector output shape {:?} does not match {} classes",
            dims,
            num_classes
        ));
    };
    let at = |anchor: usize, attr: usize| {
        if channels_first {
            data[attr * cols + anchor]
        } else {
            data[anchor * cols + attr]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for class_id in 0..num_classes {
            let score = at(anchor, 4 + class_id);
            if score > best_score {
                best_score = score;
                best_class = class_id;
            }
        }
        if !best_score.is_finite() || best_score < threshold {
            continue;
        }
        let (cx, cy, w, h) = (at(anchor, 0), at(anchor, 1), at(anchor, 2), at(anchor, 3));
        candidates.push(Candidate {
            class_id: best_class,
            confidence: best_score,
            bbox: BoundingBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
        });
    }
    Ok(candidates)
}

/// Class-aware greedy non-maximum suppression.
///
/// Returns survivors in descending confidence order, at most
/// `max_detections` of them.
pub fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// Map surviving candidates onto the source image and attach class names.
pub fn into_detection_set(
    candidates: Vec<Candidate>,
    letterbox: &Letterbox,
    width: u32,
    height: u32,
    class_names: &[String],
) -> DetectionSet {
    let detections = candidates
        .into_iter()
        .map(|c| Detection {
            class_id: c.class_id,
            label: class_names
                .get(c.class_id)
                .cloned()
                .unwrap_or_else(|| format!("class{}", c.class_id)),
            confidence: c.confidence.clamp(0.0, 1.0),
            bbox: letterbox.to_source(&c.bbox).clamp_to(width, height),
        })
        .collect();
    DetectionSet::new(width, height, detections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(class_id: usize, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Candidate {
        Candidate {
            class_id,
            confidence,
            bbox: BoundingBox::new(x1, y1, x2, y2),
        }
    }

    #[test]
    fn letterbox_fits_wide_image() {
        let lb = Letterbox::fit(1280, 640, 640);
        assert_eq!(lb.scale, 0.5);
        assert_eq!((lb.scaled_width, lb.scaled_height), (640, 320));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 160));

        let mapped = lb.to_source(&BoundingBox::new(100.0, 160.0, 200.0, 260.0));
        assert_eq!(mapped, BoundingBox::new(200.0, 0.0, 400.0, 200.0));
    }

    #[test]
    fn letterbox_pads_with_grey() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 10, Rgb([255, 0, 0])));
        let (canvas, lb) = letterbox(&image, 32);
        assert_eq!(canvas.dimensions(), (32, 32));
        assert_eq!(lb.pad_y, 8);
        assert_eq!(canvas.get_pixel(0, 0), &Rgb([PAD_VALUE; 3]));
        assert_eq!(canvas.get_pixel(16, 16), &Rgb([255, 0, 0]));
    }

    #[test]
    fn decode_reads_channels_first_output() {
        // 2 classes, 3 anchors: rows = cx, cy, w, h, score0, score1
        let data = vec![
            10.0, 50.0, 90.0, // cx
            10.0, 50.0, 90.0, // cy
            4.0, 10.0, 2.0, // w
            4.0, 10.0, 2.0, // h
            0.9, 0.1, 0.2, // class 0
            0.05, 0.6, 0.1, // class 1
        ];
        let candidates = decode_yolov8(&data, &[1, 6, 3], 2, 0.25).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0], cand(0, 0.9, 8.0, 8.0, 12.0, 12.0));
        assert_eq!(candidates[1], cand(1, 0.6, 45.0, 45.0, 55.0, 55.0));
    }

    #[test]
    fn decode_accepts_transposed_output() {
        let data = vec![
            10.0, 10.0, 4.0, 4.0, 0.9, 0.05, //
            50.0, 50.0, 10.0, 10.0, 0.1, 0.6,
        ];
        let candidates = decode_yolov8(&data, &[2, 6], 2, 0.5).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].class_id, 1);
    }

    #[test]
    fn decode_rejects_mismatched_shape() {
        let data = vec![0.0; 12];
        assert!(decode_yolov8(&data, &[1, 4, 3], 3, 0.25).is_err());
        assert!(decode_yolov8(&data, &[1, 7, 3], 3, 0.25).is_err());
    }

    #[test]
    fn nms_suppresses_overlapping_boxes_of_same_class() {
        let kept = non_max_suppression(
            vec![
                cand(0, 0.6, 0.5, 0.5, 10.5, 10.5),
                cand(0, 0.9, 0.0, 0.0, 10.0, 10.0),
                cand(1, 0.5, 0.0, 0.0, 10.0, 10.0),
                cand(0, 0.4, 50.0, 50.0, 60.0, 60.0),
            ],
            0.7,
            300,
        );
        let confidences: Vec<f32> = kept.iter().map(|c| c.confidence).collect();
        assert_eq!(confidences, vec![0.9, 0.5, 0.4]);
    }

    #[test]
    fn nms_respects_max_detections() {
        let candidates = (0..10)
            .map(|i| cand(0, 0.1 * i as f32, i as f32 * 20.0, 0.0, i as f32 * 20.0 + 5.0, 5.0))
            .collect();
        let kept = non_max_suppression(candidates, 0.5, 3);
        assert_eq!(kept.len(), 3);
        assert!(kept[0].confidence >= kept[1].confidence);
    }

    #[test]
    fn detection_set_maps_names_and_clamps() {
        let lb = Letterbox::fit(100, 100, 100);
        let names = vec!["FireExtinguisher".to_string()];
        let set = into_detection_set(
            vec![cand(0, 0.8, -5.0, 0.0, 50.0, 120.0), cand(3, 0.3, 0.0, 0.0, 1.0, 1.0)],
            &lb,
            100,
            100,
            &names,
        );
        assert_eq!(set.detections[0].label, "FireExtinguisher");
        assert_eq!(set.detections[0].bbox, BoundingBox::new(0.0, 0.0, 50.0, 100.0));
        assert_eq!(set.detections[1].label, "class3");
    }
}
