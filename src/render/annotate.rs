use std::io::Cursor;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::config::RenderSettings;
use crate::detect::DetectionSet;

const PALETTE: [[u8; 3]; 20] = [
    [0xFF, 0x38, 0x38],
    [0xFF, 0x9D, 0x97],
    [0xFF, 0x70, 0x1F],
    [0xFF, 0xB2, 0x1D],
    [0xCF, 0xD2, 0x31],
    [0x48, 0xF9, 0x0A],
    [0x92, 0xCC, 0x17],
    [0x3D, 0xDB, 0x86],
    [0x1A, 0x93, 0x34],
    [0x00, 0xD4, 0xBB],
    [0x2C, 0x99, 0xA8],
    [0x00, 0xC2, 0xFF],
    [0x34, 0x45, 0x93],
    [0x64, 0x73, 0xFF],
    [0x00, 0x18, 0xEC],
    [0x84, 0x38, 0xFF],
    [0x52, 0x00, 0x85],
    [0xCB, 0x38, 0xFF],
    [0xFF, 0x95, 0xC8],
    [0xFF, 0x37, 0xC7],
];

const CAPTION_TEXT: Rgb<u8> = Rgb([255, 255, 255]);

/// Box colour for a class id.
pub fn class_color(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}

/// Draws detection boxes, and captions when a font is available.
pub struct Annotator {
    font: Option<FontVec>,
    font_size: f32,
    line_width: u32,
}

impl Annotator {
    pub fn new(settings: &RenderSettings) -> Result<Self> {
        let font = match &settings.font_path {
            Some(path) => {
                let data = std::fs::read(path)
                    .with_context(|| format!("failed to read font {}", path.display()))?;
                let font = FontVec::try_from_vec(data)
                    .map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))?;
                Some(font)
            }
            None => {
                log::debug!("no font configured; boxes will be drawn without captions");
                None
            }
        };
        Ok(Self {
            font,
            font_size: settings.font_size,
            line_width: settings.line_width.max(1),
        })
    }

    /// Boxes only.
    pub fn without_captions(line_width: u32) -> Self {
        Self {
            font: None,
            font_size: 0.0,
            line_width: line_width.max(1),
        }
    }

    pub fn annotate(&self, image: &DynamicImage, detections: &DetectionSet) -> RgbImage {
        let mut canvas = image.to_rgb8();
        for detection in &detections.detections {
            let color = class_color(detection.class_id);
            let b = detection.bbox;
            let x = b.x1.round() as i32;
            let y = b.y1.round() as i32;
            let w = (b.width().round() as u32).max(1);
            let h = (b.height().round() as u32).max(1);
            for i in 0..self.line_width {
                let rect = Rect::at(x - i as i32, y - i as i32).of_size(w + 2 * i, h + 2 * i);
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }

            if let Some(font) = &self.font {
                let scale = PxScale::from(self.font_size);
                let text = format!("{} {:.2}", detection.label, detection.confidence);
                let (tw, th) = text_size(scale, font, &text);
                let top = if y - th as i32 - 4 >= 0 {
                    y - th as i32 - 4
                } else {
                    y
                };
                let background = Rect::at(x, top).of_size(tw.max(1) + 4, th.max(1) + 4);
                draw_filled_rect_mut(&mut canvas, background, color);
                draw_text_mut(&mut canvas, CAPTION_TEXT, x + 2, top + 2, scale, font, &text);
            }
        }
        canvas
    }
}

/// Write `image` to `path`; the format follows the file extension.
pub fn save_image(image: &RgbImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg)
        .context("failed to encode jpeg")?;
    Ok(bytes)
}

/// JPEG-encode `image` as a `data:` URI for inline display.
pub fn to_data_uri(image: &RgbImage) -> Result<String> {
    let bytes = encode_jpeg(image)?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};

    fn detections() -> DetectionSet {
        DetectionSet::new(
            64,
            48,
            vec![Detection {
                class_id: 2,
                label: "OxygenTank".into(),
                confidence: 0.81,
                bbox: BoundingBox::new(10.0, 10.0, 30.0, 30.0),
            }],
        )
    }

    #[test]
    fn boxes_are_drawn_in_class_colour() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(64, 48));
        let annotated = Annotator::without_captions(1).annotate(&image, &detections());
        assert_eq!(annotated.dimensions(), (64, 48));
        assert_eq!(annotated.get_pixel(10, 10), &class_color(2));
        assert_eq!(annotated.get_pixel(20, 20), &Rgb([0, 0, 0]));
    }

    #[test]
    fn boxes_touching_the_border_do_not_panic() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(16, 16));
        let set = DetectionSet::new(
            16,
            16,
            vec![Detection {
                class_id: 0,
                label: "ToolBox".into(),
                confidence: 0.5,
                bbox: BoundingBox::new(0.0, 0.0, 16.0, 0.0),
            }],
        );
        let annotated = Annotator::without_captions(4).annotate(&image, &set);
        assert_eq!(annotated.get_pixel(0, 0), &class_color(0));
    }

    #[test]
    fn data_uri_carries_jpeg() {
        let uri = to_data_uri(&RgbImage::new(8, 8)).unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn missing_font_is_an_error() {
        let settings = RenderSettings {
            font_path: Some("/nonexistent/font.ttf".into()),
            font_size: 12.0,
            line_width: 2,
        };
        assert!(Annotator::new(&settings).is_err());
    }
}
