//! Presentation: annotated images and dashboard HTML.

mod annotate;
pub mod html;

pub use annotate::{class_color, encode_jpeg, save_image, to_data_uri, Annotator};
