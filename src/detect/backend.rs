use anyhow::Result;
use image::DynamicImage;

use crate::detect::result::DetectionSet;

/// Object detector backend.
///
/// Implementations own whatever model state they need and are driven from a
/// single thread at a time. Boxes in the returned set are expressed in pixel
/// coordinates of `image`.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class names indexed by class id.
    fn class_names(&self) -> &[String];

    /// Run detection on a decoded image.
    fn detect(&mut self, image: &DynamicImage) -> Result<DetectionSet>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
