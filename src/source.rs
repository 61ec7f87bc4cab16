//! Image sources.
//!
//! Batch runs read image files from a local directory (or a single file);
//! the dashboard receives uploaded or webcam-captured images as in-memory
//! buffers.

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Extensions picked up when scanning a directory.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["bmp", "jpeg", "jpg", "png", "tif", "tiff", "webp"];

/// Extensions the dashboard uploader accepts.
pub const UPLOAD_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// List the images under `path`.
///
/// A directory yields its image files (non-recursive) sorted by path; a file
/// yields itself.
pub fn collect_images(path: &Path) -> Result<Vec<PathBuf>> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("image source {} does not exist", path.display()))?;
    if meta.is_file() {
        if !has_extension(path, &IMAGE_EXTENSIONS) {
            return Err(anyhow!("{} is not a supported image file", path.display()));
        }
        return Ok(vec![path.to_path_buf()]);
    }

    let mut images = Vec::new();
    for entry in std::fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry = entry?;
        let entry_path = entry.path();
        if entry.file_type()?.is_file() && has_extension(&entry_path, &IMAGE_EXTENSIONS) {
            images.push(entry_path);
        }
    }
    if images.is_empty() {
        return Err(anyhow!("no images found in {}", path.display()));
    }
    images.sort();
    Ok(images)
}

/// Decode an image file from disk.
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("failed to decode image {}", path.display()))
}

/// Image received from the dashboard.
#[derive(Clone, Debug)]
pub struct UploadedImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    /// Accept an upload, keeping only the base name of `name`.
    pub fn new(name: &str, bytes: Vec<u8>) -> Result<Self> {
        let name = validate_upload_name(name)?;
        if bytes.is_empty() {
            return Err(anyhow!("upload {} is empty", name));
        }
        Ok(Self { name, bytes })
    }

    pub fn decode(&self) -> Result<DynamicImage> {
        image::load_from_memory(&self.bytes)
            .with_context(|| format!("failed to decode uploaded image {}", self.name))
    }
}

/// Reduce `name` to its base name and check it is a jpg/jpeg/png file name.
pub fn validate_upload_name(name: &str) -> Result<String> {
    static UPLOAD_NAME_RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    let re = UPLOAD_NAME_RE
        .get_or_init(|| Regex::new(r"(?i)^[\w .()+-]{1,128}\.(jpe?g|png)$"))
        .as_ref()
        .map_err(|err| anyhow!("invalid upload name pattern: {}", err))?;

    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim();
    if !re.is_match(base) {
        return Err(anyhow!(
            "unsupported upload name '{}': expected a {} file",
            base,
            UPLOAD_EXTENSIONS.join("/")
        ));
    }
    Ok(base.to_string())
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
}
