// ============================================================
// Layer 4 — Image Loader
// ============================================================
// Finds training images on disk and decodes them into the
// flat float layout the batcher expects.
//
// Layouts used throughout the data layer:
//   RGB image → Vec<f32> of length 3 * size * size, CHW order,
//               values in [0, 1]
//   mask      → Vec<f32> of length size * size, row-major,
//               1.0 = known pixel, 0.0 = hole
//
// Reference: image crate documentation
//            walkdir crate documentation

use anyhow::{Context, Result};
use image::imageops::FilterType;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extensions accepted as images
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// A sorted list of decodable image files under a root directory.
#[derive(Debug, Clone)]
pub struct ImageFolder {
    paths: Vec<PathBuf>,
}

impl ImageFolder {
    /// Walk `root` recursively and collect every image file.
    ///
    /// Only headers are checked here. Files whose header cannot be read
    /// are skipped with a warning; files that fail later, while decoding
    /// pixel data, are handled by `InpaintDataset::get`.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            anyhow::bail!("Image directory '{}' does not exist", root.display());
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&root).follow_links(true) {
            let entry = entry
                .with_context(|| format!("Failed to walk '{}'", root.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || !has_image_extension(path) {
                continue;
            }
            match image::image_dimensions(path) {
                Ok(_)  => paths.push(path.to_path_buf()),
                Err(e) => tracing::warn!("Skipping unreadable image '{}': {}", path.display(), e),
            }
        }
        paths.sort();

        tracing::debug!("Found {} images under '{}'", paths.len(), root.display());
        Ok(Self { paths })
    }

    #[cfg(test)]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        self.paths
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decode an image, resize it to `size x size` and return CHW floats in [0, 1].
pub fn load_rgb(path: &Path, size: usize) -> Result<Vec<f32>> {
    let img = image::open(path)
        .with_context(|| format!("Cannot decode image '{}'", path.display()))?
        .resize_exact(size as u32, size as u32, FilterType::Triangle)
        .to_rgb8();

    let plane = size * size;
    let mut chw = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in img.enumerate_pixels() {
        let offset = y as usize * size + x as usize;
        for c in 0..3 {
            chw[c * plane + offset] = pixel[c] as f32 / 255.0;
        }
    }
    Ok(chw)
}

/// Decode a mask image (white = known, black = hole) into a binary plane.
///
/// Nearest-neighbour resizing keeps the mask binary.
pub fn load_mask(path: &Path, size: usize) -> Result<Vec<f32>> {
    let img = image::open(path)
        .with_context(|| format!("Cannot decode mask '{}'", path.display()))?
        .resize_exact(size as u32, size as u32, FilterType::Nearest)
        .to_luma8();

    Ok(img.pixels().map(|p| if p[0] > 127 { 1.0 } else { 0.0 }).collect())
}
