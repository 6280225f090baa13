use burn::data::dataset::Dataset;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use crate::data::loader::load_rgb;
use crate::domain::traits::MaskSource;

/// Number of colour channels in every image and mask
pub const IMAGE_CHANNELS: usize = 3;

/// One training example: a ground-truth image and its hole mask.
/// Both are CHW floats with `IMAGE_CHANNELS` planes of `size * size`.
/// The masked input is derived in the batcher.
#[derive(Debug, Clone)]
pub struct InpaintSample {
    pub gt:   Vec<f32>,
    pub mask: Vec<f32>,
    pub size: usize,
}

#[cfg(test)]
impl InpaintSample {
    /// Fraction of pixels that are holes
    pub fn hole_ratio(&self) -> f32 {
        let holes = self.mask.iter().filter(|&&v| v == 0.0).count();
        holes as f32 / self.mask.len().max(1) as f32
    }
}

pub struct InpaintDataset {
    images:     Vec<PathBuf>,
    masks:      Arc<dyn MaskSource>,
    image_size: usize,
    /// Loads so far per index; None keeps every index on draw 0
    draws:      Option<Mutex<HashMap<usize, u64>>>,
}

impl InpaintDataset {
    /// Dataset whose masks stay fixed per index (validation grids).
    pub fn new(images: Vec<PathBuf>, masks: Arc<dyn MaskSource>, image_size: usize) -> Self {
        Self { images, masks, image_size, draws: None }
    }

    /// Draw a new mask every time an index is loaded (training).
    pub fn with_fresh_masks(mut self) -> Self {
        self.draws = Some(Mutex::new(HashMap::new()));
        self
    }

    pub fn image_size(&self) -> usize { self.image_size }

    fn next_draw(&self, index: usize) -> u64 {
        let Some(draws) = &self.draws else {
            return 0;
        };
        let mut draws = draws.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = draws.entry(index).or_insert(0);
        let draw = *count;
        *count += 1;
        draw
    }

    fn load(&self, index: usize, draw: u64) -> anyhow::Result<InpaintSample> {
        let path = self.images.get(index)
            .ok_or_else(|| anyhow::anyhow!("Index {index} out of range"))?;
        let gt    = load_rgb(path, self.image_size)?;
        let plane = self.masks.mask(index, draw, self.image_size)?;

        // Single-channel mask → one copy per colour channel
        let mut mask = Vec::with_capacity(IMAGE_CHANNELS * plane.len());
        for _ in 0..IMAGE_CHANNELS {
            mask.extend_from_slice(&plane);
        }
        Ok(InpaintSample { gt, mask, size: self.image_size })
    }
}

impl Dataset<InpaintSample> for InpaintDataset {
    /// Burn's loaders stop an epoch at the first None, so a file that
    /// fails to decode is replaced by the next loadable image instead.
    fn get(&self, index: usize) -> Option<InpaintSample> {
        let len = self.images.len();
        if index >= len {
            return None;
        }
        let draw = self.next_draw(index);

        for offset in 0..len {
            let candidate = (index + offset) % len;
            match self.load(candidate, draw) {
                Ok(sample) => return Some(sample),
                Err(e) => tracing::warn!(
                    "Skipping unloadable sample {} ('{}'): {:#}",
                    candidate,
                    self.images[candidate].display(),
                    e
                ),
            }
        }

        tracing::error!("None of the {} images in the dataset can be loaded", len);
        None
    }

    fn len(&self) -> usize {
        self.images.len()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{batcher::InpaintBatcher, loader::ImageFolder, mask::RandomBoxMasks};
    use burn::{backend::NdArray, data::dataloader::DataLoaderBuilder};
    use image::{Rgb, RgbImage};
    use std::path::Path;

    fn write_images(dir: &Path, n: u8) -> Vec<PathBuf> {
        (0..n)
            .map(|i| {
                let p = dir.join(format!("{i}.png"));
                RgbImage::from_pixel(8, 8, Rgb([i * 60, 20, 30])).save(&p).unwrap();
                p
            })
            .collect()
    }

    /// Keep the PNG header readable but cut off the pixel data
    fn truncate(path: &Path) {
        let bytes = std::fs::read(path).unwrap();
        std::fs::write(path, &bytes[..bytes.len() - 20]).unwrap();
    }

    #[test]
    fn test_get_returns_full_sample() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        RgbImage::from_pixel(10, 6, Rgb([10, 20, 30])).save(&path).unwrap();

        let ds = InpaintDataset::new(vec![path], Arc::new(RandomBoxMasks::new(0)), 8);
        assert_eq!(ds.len(), 1);

        let sample = ds.get(0).unwrap();
        assert_eq!(sample.gt.len(), 3 * 64);
        assert_eq!(sample.mask.len(), 3 * 64);
        // Every channel shares the same mask plane
        assert_eq!(sample.mask[..64], sample.mask[64..128]);
        assert!(sample.hole_ratio() > 0.0);
        assert!(ds.get(1).is_none());
    }

    #[test]
    fn test_missing_file_yields_none() {
        let ds = InpaintDataset::new(
            vec![PathBuf::from("/no/such/image.png")],
            Arc::new(RandomBoxMasks::new(0)),
            8,
        );
        assert!(ds.get(0).is_none());
    }

    #[test]
    fn test_truncated_image_does_not_end_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_images(dir.path(), 4);
        truncate(&paths[1]);
        assert!(image::open(&paths[1]).is_err());

        let images = ImageFolder::scan(dir.path()).unwrap().into_paths();
        assert_eq!(images.len(), 4);
        let ds = InpaintDataset::new(images, Arc::new(RandomBoxMasks::new(0)), 8);
        for index in 0..4 {
            assert!(ds.get(index).is_some(), "index {index} ended the epoch");
        }

        let loader = DataLoaderBuilder::new(InpaintBatcher::<NdArray>::new(Default::default()))
            .batch_size(1)
            .build(ds);
        assert_eq!(loader.iter().count(), 4);
    }

    #[test]
    fn test_fixed_masks_repeat_per_index() {
        let dir = tempfile::tempdir().unwrap();
        let ds = InpaintDataset::new(write_images(dir.path(), 1), Arc::new(RandomBoxMasks::new(5)), 16);
        assert_eq!(ds.get(0).unwrap().mask, ds.get(0).unwrap().mask);
    }

    #[test]
    fn test_fresh_masks_change_between_loads() {
        let dir = tempfile::tempdir().unwrap();
        let ds = InpaintDataset::new(write_images(dir.path(), 1), Arc::new(RandomBoxMasks::new(5)), 16)
            .with_fresh_masks();
        let masks: Vec<Vec<f32>> = (0..5).map(|_| ds.get(0).unwrap().mask).collect();
        assert!(masks.iter().any(|m| *m != masks[0]));

        // Same seed, same sequence of draws
        let again = InpaintDataset::new(write_images(dir.path(), 1), Arc::new(RandomBoxMasks::new(5)), 16)
            .with_fresh_masks();
        assert_eq!(again.get(0).unwrap().mask, masks[0]);
    }
}
