// ============================================================
// Layer 4 — Mask Sources
// ============================================================
// Two implementations of the MaskSource trait:
//
//   MaskFolder     — irregular masks stored as images on disk.
//                    A mask is picked for each load from an RNG
//                    seeded with (seed, index, draw), so the
//                    pairing is random but reproducible.
//
//   RandomBoxMasks — rectangular holes generated in memory,
//                    used when no mask directory is supplied.
//
// Both return 1.0 for known pixels and 0.0 for holes.

use anyhow::{Context, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::{Path, PathBuf};

use crate::data::loader::{load_mask, ImageFolder};
use crate::domain::traits::MaskSource;

/// Mix the base seed with the sample index and the draw number
fn index_rng(seed: u64, index: usize, draw: u64) -> StdRng {
    StdRng::seed_from_u64(
        seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
             ^ draw.wrapping_mul(0xC2B2_AE3D_27D4_EB4F),
    )
}

// ─── MaskFolder ───────────────────────────────────────────────────────────────
pub struct MaskFolder {
    paths: Vec<PathBuf>,
    seed:  u64,
}

impl MaskFolder {
    pub fn scan(root: impl AsRef<Path>, seed: u64) -> Result<Self> {
        let root  = root.as_ref();
        let paths = ImageFolder::scan(root)
            .with_context(|| format!("Cannot read mask directory '{}'", root.display()))?
            .into_paths();
        if paths.is_empty() {
            anyhow::bail!("Mask directory '{}' contains no images", root.display());
        }
        tracing::info!("Loaded {} mask files from '{}'", paths.len(), root.display());
        Ok(Self { paths, seed })
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

impl MaskSource for MaskFolder {
    fn mask(&self, index: usize, draw: u64, size: usize) -> Result<Vec<f32>> {
        let pick = index_rng(self.seed, index, draw).gen_range(0..self.paths.len());
        load_mask(&self.paths[pick], size)
    }
}

// ─── RandomBoxMasks ───────────────────────────────────────────────────────────
/// Rectangular holes drawn from a seeded RNG.
pub struct RandomBoxMasks {
    seed:      u64,
    max_boxes: usize,
}

impl RandomBoxMasks {
    pub fn new(seed: u64) -> Self {
        Self { seed, max_boxes: 4 }
    }

    #[cfg(test)]
    pub fn with_max_boxes(mut self, max_boxes: usize) -> Self {
        self.max_boxes = max_boxes.max(1);
        self
    }
}

impl MaskSource for RandomBoxMasks {
    fn mask(&self, index: usize, draw: u64, size: usize) -> Result<Vec<f32>> {
        if size == 0 {
            anyhow::bail!("Mask size must be positive");
        }
        let mut rng  = index_rng(self.seed, index, draw);
        let mut mask = vec![1.0f32; size * size];

        // Each box side is at most half the image side, so a single
        // box never covers more than a quarter of the image.
        let max_side = (size / 2).max(1);
        let boxes    = rng.gen_range(1..=self.max_boxes);
        let budget   = size * size / 2;
        let mut holes = 0usize;

        for _ in 0..boxes {
            let h  = rng.gen_range(1..=max_side);
            let w  = rng.gen_range(1..=max_side);
            let y0 = rng.gen_range(0..=size - h);
            let x0 = rng.gen_range(0..=size - w);

            for y in y0..y0 + h {
                for x in x0..x0 + w {
                    let px = &mut mask[y * size + x];
                    if *px == 1.0 {
                        if holes >= budget {
                            continue;
                        }
                        *px = 0.0;
                        holes += 1;
                    }
                }
            }
        }
        Ok(mask)
    }
}
