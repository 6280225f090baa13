// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The data pipeline needs a hole mask for every training image.
// Masks can come from a folder of mask images or be generated
// on the fly; the dataset only sees this trait.

use anyhow::Result;

// ─── MaskSource ───────────────────────────────────────────────────────────────
/// Anything that can produce a square hole mask for a dataset index.
///
/// Implementations:
///   - MaskFolder     → loads mask images from disk
///   - RandomBoxMasks → draws rectangular holes from a seeded RNG
///
/// `draw` counts how many times the index has been loaded, so an
/// image gets a new hole every epoch. The returned Vec is row-major,
/// `size * size` long, with 1.0 for known pixels and 0.0 for holes.
/// The same (index, draw) pair must always give the same mask.
pub trait MaskSource: Send + Sync {
    fn mask(&self, index: usize, draw: u64, size: usize) -> Result<Vec<f32>>;
}
