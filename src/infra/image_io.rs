// ============================================================
// Layer 6 — Image Output
// ============================================================
// Turns CHW float buffers back into PNG files. Used by the
// evaluator to write the visualisation grid:
//
//   row 0: masked input
//   row 1: mask
//   row 2: raw model output
//   row 3: composite (known pixels from input, holes from output)
//   row 4: ground truth
//
// Each row holds the batch side by side.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use std::{fs, path::Path};

/// Paint one CHW image with values in [0, 1] into `canvas` at (x0, y0).
fn blit_chw(canvas: &mut RgbImage, chw: &[f32], size: usize, x0: u32, y0: u32) {
    let plane = size * size;
    for y in 0..size {
        for x in 0..size {
            let offset = y * size + x;
            let px = |c: usize| (chw[c * plane + offset].clamp(0.0, 1.0) * 255.0).round() as u8;
            canvas.put_pixel(x0 + x as u32, y0 + y as u32, Rgb([px(0), px(1), px(2)]));
        }
    }
}

/// Lay out `rows` of batched CHW images as a grid and save it as PNG.
///
/// Every row must hold `count` images of `3 * size * size` floats.
pub fn save_grid(rows: &[Vec<f32>], count: usize, size: usize, path: &Path) -> Result<()> {
    let image_len = 3 * size * size;
    if let Some(bad) = rows.iter().position(|r| r.len() != count * image_len) {
        anyhow::bail!(
            "Grid row {} has {} values, expected {}",
            bad,
            rows[bad].len(),
            count * image_len
        );
    }

    let mut canvas = RgbImage::new((count * size) as u32, (rows.len() * size) as u32);
    for (r, row) in rows.iter().enumerate() {
        for (i, chw) in row.chunks_exact(image_len).enumerate() {
            blit_chw(&mut canvas, chw, size, (i * size) as u32, (r * size) as u32);
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }
    canvas
        .save(path)
        .with_context(|| format!("Cannot write image '{}'", path.display()))?;
    Ok(())
}
