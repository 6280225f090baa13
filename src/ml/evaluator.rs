// ============================================================
// Layer 5 — Evaluator
// ============================================================
// Runs an evaluation-mode model on the first few validation
// samples and writes the input / mask / output / composite /
// ground-truth grid as a PNG.
//
// The model passed in must already be in evaluation mode: for
// a training model that means `model.valid()`, which moves it
// to the inner (non-autodiff) backend and makes batch norm use
// its running statistics.

use anyhow::Result;
use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    prelude::*,
};
use std::path::Path;

use crate::data::{batcher::InpaintBatcher, dataset::InpaintDataset};
use crate::infra::image_io::save_grid;
use crate::ml::model::PConvUNet;

/// Summary of one evaluation pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalReport {
    /// Number of images in the grid
    pub count: usize,
    /// PSNR of the composite against ground truth, in dB
    pub psnr: f64,
}

/// Evaluate `model` on up to `count` samples of `dataset` and save the grid to `filename`.
///
/// Returns None (and writes nothing) when no sample can be loaded.
pub fn evaluate<B: Backend>(
    model:    &PConvUNet<B>,
    dataset:  &InpaintDataset,
    count:    usize,
    device:   &B::Device,
    filename: &Path,
) -> Result<Option<EvalReport>> {
    let samples: Vec<_> = (0..dataset.len().min(count))
        .filter_map(|i| dataset.get(i))
        .collect();
    if samples.is_empty() {
        tracing::warn!("Validation set is empty; skipping evaluation");
        return Ok(None);
    }
    let n    = samples.len();
    let size = dataset.image_size();

    let batch = InpaintBatcher::<B>::new(device.clone()).batch(samples);
    let (output, _) = model.forward(batch.input.clone(), batch.mask.clone());

    let inverse = batch.mask.ones_like() - batch.mask.clone();
    let comp = batch.mask.clone() * batch.input.clone() + inverse * output.clone();

    let mse = (comp.clone() - batch.gt.clone())
        .powf_scalar(2.0)
        .mean()
        .into_scalar()
        .elem::<f64>();
    let psnr = psnr_from_mse(mse);

    let rows = vec![
        to_host(batch.input)?,
        to_host(batch.mask)?,
        to_host(output)?,
        to_host(comp)?,
        to_host(batch.gt)?,
    ];
    save_grid(&rows, n, size, filename)?;

    tracing::info!("Evaluation: {} images, PSNR {:.2} dB → '{}'", n, psnr, filename.display());
    Ok(Some(EvalReport { count: n, psnr }))
}

/// PSNR for signals in [0, 1]; infinite when the images match exactly
pub fn psnr_from_mse(mse: f64) -> f64 {
    if mse <= 0.0 {
        f64::INFINITY
    } else {
        -10.0 * mse.log10()
    }
}

fn to_host<B: Backend>(tensor: Tensor<B, 4>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Cannot read tensor data: {e:?}"))
}
