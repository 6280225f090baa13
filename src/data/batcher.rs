// ============================================================
// Layer 4 — Inpainting Batcher
// ============================================================
// Implements Burn's Batcher trait to stack InpaintSamples into
// image tensors of shape [batch, 3, size, size].
//
// All samples share one size (the dataset resizes on load), so
// flattening then reshaping is enough; no padding is needed.
//
// The masked input is computed here as gt * mask, so holes are
// zero in the tensor the model sees.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::{InpaintSample, IMAGE_CHANNELS};

/// A batch of inpainting examples ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct InpaintBatch<B: Backend> {
    /// Ground truth with holes zeroed, [batch, 3, H, W]
    pub input: Tensor<B, 4>,

    /// 1 = known pixel, 0 = hole, [batch, 3, H, W]
    pub mask: Tensor<B, 4>,

    /// Untouched ground truth, [batch, 3, H, W]
    pub gt: Tensor<B, 4>,
}

#[derive(Clone, Debug)]
pub struct InpaintBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> InpaintBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn stack(&self, planes: Vec<f32>, batch_size: usize, size: usize) -> Tensor<B, 4> {
        Tensor::<B, 4>::from_data(
            TensorData::new(planes, [batch_size, IMAGE_CHANNELS, size, size]),
            &self.device,
        )
    }
}

impl<B: Backend> Batcher<InpaintSample, InpaintBatch<B>> for InpaintBatcher<B> {
    fn batch(&self, items: Vec<InpaintSample>) -> InpaintBatch<B> {
        let batch_size = items.len();
        let size       = items.first().map(|s| s.size).unwrap_or(0);

        let gt_flat:   Vec<f32> = items.iter().flat_map(|s| s.gt.iter().copied()).collect();
        let mask_flat: Vec<f32> = items.iter().flat_map(|s| s.mask.iter().copied()).collect();

        let gt   = self.stack(gt_flat, batch_size, size);
        let mask = self.stack(mask_flat, batch_size, size);
        let input = gt.clone() * mask.clone();

        InpaintBatch { input, mask, gt }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn sample(value: f32, hole_at: usize) -> InpaintSample {
        let size = 2;
        let mut mask = vec![1.0; IMAGE_CHANNELS * size * size];
        for c in 0..IMAGE_CHANNELS {
            mask[c * size * size + hole_at] = 0.0;
        }
        InpaintSample { gt: vec![value; IMAGE_CHANNELS * size * size], mask, size }
    }

    #[test]
    fn test_batch_shapes_and_masked_input() {
        let batcher = InpaintBatcher::<TestBackend>::new(Default::default());
        let batch   = batcher.batch(vec![sample(0.5, 0), sample(0.25, 3)]);

        assert_eq!(batch.input.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.mask.dims(), [2, 3, 2, 2]);
        assert_eq!(batch.gt.dims(), [2, 3, 2, 2]);

        let input: Vec<f32> = batch.input.into_data().convert::<f32>().to_vec().unwrap();
        // First sample, first channel: hole at pixel 0
        assert_eq!(&input[0..4], &[0.0, 0.5, 0.5, 0.5]);
        // Second sample, first channel: hole at pixel 3
        assert_eq!(&input[12..16], &[0.25, 0.25, 0.25, 0.0]);
    }
}
