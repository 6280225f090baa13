// ============================================================
// Layer 5 — Inpainting Loss
// ============================================================
// Computes the five terms of Liu et al. (2018):
//
//   comp  = mask * input + (1 - mask) * output
//   valid = L1(mask * output,       mask * gt)
//   hole  = L1((1 - mask) * output, (1 - mask) * gt)
//   perc  = Σ L1(φ(output), φ(gt)) + L1(φ(comp), φ(gt))
//   style = Σ L1(G(φ(output)), G(φ(gt))) + L1(G(φ(comp)), G(φ(gt)))
//   tv    = mean |∂x comp| + mean |∂y comp|
//
// φ is a frozen three-stage convolutional feature extractor and
// G the Gram matrix of a feature map normalised by C*H*W.
//
// Each term is returned separately; weighting happens in the
// trainer so the coefficients stay a config concern.
//
// Reference: Liu et al. (2018) Image Inpainting for Irregular
//            Holes Using Partial Convolutions
//            Johnson et al. (2016) Perceptual Losses

use anyhow::{Context, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    record::CompactRecorder,
    tensor::activation::relu,
};
use std::path::Path;

use crate::domain::losses::{LossBreakdown, LossCoefficients, LossTerm};

/// ImageNet channel statistics used to normalise extractor input
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD:  [f32; 3] = [0.229, 0.224, 0.225];

// ─── Feature extractor ────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct FeatureExtractorConfig {
    /// Channels of the first stage; stages use 1x, 2x and 4x this
    #[config(default = 64)]
    pub base_width: usize,
}

impl FeatureExtractorConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FeatureExtractor<B> {
        let widths = [self.base_width, self.base_width * 2, self.base_width * 4];
        let mut in_ch = 3;
        let stages = widths
            .iter()
            .map(|&out_ch| {
                let stage = FeatureStage {
                    conv1: conv3x3(in_ch, out_ch, device),
                    conv2: conv3x3(out_ch, out_ch, device),
                    pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
                };
                in_ch = out_ch;
                stage
            })
            .collect();
        FeatureExtractor { stages }
    }

    /// Build the extractor, load weights from `weights` when given, and freeze it.
    pub fn init_frozen<B: Backend>(
        &self,
        weights: Option<&Path>,
        device:  &B::Device,
    ) -> Result<FeatureExtractor<B>> {
        let extractor = self.init::<B>(device);
        let extractor = match weights {
            Some(path) => {
                tracing::info!("Loading feature extractor weights from '{}'", path.display());
                extractor
                    .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
                    .with_context(|| {
                        format!("Cannot load feature extractor weights '{}'", path.display())
                    })?
            }
            None => {
                tracing::warn!("No feature extractor weights given; using seeded random features");
                extractor
            }
        };
        Ok(extractor.no_grad())
    }
}

fn conv3x3<B: Backend>(in_ch: usize, out_ch: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_ch, out_ch], [3, 3])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init(device)
}

#[derive(Module, Debug)]
pub struct FeatureStage<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub pool: MaxPool2d,
}

impl<B: Backend> FeatureStage<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.conv1.forward(x));
        let x = relu(self.conv2.forward(x));
        self.pool.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    pub stages: Vec<FeatureStage<B>>,
}

impl<B: Backend> FeatureExtractor<B> {
    /// image: [N, 3, H, W] in [0, 1] → one feature map per stage
    pub fn forward(&self, image: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let device = image.device();
        let mean = Tensor::<B, 1>::from_floats(IMAGENET_MEAN, &device).reshape([1, 3, 1, 1]);
        let std  = Tensor::<B, 1>::from_floats(IMAGENET_STD,  &device).reshape([1, 3, 1, 1]);

        let mut x = (image - mean) / std;
        let mut features = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            x = stage.forward(x);
            features.push(x.clone());
        }
        features
    }
}

// ─── Loss terms ───────────────────────────────────────────────────────────────

/// Every loss term as a single-element tensor, still attached to the graph.
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    pub valid: Tensor<B, 1>,
    pub hole:  Tensor<B, 1>,
    pub tv:    Tensor<B, 1>,
    pub perc:  Tensor<B, 1>,
    pub style: Tensor<B, 1>,
}

impl<B: Backend> LossTerms<B> {
    pub fn get(&self, term: LossTerm) -> &Tensor<B, 1> {
        match term {
            LossTerm::Valid => &self.valid,
            LossTerm::Hole  => &self.hole,
            LossTerm::Tv    => &self.tv,
            LossTerm::Perc  => &self.perc,
            LossTerm::Style => &self.style,
        }
    }

    /// Σ coef[term] * term over every configured coefficient
    pub fn weighted_sum(&self, coefficients: &LossCoefficients) -> Tensor<B, 1> {
        let zero = Tensor::zeros([1], &self.valid.device());
        coefficients
            .iter()
            .fold(zero, |acc, (term, coef)| acc + self.get(term).clone().mul_scalar(coef))
    }

    /// Pull every term back to the host
    pub fn to_breakdown(&self) -> LossBreakdown {
        let mut breakdown = LossBreakdown::default();
        for term in LossTerm::ALL {
            breakdown.set(term, self.get(term).clone().into_scalar().elem::<f64>());
        }
        breakdown
    }
}

// ─── Criterion ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct InpaintingLoss<B: Backend> {
    extractor: FeatureExtractor<B>,
}

impl<B: Backend> InpaintingLoss<B> {
    pub fn new(extractor: FeatureExtractor<B>) -> Self {
        Self { extractor }
    }

    pub fn forward(
        &self,
        input:  Tensor<B, 4>,
        mask:   Tensor<B, 4>,
        output: Tensor<B, 4>,
        gt:     Tensor<B, 4>,
    ) -> LossTerms<B> {
        let inverse = mask.ones_like() - mask.clone();
        let comp = mask.clone() * input + inverse.clone() * output.clone();

        let hole  = l1(inverse.clone() * output.clone(), inverse * gt.clone());
        let valid = l1(mask.clone() * output.clone(), mask * gt.clone());

        let feat_out  = self.extractor.forward(output);
        let feat_comp = self.extractor.forward(comp.clone());
        let feat_gt   = self.extractor.forward(gt);

        let device = comp.device();
        let mut perc  = Tensor::<B, 1>::zeros([1], &device);
        let mut style = Tensor::<B, 1>::zeros([1], &device);
        for ((f_out, f_comp), f_gt) in feat_out.into_iter().zip(feat_comp).zip(feat_gt) {
            perc = perc
                + l1(f_out.clone(), f_gt.clone())
                + l1(f_comp.clone(), f_gt.clone());

            let g_gt = gram_matrix(f_gt);
            style = style
                + l1(gram_matrix(f_out), g_gt.clone())
                + l1(gram_matrix(f_comp), g_gt);
        }

        let tv = total_variation(comp);

        LossTerms { valid, hole, tv, perc, style }
    }
}

/// Mean absolute error
fn l1<B: Backend, const D: usize>(a: Tensor<B, D>, b: Tensor<B, D>) -> Tensor<B, 1> {
    (a - b).abs().mean()
}

/// [N, C, H, W] → [N, C, C], normalised by C*H*W
pub fn gram_matrix<B: Backend>(features: Tensor<B, 4>) -> Tensor<B, 3> {
    let [n, c, h, w] = features.dims();
    let flat = features.reshape([n, c, h * w]);
    let transposed = flat.clone().swap_dims(1, 2);
    flat.matmul(transposed).div_scalar((c * h * w) as f64)
}

/// Mean absolute difference between horizontal and vertical neighbours
pub fn total_variation<B: Backend>(image: Tensor<B, 4>) -> Tensor<B, 1> {
    let [n, c, h, w] = image.dims();
    let dx = image.clone().slice([0..n, 0..c, 0..h, 1..w])
        - image.clone().slice([0..n, 0..c, 0..h, 0..w - 1]);
    let dy = image.clone().slice([0..n, 0..c, 1..h, 0..w])
        - image.slice([0..n, 0..c, 0..h - 1, 0..w]);
    dx.abs().mean() + dy.abs().mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    fn criterion(device: &<TestBackend as Backend>::Device) -> InpaintingLoss<TestBackend> {
        let extractor = FeatureExtractorConfig::new()
            .with_base_width(4)
            .init_frozen::<TestBackend>(None, device)
            .unwrap();
        InpaintingLoss::new(extractor)
    }

    #[test]
    fn test_perfect_output_has_zero_reconstruction_terms() {
        let device = Default::default();
        let gt   = Tensor::<TestBackend, 4>::random([2, 3, 16, 16], Distribution::Default, &device);
        let mask = Tensor::<TestBackend, 4>::ones([2, 3, 16, 16], &device);

        let terms = criterion(&device).forward(gt.clone(), mask, gt.clone(), gt);
        assert!(scalar(terms.valid).abs() < 1e-6);
        assert!(scalar(terms.hole).abs() < 1e-6);
        assert!(scalar(terms.perc).abs() < 1e-6);
        assert!(scalar(terms.style).abs() < 1e-6);
        assert!(scalar(terms.tv) > 0.0);
    }

    #[test]
    fn test_hole_term_only_sees_holes() {
        let device = Default::default();
        let gt     = Tensor::<TestBackend, 4>::zeros([1, 3, 8, 8], &device);
        let output = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device);
        // Left half known, right half missing
        let mask = Tensor::<TestBackend, 4>::ones([1, 3, 8, 4], &device);
        let mask = Tensor::cat(vec![mask.clone(), mask.zeros_like()], 3);

        let terms = criterion(&device).forward(gt.clone() * mask.clone(), mask, output, gt);
        // Half the pixels are holes and each is off by 1
        assert!((scalar(terms.hole) - 0.5).abs() < 1e-6);
        assert!((scalar(terms.valid) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_total_variation_of_constant_is_zero() {
        let device = Default::default();
        let image = Tensor::<TestBackend, 4>::ones([1, 3, 4, 4], &device).mul_scalar(0.3);
        assert!(scalar(total_variation(image)).abs() < 1e-7);
    }

    #[test]
    fn test_gram_matrix_shape_and_value() {
        let device = Default::default();
        let features = Tensor::<TestBackend, 4>::ones([2, 3, 2, 2], &device);
        let gram = gram_matrix(features);
        assert_eq!(gram.dims(), [2, 3, 3]);
        // Each entry: sum over 4 positions of 1*1, divided by 3*2*2
        let values: Vec<f32> = gram.into_data().convert::<f32>().to_vec().unwrap();
        assert!(values.iter().all(|&v| (v - 4.0 / 12.0).abs() < 1e-6));
    }

    #[test]
    fn test_weighted_sum_matches_host_total() {
        let device = Default::default();
        let gt     = Tensor::<TestBackend, 4>::random([1, 3, 8, 8], Distribution::Default, &device);
        let output = Tensor::<TestBackend, 4>::random([1, 3, 8, 8], Distribution::Default, &device);
        let mask   = Tensor::<TestBackend, 4>::ones([1, 3, 8, 8], &device);

        let terms = criterion(&device).forward(gt.clone() * mask.clone(), mask, output, gt);
        let coef  = LossCoefficients::default();
        let total = scalar(terms.weighted_sum(&coef));
        let host  = coef.weighted_total(&terms.to_breakdown());
        assert!((total - host).abs() < 1e-3 * host.abs().max(1.0));
    }

    #[test]
    fn test_extractor_is_frozen_but_passes_gradients() {
        type AD = Autodiff<TestBackend>;
        let device = Default::default();
        let extractor = FeatureExtractorConfig::new()
            .with_base_width(2)
            .init_frozen::<AD>(None, &device)
            .unwrap();

        let image = Tensor::<AD, 4>::random([1, 3, 8, 8], Distribution::Default, &device)
            .require_grad();
        let loss = extractor
            .forward(image.clone())
            .into_iter()
            .map(|f| f.sum())
            .reduce(|a, b| a + b)
            .unwrap();
        let grads = loss.backward();

        assert!(image.grad(&grads).is_some());
        let weight_grad = extractor.stages[0].conv1.weight.val().grad(&grads);
        assert!(weight_grad.is_none());
    }
}
