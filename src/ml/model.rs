// ============================================================
// Layer 5 — PConv U-Net
// ============================================================
// Every convolution is a partial convolution: it sees only the
// known pixels under its window and hands an updated mask to the
// next layer, so holes shrink as the signal flows down the encoder.
//
//   encoder: stride-2 PConv (7, 5, 5, 3, ...) → BN → ReLU
//   decoder: 2x nearest upsample → concat skip → PConv 3x3
//            → BN → LeakyReLU(0.2)   (last layer: plain output)
//
// Reference: Liu et al. (2018), Burn Book §3 (Modules)

use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::{
        activation::{leaky_relu, relu},
        module::conv2d,
        ops::ConvOptions,
    },
};

use crate::data::dataset::IMAGE_CHANNELS;

/// Deepest supported U-Net; 2^7 = 128x downsampling
pub const MAX_DEPTH: usize = 7;

// ─── Partial convolution ──────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct PartialConv2dConfig {
    pub channels: [usize; 2],
    pub kernel_size: usize,
    #[config(default = 1)]
    pub stride: usize,
    #[config(default = true)]
    pub bias: bool,
}

impl PartialConv2dConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> PartialConv2d<B> {
        let [in_channels, out_channels] = self.channels;
        let padding = self.kernel_size / 2;
        let conv = Conv2dConfig::new(self.channels, [self.kernel_size, self.kernel_size])
            .with_stride([self.stride, self.stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .with_bias(false)
            .init(device);
        let bias = self
            .bias
            .then(|| Param::from_tensor(Tensor::zeros([out_channels], device)));

        PartialConv2d {
            conv,
            bias,
            in_channels,
            out_channels,
            kernel_size: self.kernel_size,
            stride: self.stride,
            padding,
        }
    }
}

/// Convolution that only looks at known pixels.
///
/// out  = W·(x ⊙ m) · window / Σm + b   where Σm > 0
///      = 0                             elsewhere
/// mask' = 1 where Σm > 0
#[derive(Module, Debug)]
pub struct PartialConv2d<B: Backend> {
    pub conv: Conv2d<B>,
    pub bias: Option<Param<Tensor<B, 1>>>,
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub stride: usize,
    pub padding: usize,
}

impl<B: Backend> PartialConv2d<B> {
    /// `input` and `mask` share the shape [N, in_channels, H, W].
    /// Returns (output, updated mask), both [N, out_channels, H', W'].
    pub fn forward(&self, input: Tensor<B, 4>, mask: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let k = self.kernel_size;
        let window = (self.in_channels * k * k) as f64;

        // Count known pixels under every window position with a fixed ones kernel
        let ones = Tensor::<B, 4>::ones([1, self.in_channels, k, k], &mask.device());
        let options = ConvOptions::new(
            [self.stride, self.stride],
            [self.padding, self.padding],
            [1, 1],
            1,
        );
        let mask_sum = conv2d(mask.clone(), ones, None, options);

        let update = mask_sum.clone().clamp(0.0, 1.0);
        let ratio = mask_sum.clamp_min(1e-8).recip().mul_scalar(window) * update.clone();

        let raw = self.conv.forward(input * mask);
        let [n, _, h, w] = raw.dims();
        let ratio = ratio.expand([n, self.out_channels, h, w]);
        let update = update.expand([n, self.out_channels, h, w]);

        let mut out = raw * ratio;
        if let Some(bias) = &self.bias {
            out = out + bias.val().reshape([1, self.out_channels, 1, 1]);
        }
        (out * update.clone(), update)
    }
}

// ─── U-Net ────────────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct PConvUNetConfig {
    /// Channels of the first encoder layer; doubles per level up to 8x
    #[config(default = 64)]
    pub base_channels: usize,
    /// Number of stride-2 encoder levels
    #[config(default = 7)]
    pub depth: usize,
}

impl PConvUNetConfig {
    /// Output channels of encoder level `level`
    fn channels(&self, level: usize) -> usize {
        self.base_channels << level.min(3)
    }

    /// Kernel size of encoder level `level`: 7, 5, 5, then 3
    fn encoder_kernel(level: usize) -> usize {
        match level {
            0 => 7,
            1 | 2 => 5,
            _ => 3,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> PConvUNet<B> {
        let depth = self.depth.clamp(1, MAX_DEPTH);

        let encoders = (0..depth)
            .map(|level| {
                let in_ch = if level == 0 { IMAGE_CHANNELS } else { self.channels(level - 1) };
                let out_ch = self.channels(level);
                let with_bn = level != 0;
                PConvBlock {
                    pconv: PartialConv2dConfig::new([in_ch, out_ch], Self::encoder_kernel(level))
                        .with_stride(2)
                        .with_bias(!with_bn)
                        .init(device),
                    norm: with_bn.then(|| BatchNormConfig::new(out_ch).init(device)),
                }
            })
            .collect();

        // Decoders run deepest first; decoder for level `l` merges the
        // upsampled features with the skip from level `l - 1` (or the input).
        let decoders = (0..depth)
            .rev()
            .map(|level| {
                let deep_ch = self.channels(level);
                let (skip_ch, out_ch) = if level == 0 {
                    (IMAGE_CHANNELS, IMAGE_CHANNELS)
                } else {
                    let c = self.channels(level - 1);
                    (c, c)
                };
                let with_bn = level != 0;
                PConvBlock {
                    pconv: PartialConv2dConfig::new([deep_ch + skip_ch, out_ch], 3)
                        .with_bias(!with_bn)
                        .init(device),
                    norm: with_bn.then(|| BatchNormConfig::new(out_ch).init(device)),
                }
            })
            .collect();

        PConvUNet { encoders, decoders }
    }
}

#[derive(Module, Debug)]
pub struct PConvBlock<B: Backend> {
    pub pconv: PartialConv2d<B>,
    pub norm: Option<BatchNorm<B, 2>>,
}

impl<B: Backend> PConvBlock<B> {
    fn forward(&self, input: Tensor<B, 4>, mask: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let (h, m) = self.pconv.forward(input, mask);
        let h = match &self.norm {
            Some(norm) => norm.forward(h),
            None => h,
        };
        (h, m)
    }
}

#[derive(Module, Debug)]
pub struct PConvUNet<B: Backend> {
    pub encoders: Vec<PConvBlock<B>>,
    pub decoders: Vec<PConvBlock<B>>,
}

impl<B: Backend> PConvUNet<B> {
    /// input, mask: [N, 3, H, W] with H and W divisible by 2^depth.
    /// Returns (output, output mask) of the same shape.
    pub fn forward(&self, input: Tensor<B, 4>, mask: Tensor<B, 4>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let mut skips = Vec::with_capacity(self.encoders.len());
        let mut h = input;
        let mut m = mask;

        for encoder in &self.encoders {
            skips.push((h.clone(), m.clone()));
            let (next_h, next_m) = encoder.forward(h, m);
            h = relu(next_h);
            m = next_m;
        }

        let last = self.decoders.len().saturating_sub(1);
        for (i, (decoder, (skip_h, skip_m))) in
            self.decoders.iter().zip(skips.into_iter().rev()).enumerate()
        {
            let up_h = upsample_nearest2x(h);
            let up_m = upsample_nearest2x(m);
            let (next_h, next_m) = decoder.forward(
                Tensor::cat(vec![up_h, skip_h], 1),
                Tensor::cat(vec![up_m, skip_m], 1),
            );
            h = if i == last { next_h } else { leaky_relu(next_h, 0.2) };
            m = next_m;
        }

        (h, m)
    }

    pub fn depth(&self) -> usize {
        self.encoders.len()
    }
}

/// Nearest-neighbour 2x upsampling: [N, C, H, W] → [N, C, 2H, 2W]
pub fn upsample_nearest2x<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [n, c, h, w] = x.dims();
    x.reshape([n, c, h, 1, w, 1])
        .expand([n, c, h, 2, w, 2])
        .reshape([n, c, h * 2, w * 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn to_vec<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
        t.into_data().convert::<f32>().to_vec().unwrap()
    }

    #[test]
    fn test_unet_output_shapes() {
        let device = Default::default();
        let model = PConvUNetConfig::new()
            .with_base_channels(4)
            .with_depth(3)
            .init::<TestBackend>(&device);
        assert_eq!(model.depth(), 3);

        let input = Tensor::<TestBackend, 4>::random([2, 3, 16, 16], burn::tensor::Distribution::Default, &device);
        let mask = Tensor::<TestBackend, 4>::ones([2, 3, 16, 16], &device);
        let (out, out_mask) = model.forward(input, mask);

        assert_eq!(out.dims(), [2, 3, 16, 16]);
        assert_eq!(out_mask.dims(), [2, 3, 16, 16]);
    }

    #[test]
    fn test_partial_conv_ignores_holes() {
        let device = Default::default();
        let pconv = PartialConv2dConfig::new([3, 2], 3).init::<TestBackend>(&device);

        // Entirely unknown input: output and mask must be zero everywhere
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 4, 4], &device);
        let mask = Tensor::<TestBackend, 4>::zeros([1, 3, 4, 4], &device);
        let (out, new_mask) = pconv.forward(input, mask);

        assert_eq!(out.dims(), [1, 2, 4, 4]);
        assert!(to_vec(out).iter().all(|&v| v == 0.0));
        assert!(to_vec(new_mask).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_partial_conv_mask_grows() {
        let device = Default::default();
        let pconv = PartialConv2dConfig::new([3, 1], 3).init::<TestBackend>(&device);

        // One known pixel in the centre of a 5x5 image
        let mut plane = vec![0.0f32; 25];
        plane[12] = 1.0;
        let data: Vec<f32> = plane.iter().cycle().take(75).copied().collect();
        let mask = Tensor::<TestBackend, 4>::from_data(TensorData::new(data, [1, 3, 5, 5]), &device);
        let input = mask.clone();

        let (_, new_mask) = pconv.forward(input, mask);
        let known = to_vec(new_mask).iter().filter(|&&v| v == 1.0).count();
        // The 3x3 neighbourhood of the centre now counts as known
        assert_eq!(known, 9);
    }

    #[test]
    fn test_upsample_nearest() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0], [1, 1, 2, 2]),
            &device,
        );
        let up = upsample_nearest2x(x);
        assert_eq!(up.dims(), [1, 1, 4, 4]);
        assert_eq!(
            to_vec(up),
            vec![
                1.0, 1.0, 2.0, 2.0,
                1.0, 1.0, 2.0, 2.0,
                3.0, 3.0, 4.0, 4.0,
                3.0, 3.0, 4.0, 4.0,
            ]
        );
    }
}
