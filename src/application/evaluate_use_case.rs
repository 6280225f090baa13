// ============================================================
// Layer 2 — EvaluateUseCase
// ============================================================
// Renders the evaluation grid for a saved checkpoint without
// training:
//
//   1. Read train_config.json from the checkpoint directory
//   2. Rebuild the model architecture from that config
//   3. Load weights for the requested (or newest) step
//   4. Build a dataset from the image folder (or the run's
//      validation split) and the mask source
//   5. Run the evaluator and write the PNG grid

use anyhow::Result;
use burn::prelude::*;
use std::path::PathBuf;

use crate::application::train_use_case::{build_mask_source, split_images};
use crate::data::{dataset::InpaintDataset, loader::ImageFolder};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::{
    evaluator::{evaluate, EvalReport},
    model::PConvUNet,
};

/// Inputs for a standalone evaluation run
#[derive(Debug, Clone)]
pub struct EvaluateRequest {
    pub ckpt:       String,
    pub step:       Option<usize>,
    /// Overrides the validation images recorded in the config
    pub image_root: Option<String>,
    /// Overrides the mask directory recorded in the config
    pub mask_root:  Option<String>,
    pub output:     Option<PathBuf>,
    pub count:      Option<usize>,
}

pub struct EvaluateUseCase {
    request: EvaluateRequest,
}

impl EvaluateUseCase {
    pub fn new(request: EvaluateRequest) -> Self {
        Self { request }
    }

    pub fn execute<B: Backend>(&self, device: B::Device) -> Result<Option<EvalReport>> {
        let req = &self.request;

        let checkpoints = CheckpointManager::new(&req.ckpt)?;
        let cfg = checkpoints.load_config()?;

        let step = match req.step {
            Some(step) => step,
            None => checkpoints.latest_step()?.ok_or_else(|| {
                anyhow::anyhow!("No saved model under '{}'", checkpoints.root().display())
            })?,
        };

        let model: PConvUNet<B> = cfg.model_config().init(&device);
        let model = checkpoints.load_model(step, model, &device)?;
        tracing::info!("Loaded model from step {}", step);

        // Default to the validation images of the training run
        let images = match &req.image_root {
            Some(root) => ImageFolder::scan(root)?.into_paths(),
            None => split_images(&cfg)?.1,
        };
        tracing::info!("Evaluating on {} images", images.len());

        let mask_root = req.mask_root.clone().or_else(|| cfg.mask_root.clone());
        let masks = build_mask_source(mask_root.as_deref(), cfg.seed)?;
        let dataset = InpaintDataset::new(images, masks, cfg.image_size);

        let output = req.output.clone().unwrap_or_else(|| {
            PathBuf::from(&req.ckpt).join("eval").join(format!("eval_{step}.png"))
        });
        let count = req.count.unwrap_or(cfg.vis_count);

        evaluate(&model, &dataset, count, &device, &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::{TrainConfig, TrainUseCase};
    use burn::backend::{Autodiff, NdArray};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_evaluate_saved_checkpoint() {
        let data = tempfile::tempdir().unwrap();
        let ckpt = tempfile::tempdir().unwrap();
        for i in 0..3u8 {
            RgbImage::from_pixel(8, 8, Rgb([10, i * 70, 200]))
                .save(data.path().join(format!("{i}.png")))
                .unwrap();
        }

        let cfg = TrainConfig {
            image_root: data.path().to_string_lossy().into_owned(),
            ckpt: ckpt.path().to_string_lossy().into_owned(),
            image_size: 8,
            batch_size: 1,
            num_workers: 0,
            max_iter: 1,
            base_channels: 2,
            depth: 2,
            feature_width: 2,
            ..TrainConfig::default()
        };
        TrainUseCase::new(cfg.clone(), None)
            .execute::<Autodiff<NdArray>>(Default::default())
            .unwrap();

        let request = EvaluateRequest {
            ckpt: cfg.ckpt.clone(),
            step: None,
            image_root: Some(cfg.image_root.clone()),
            mask_root: None,
            output: None,
            count: Some(2),
        };
        let report = EvaluateUseCase::new(request)
            .execute::<NdArray>(Default::default())
            .unwrap()
            .unwrap();

        assert_eq!(report.count, 2);
        assert!(ckpt.path().join("eval/eval_1.png").exists());
    }

    #[test]
    fn test_default_images_are_the_validation_split() {
        let data = tempfile::tempdir().unwrap();
        let ckpt = tempfile::tempdir().unwrap();
        for i in 0..4u8 {
            RgbImage::from_pixel(8, 8, Rgb([i * 50, 90, 10]))
                .save(data.path().join(format!("{i}.png")))
                .unwrap();
        }

        let cfg = TrainConfig {
            image_root: data.path().to_string_lossy().into_owned(),
            ckpt: ckpt.path().to_string_lossy().into_owned(),
            image_size: 8,
            batch_size: 1,
            num_workers: 0,
            max_iter: 1,
            val_fraction: 0.25,
            base_channels: 2,
            depth: 2,
            feature_width: 2,
            ..TrainConfig::default()
        };
        TrainUseCase::new(cfg.clone(), None)
            .execute::<Autodiff<NdArray>>(Default::default())
            .unwrap();

        let (train, val) = split_images(&cfg).unwrap();
        assert_eq!((train.len(), val.len()), (3, 1));

        let request = EvaluateRequest {
            ckpt: cfg.ckpt.clone(),
            step: Some(1),
            image_root: None,
            mask_root: None,
            output: None,
            count: Some(10),
        };
        let report = EvaluateUseCase::new(request)
            .execute::<NdArray>(Default::default())
            .unwrap()
            .unwrap();

        // Only the held-out image, never the three training images
        assert_eq!(report.count, val.len());
    }

    #[test]
    fn test_missing_checkpoint_is_error() {
        let ckpt = tempfile::tempdir().unwrap();
        let request = EvaluateRequest {
            ckpt: ckpt.path().to_string_lossy().into_owned(),
            step: None,
            image_root: None,
            mask_root: None,
            output: None,
            count: None,
        };
        assert!(EvaluateUseCase::new(request).execute::<NdArray>(Default::default()).is_err());
    }
}
