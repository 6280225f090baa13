// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a training run in order:
//
//   Step 1: Validate the configuration
//   Step 2: Seed the backend RNG             (model / extractor init)
//   Step 3: Find training + validation images (Layer 4 - data)
//   Step 4: Choose a mask source              (Layer 4 - data)
//   Step 5: Save config                       (Layer 6 - infra)
//   Step 6: Build model, criterion, optimizer (Layer 5 - ml)
//   Step 7: Resume from a checkpoint if asked (Layer 6 - infra)
//   Step 8: Run the training loop             (Layer 5 - ml)

use anyhow::{Context, Result};
use burn::{optim::AdamConfig, tensor::backend::AutodiffBackend};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use crate::data::{
    dataset::InpaintDataset,
    loader::ImageFolder,
    mask::{MaskFolder, RandomBoxMasks},
    splitter::split_train_val,
};
use crate::domain::{losses::LossCoefficients, traits::MaskSource};
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::{
    loss::{FeatureExtractorConfig, InpaintingLoss},
    model::{PConvUNet, PConvUNetConfig, MAX_DEPTH},
    trainer::{TrainSummary, Trainer},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Missing fields in a
// config file fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub image_root:          String,
    pub val_root:            Option<String>,
    pub mask_root:           Option<String>,
    pub ckpt:                String,
    pub image_size:          usize,
    pub batch_size:          usize,
    pub lr:                  f64,
    pub max_iter:            usize,
    pub print_interval:      usize,
    pub vis_interval:        usize,
    pub save_model_interval: usize,
    pub vis_count:           usize,
    pub val_fraction:        f64,
    pub num_workers:         usize,
    pub seed:                u64,
    pub base_channels:       usize,
    pub depth:               usize,
    pub feature_width:       usize,
    pub feature_weights:     Option<String>,
    pub loss_coef:           LossCoefficients,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            image_root:          "data/train".to_string(),
            val_root:            None,
            mask_root:           None,
            ckpt:                "ckpt".to_string(),
            image_size:          256,
            batch_size:          16,
            lr:                  2e-4,
            max_iter:            1_000_000,
            print_interval:      10,
            vis_interval:        5_000,
            save_model_interval: 50_000,
            vis_count:           8,
            val_fraction:        0.1,
            num_workers:         2,
            seed:                42,
            base_channels:       64,
            depth:               7,
            feature_width:       64,
            feature_weights:     None,
            loss_coef:           LossCoefficients::default(),
        }
    }
}

impl TrainConfig {
    /// Read a JSON config file; absent fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config '{}'", path.display()))
    }

    /// Reject configurations the training loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("batch_size",          self.batch_size),
            ("print_interval",      self.print_interval),
            ("vis_interval",        self.vis_interval),
            ("save_model_interval", self.save_model_interval),
            ("vis_count",           self.vis_count),
            ("base_channels",       self.base_channels),
            ("feature_width",       self.feature_width),
        ] {
            if value == 0 {
                anyhow::bail!("{name} must be greater than zero");
            }
        }

        if !(1..=MAX_DEPTH).contains(&self.depth) {
            anyhow::bail!("depth must be between 1 and {MAX_DEPTH}, got {}", self.depth);
        }
        let factor = 1usize << self.depth;
        if self.image_size == 0 || self.image_size % factor != 0 {
            anyhow::bail!(
                "image_size {} must be a positive multiple of 2^depth = {}",
                self.image_size,
                factor
            );
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            anyhow::bail!("lr must be a positive number, got {}", self.lr);
        }
        if !(0.0..1.0).contains(&self.val_fraction) {
            anyhow::bail!("val_fraction must be in [0, 1), got {}", self.val_fraction);
        }
        for (term, coef) in self.loss_coef.iter() {
            if !coef.is_finite() || coef < 0.0 {
                anyhow::bail!("loss coefficient '{}' must be finite and >= 0, got {}", term.key(), coef);
            }
        }
        Ok(())
    }

    pub fn model_config(&self) -> PConvUNetConfig {
        PConvUNetConfig::new()
            .with_base_channels(self.base_channels)
            .with_depth(self.depth)
    }
}

// ─── Resume point ─────────────────────────────────────────────────────────────
/// Which checkpoint to continue from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFrom {
    Latest,
    Step(usize),
}

impl FromStr for ResumeFrom {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "latest" => Ok(ResumeFrom::Latest),
            other => other
                .parse::<usize>()
                .map(ResumeFrom::Step)
                .map_err(|_| format!("expected 'latest' or a step number, got '{other}'")),
        }
    }
}

impl ResumeFrom {
    /// Resolve to a concrete step using the checkpoint directory
    pub fn resolve(self, checkpoints: &CheckpointManager) -> Result<usize> {
        match self {
            ResumeFrom::Step(step) => Ok(step),
            ResumeFrom::Latest => checkpoints
                .latest_step()?
                .ok_or_else(|| anyhow::anyhow!(
                    "No checkpoint found in '{}' to resume from",
                    checkpoints.root().display()
                )),
        }
    }
}

/// Training and validation image lists for `cfg`.
///
/// Without a `val_root` the validation images are the seeded hold-out
/// of `image_root`, so every caller with the same config sees the same split.
pub fn split_images(cfg: &TrainConfig) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let images = ImageFolder::scan(&cfg.image_root)?.into_paths();
    Ok(match &cfg.val_root {
        Some(root) => (images, ImageFolder::scan(root)?.into_paths()),
        None => split_train_val(images, 1.0 - cfg.val_fraction, cfg.seed),
    })
}

/// Mask images from `mask_root` when configured, generated boxes otherwise
pub fn build_mask_source(mask_root: Option<&str>, seed: u64) -> Result<Arc<dyn MaskSource>> {
    Ok(match mask_root {
        Some(root) => Arc::new(MaskFolder::scan(root, seed)?),
        None => {
            tracing::info!("No mask directory given; generating rectangular holes");
            Arc::new(RandomBoxMasks::new(seed))
        }
    })
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
    resume: Option<ResumeFrom>,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig, resume: Option<ResumeFrom>) -> Self {
        Self { config, resume }
    }

    /// Execute the full training pipeline on backend `B`
    pub fn execute<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainSummary> {
        let cfg = &self.config;

        // ── Step 1: Validate ──────────────────────────────────────────────────
        cfg.validate()?;

        // ── Step 2: Seed parameter initialisation ─────────────────────────────
        B::seed(cfg.seed);

        // ── Step 3: Training and validation images ────────────────────────────
        let (train_images, val_images) = split_images(cfg)?;
        tracing::info!(
            "Split: {} train, {} validation",
            train_images.len(),
            val_images.len()
        );
        if train_images.is_empty() {
            anyhow::bail!("No training images found under '{}'", cfg.image_root);
        }

        // ── Step 4: Masks and datasets ────────────────────────────────────────
        let masks = build_mask_source(cfg.mask_root.as_deref(), cfg.seed)?;
        let dataset_train = InpaintDataset::new(train_images, masks.clone(), cfg.image_size)
            .with_fresh_masks();
        let dataset_val   = InpaintDataset::new(val_images, masks, cfg.image_size);

        // ── Step 5: Save config for evaluation ────────────────────────────────
        let checkpoints = CheckpointManager::new(&cfg.ckpt)?;
        checkpoints.save_config(cfg)?;
        let metrics = MetricsLogger::new(&cfg.ckpt)?;

        // ── Step 6: Model, criterion, optimizer ───────────────────────────────
        let model: PConvUNet<B> = cfg.model_config().init(&device);
        tracing::info!("Model ready: depth={}, base_channels={}", model.depth(), cfg.base_channels);

        let extractor = FeatureExtractorConfig::new()
            .with_base_width(cfg.feature_width)
            .init_frozen::<B>(cfg.feature_weights.as_deref().map(Path::new), &device)?;
        let criterion = InpaintingLoss::new(extractor);

        let optimizer = AdamConfig::new().init::<B, PConvUNet<B>>();

        // ── Step 7: Resume ────────────────────────────────────────────────────
        let (model, optimizer, step) = match self.resume {
            Some(resume) => {
                let step = resume.resolve(&checkpoints)?;
                checkpoints.load(step, model, optimizer, &device)?
            }
            None => (model, optimizer, 0),
        };

        // ── Step 8: Training loop ─────────────────────────────────────────────
        let mut trainer = Trainer::new(
            step,
            cfg.clone(),
            device,
            model,
            dataset_train,
            dataset_val,
            criterion,
            optimizer,
            checkpoints,
            metrics,
        )?;
        let summary = trainer.iterate(cfg.max_iter)?;

        tracing::info!("Training complete at step {}", summary.final_step);
        Ok(summary)
    }
}
