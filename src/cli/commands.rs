// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `evaluate`, and all
// their configurable flags.
//
// Training flags are all optional: a flag that is given wins
// over the `--config` file, which wins over the defaults.
//
// Reference: Rust Book §12 (Building a CLI Program)

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::{
    evaluate_use_case::EvaluateRequest,
    train_use_case::{ResumeFrom, TrainConfig},
};

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the PConv inpainting network
    Train(TrainArgs),

    /// Render the evaluation grid for a saved checkpoint
    Evaluate(EvaluateArgs),
}

/// Compute backend to run on
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// GPU through wgpu
    #[default]
    Wgpu,
    /// CPU through ndarray
    Ndarray,
}

/// All arguments for the `train` command.
#[derive(Args, Debug, Default)]
pub struct TrainArgs {
    /// JSON file with training settings; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Continue from a checkpoint: `latest` or a step number
    #[arg(long)]
    pub resume: Option<ResumeFrom>,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,

    /// Directory of training images
    #[arg(long)]
    pub image_root: Option<String>,

    /// Directory of validation images (default: hold out part of image_root)
    #[arg(long)]
    pub val_root: Option<String>,

    /// Directory of mask images (default: random rectangular holes)
    #[arg(long)]
    pub mask_root: Option<String>,

    /// Output directory for checkpoints, grids and metrics
    #[arg(long)]
    pub ckpt: Option<String>,

    #[arg(long)]
    pub image_size: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Adam learning rate
    #[arg(long)]
    pub lr: Option<f64>,

    /// Global step to stop at
    #[arg(long)]
    pub max_iter: Option<usize>,

    #[arg(long)]
    pub print_interval: Option<usize>,

    #[arg(long)]
    pub vis_interval: Option<usize>,

    #[arg(long)]
    pub save_model_interval: Option<usize>,

    /// Images per evaluation grid
    #[arg(long)]
    pub vis_count: Option<usize>,

    #[arg(long)]
    pub val_fraction: Option<f64>,

    /// Data loader worker threads (0 = load on the training thread)
    #[arg(long)]
    pub num_workers: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Channels of the first encoder level
    #[arg(long)]
    pub base_channels: Option<usize>,

    /// Number of encoder/decoder levels (1-7)
    #[arg(long)]
    pub depth: Option<usize>,

    /// Channels of the first feature-extractor stage
    #[arg(long)]
    pub feature_width: Option<usize>,

    /// Burn record with feature-extractor weights
    #[arg(long)]
    pub feature_weights: Option<String>,

    #[arg(long)]
    pub valid_coef: Option<f64>,

    #[arg(long)]
    pub hole_coef: Option<f64>,

    #[arg(long)]
    pub tv_coef: Option<f64>,

    #[arg(long)]
    pub perc_coef: Option<f64>,

    #[arg(long)]
    pub style_coef: Option<f64>,
}

impl TrainArgs {
    /// Layer defaults, the `--config` file and explicit flags.
    /// The application layer never sees clap types.
    pub fn to_config(&self) -> Result<TrainConfig> {
        let mut cfg = match &self.config {
            Some(path) => TrainConfig::from_file(path)?,
            None => TrainConfig::default(),
        };

        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }

        set(&mut cfg.image_root,          &self.image_root);
        set(&mut cfg.ckpt,                &self.ckpt);
        set(&mut cfg.image_size,          &self.image_size);
        set(&mut cfg.batch_size,          &self.batch_size);
        set(&mut cfg.lr,                  &self.lr);
        set(&mut cfg.max_iter,            &self.max_iter);
        set(&mut cfg.print_interval,      &self.print_interval);
        set(&mut cfg.vis_interval,        &self.vis_interval);
        set(&mut cfg.save_model_interval, &self.save_model_interval);
        set(&mut cfg.vis_count,           &self.vis_count);
        set(&mut cfg.val_fraction,        &self.val_fraction);
        set(&mut cfg.num_workers,         &self.num_workers);
        set(&mut cfg.seed,                &self.seed);
        set(&mut cfg.base_channels,       &self.base_channels);
        set(&mut cfg.depth,               &self.depth);
        set(&mut cfg.feature_width,       &self.feature_width);
        set(&mut cfg.loss_coef.valid,     &self.valid_coef);
        set(&mut cfg.loss_coef.hole,      &self.hole_coef);
        set(&mut cfg.loss_coef.tv,        &self.tv_coef);
        set(&mut cfg.loss_coef.perc,      &self.perc_coef);
        set(&mut cfg.loss_coef.style,     &self.style_coef);

        if self.val_root.is_some() {
            cfg.val_root = self.val_root.clone();
        }
        if self.mask_root.is_some() {
            cfg.mask_root = self.mask_root.clone();
        }
        if self.feature_weights.is_some() {
            cfg.feature_weights = self.feature_weights.clone();
        }

        Ok(cfg)
    }
}

/// All arguments for the `evaluate` command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Checkpoint directory used during training
    #[arg(long, default_value = "ckpt")]
    pub ckpt: String,

    /// Step to load (default: newest checkpoint)
    #[arg(long)]
    pub step: Option<usize>,

    /// Images to evaluate on (default: the validation set from training)
    #[arg(long)]
    pub image_root: Option<String>,

    #[arg(long)]
    pub mask_root: Option<String>,

    /// Where to write the PNG grid
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Number of images in the grid
    #[arg(long)]
    pub count: Option<usize>,

    #[arg(long, value_enum, default_value_t = BackendKind::Wgpu)]
    pub backend: BackendKind,
}

impl From<EvaluateArgs> for EvaluateRequest {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateRequest {
            ckpt:       a.ckpt,
            step:       a.step,
            image_root: a.image_root,
            mask_root:  a.mask_root,
            output:     a.output,
            count:      a.count,
        }
    }
}
