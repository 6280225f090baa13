// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`    — trains the PConv U-Net on an image folder
//   2. `evaluate` — loads a checkpoint and renders the test grid
//
// The backend is chosen here, so the layers below stay generic.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::backend::{
    ndarray::NdArrayDevice,
    wgpu::WgpuDevice,
    Autodiff, NdArray, Wgpu,
};
use clap::Parser;
use commands::{BackendKind, Commands, EvaluateArgs, TrainArgs};

use crate::application::{
    evaluate_use_case::EvaluateUseCase,
    train_use_case::TrainUseCase,
};

#[derive(Parser, Debug)]
#[command(
    name = "pconv-trainer",
    version = "0.1.0",
    about = "Train a partial-convolution image inpainting network."
)]
pub struct Cli {
    /// The subcommand to run (train or evaluate)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let config = args.to_config()?;
    tracing::info!("Training on images in: {}", config.image_root);

    let use_case = TrainUseCase::new(config, args.resume);
    let summary = match args.backend {
        BackendKind::Wgpu    => use_case.execute::<Autodiff<Wgpu>>(WgpuDevice::default())?,
        BackendKind::Ndarray => use_case.execute::<Autodiff<NdArray>>(NdArrayDevice::Cpu)?,
    };

    match summary.last_loss {
        Some(loss) => println!(
            "Training complete: {} steps, now at step {}, last loss {}.",
            summary.steps, summary.final_step, loss
        ),
        None => println!("Nothing to train: already at step {}.", summary.final_step),
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let backend  = args.backend;
    let use_case = EvaluateUseCase::new(args.into());
    let report = match backend {
        BackendKind::Wgpu    => use_case.execute::<Wgpu>(WgpuDevice::default())?,
        BackendKind::Ndarray => use_case.execute::<NdArray>(NdArrayDevice::Cpu)?,
    };

    match report {
        Some(r) => println!("Evaluated {} images, PSNR {:.2} dB", r.count, r.psnr),
        None    => println!("No images to evaluate."),
    }
    Ok(())
}
