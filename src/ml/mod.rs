// ============================================================
// Layer 5 — ML Layer (Burn)
// ============================================================
//   model.rs     — Partial convolution and the PConv U-Net
//   loss.rs      — Valid / hole / tv / perceptual / style terms
//                  and the frozen feature extractor behind them
//   trainer.rs   — The training loop: forward, weighted loss,
//                  backward, Adam step, periodic report,
//                  evaluation and checkpointing
//   evaluator.rs — Evaluation-mode forward pass on validation
//                  samples, PNG grid and PSNR
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Liu et al. (2018) Partial Convolutions

/// Partial-convolution U-Net architecture
pub mod model;

/// Inpainting loss terms
pub mod loss;

/// Training loop with evaluation and checkpointing
pub mod trainer;

/// Validation grid and PSNR
pub mod evaluator;
