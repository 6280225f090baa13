// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// File-system concerns used by the training and evaluation
// workflows:
//
//   checkpoint.rs — Saving and loading model weights, optimizer
//                   state and the step counter with Burn's
//                   CompactRecorder, plus the TrainConfig JSON.
//
//   metrics.rs    — Appends reported loss values to a CSV file.
//
//   image_io.rs   — Writes the evaluation grid as a PNG.

/// Model / optimizer checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;

/// PNG output for evaluation grids
pub mod image_io;
