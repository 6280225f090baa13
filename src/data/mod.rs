// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from image files on disk to tensor batches:
//
//   image files  ──▶ ImageFolder      → sorted list of image paths
//                         │
//   mask source  ──▶ InpaintDataset   → (gt, mask) per index
//                         │
//                    InpaintBatcher   → [N, 3, H, W] tensors
//                         │
//                    DataLoader       → shuffled batches for the trainer
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Finds and decodes image and mask files
pub mod loader;

/// Mask images from disk or generated rectangular holes
pub mod mask;

/// Implements Burn's Dataset trait for inpainting samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Shuffles and splits image lists into train/validation sets
pub mod splitter;
