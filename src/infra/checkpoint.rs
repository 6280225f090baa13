// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores training state using Burn's CompactRecorder.
//
// What gets saved per checkpoint:
//   1. Model weights      (model.mpk)     — all learned parameters
//   2. Optimizer state    (optimizer.mpk) — Adam moments
//   3. Step counter       (state.json)    — global step after the save
//
// File naming convention:
//   {ckpt}/
//     train_config.json          ← effective TrainConfig
//     models/
//       5000/model.mpk
//       5000/optimizer.mpk
//       5000/state.json
//       10000/...
//       latest.json              ← step of the newest checkpoint
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use burn::{
    optim::Optimizer,
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::PConvUNet;

const CONFIG_FILE: &str = "train_config.json";
const LATEST_FILE: &str = "latest.json";
const STATE_FILE:  &str = "state.json";

/// Persisted alongside the records of one checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub step: usize,
}

/// Manages saving and loading of training checkpoints.
pub struct CheckpointManager {
    root:   PathBuf,
    models: PathBuf,
}

impl CheckpointManager {
    /// Create a manager rooted at `root`, creating `root/models` if needed.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root   = root.as_ref().to_path_buf();
        let models = root.join("models");
        fs::create_dir_all(&models)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", models.display()))?;
        Ok(Self { root, models })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the checkpoint for `step`
    pub fn step_dir(&self, step: usize) -> PathBuf {
        self.models.join(step.to_string())
    }

    /// Save model, optimizer and step counter, then move the latest pointer.
    pub fn save<B, O>(&self, step: usize, model: &PConvUNet<B>, optimizer: &O) -> Result<PathBuf>
    where
        B: AutodiffBackend,
        O: Optimizer<PConvUNet<B>, B>,
    {
        let dir = self.step_dir(step);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let recorder = CompactRecorder::new();
        model
            .clone()
            .save_file(dir.join("model"), &recorder)
            .with_context(|| format!("Failed to save model to '{}'", dir.display()))?;
        Recorder::<B>::record(&recorder, optimizer.to_record(), dir.join("optimizer"))
            .with_context(|| format!("Failed to save optimizer to '{}'", dir.display()))?;

        write_json(&dir.join(STATE_FILE), &CheckpointState { step })?;
        write_json(&self.models.join(LATEST_FILE), &CheckpointState { step })?;

        tracing::debug!("Saved checkpoint: step {}", step);
        Ok(dir)
    }

    /// Restore model, optimizer and step counter saved at `step`.
    pub fn load<B, O>(
        &self,
        step:      usize,
        model:     PConvUNet<B>,
        optimizer: O,
        device:    &B::Device,
    ) -> Result<(PConvUNet<B>, O, usize)>
    where
        B: AutodiffBackend,
        O: Optimizer<PConvUNet<B>, B>,
    {
        let dir   = self.step_dir(step);
        let model = self.load_model(step, model, device)?;

        let recorder = CompactRecorder::new();
        let record: O::Record = Recorder::<B>::load(&recorder, dir.join("optimizer"), device)
            .with_context(|| format!("Cannot load optimizer state from '{}'", dir.display()))?;
        let optimizer = optimizer.load_record(record);

        let state: CheckpointState = read_json(&dir.join(STATE_FILE))?;
        tracing::info!("Resumed from checkpoint at step {}", state.step);
        Ok((model, optimizer, state.step))
    }

    /// Restore model weights only. The model must have the saved architecture.
    pub fn load_model<B: Backend>(
        &self,
        step:   usize,
        model:  PConvUNet<B>,
        device: &B::Device,
    ) -> Result<PConvUNet<B>> {
        let path = self.step_dir(step).join("model");
        model
            .load_file(path.clone(), &CompactRecorder::new(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Has this step been saved?", path.display())
            })
    }

    /// Step of the newest checkpoint, or None if nothing has been saved.
    pub fn latest_step(&self) -> Result<Option<usize>> {
        let path = self.models.join(LATEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let state: CheckpointState = read_json(&path)?;
        Ok(Some(state.step))
    }

    /// Save the effective training configuration to JSON.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.root.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    /// Load the training configuration saved by `save_config`.
    pub fn load_config(&self) -> Result<TrainConfig> {
        read_json(&self.root.join(CONFIG_FILE))
            .context("Make sure you have run 'train' with this checkpoint directory first")
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, serde_json::to_string(value)?)
        .with_context(|| format!("Failed to write '{}'", path.display()))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let s = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    serde_json::from_str(&s)
        .with_context(|| format!("Malformed JSON in '{}'", path.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::PConvUNetConfig;
    use burn::{
        backend::{Autodiff, NdArray},
        module::AutodiffModule,
        optim::AdamConfig,
    };

    type AD = Autodiff<NdArray>;

    fn tiny_model(device: &<AD as Backend>::Device) -> PConvUNet<AD> {
        PConvUNetConfig::new().with_base_channels(2).with_depth(2).init(device)
    }

    fn weights<B: Backend>(model: &PConvUNet<B>) -> Vec<f32> {
        model.encoders[0].pconv.conv.weight.val().into_data().convert::<f32>().to_vec().unwrap()
    }

    #[test]
    fn test_latest_step_absent_before_save() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path()).unwrap();
        assert_eq!(mgr.latest_step().unwrap(), None);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();

        let model = tiny_model(&device);
        let optim = AdamConfig::new().init::<AD, PConvUNet<AD>>();
        let saved = weights(&model);

        let path = mgr.save(12, &model, &optim).unwrap();
        assert!(path.join("state.json").exists());
        assert_eq!(mgr.latest_step().unwrap(), Some(12));

        let fresh = tiny_model(&device);
        let (restored, _optim, step) = mgr
            .load(12, fresh, AdamConfig::new().init::<AD, PConvUNet<AD>>(), &device)
            .unwrap();
        assert_eq!(step, 12);
        assert_eq!(weights(&restored), saved);

        // Inference-only load onto the inner backend
        let inner = mgr.load_model(12, tiny_model(&device).valid(), &device).unwrap();
        assert_eq!(weights(&inner), saved);
    }

    #[test]
    fn test_load_missing_step_is_error() {
        let dir    = tempfile::tempdir().unwrap();
        let mgr    = CheckpointManager::new(dir.path()).unwrap();
        let device = Default::default();
        assert!(mgr.load_model(99, tiny_model(&device), &device).is_err());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path()).unwrap();

        let cfg = TrainConfig { max_iter: 77, ..TrainConfig::default() };
        mgr.save_config(&cfg).unwrap();
        assert_eq!(mgr.load_config().unwrap().max_iter, 77);
    }
}
