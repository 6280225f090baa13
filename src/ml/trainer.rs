// ============================================================
// Layer 5 — Training Loop
// ============================================================
// One Trainer drives the whole run:
//
//   for every batch (re-shuffling the loader on each pass):
//     train()     forward → weighted loss → backward → Adam step
//     report()    every `print_interval` local steps
//     evaluate    every `vis_interval` global steps
//     checkpoint  every `save_model_interval` global steps and
//                 on the final step
//
// Training mode is the autodiff model held by the trainer.
// Evaluation uses `model.valid()`, the inner-backend copy, so
// it never touches parameters or batch-norm statistics.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::{path::PathBuf, sync::Arc};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{InpaintBatch, InpaintBatcher},
    dataset::InpaintDataset,
};
use crate::domain::losses::{format_report, LossBreakdown};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{MetricsLogger, StepMetrics},
};
use crate::ml::{evaluator::evaluate, loss::InpaintingLoss, model::PConvUNet};

/// What a call to `iterate` accomplished
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainSummary {
    /// Steps run by this call
    pub steps: usize,
    /// Global step after the last update
    pub final_step: usize,
    /// Total loss of the last step, if any step ran
    pub last_loss: Option<f64>,
}

pub struct Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<PConvUNet<B>, B>,
{
    stepped:          usize,
    config:           TrainConfig,
    device:           B::Device,
    model:            PConvUNet<B>,
    dataloader_train: Arc<dyn DataLoader<InpaintBatch<B>>>,
    dataset_val:      InpaintDataset,
    criterion:        InpaintingLoss<B>,
    optimizer:        O,
    checkpoints:      CheckpointManager,
    metrics:          MetricsLogger,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<PConvUNet<B>, B>,
{
    /// `step` is the global step the run starts from (0, or the
    /// step restored from a checkpoint). Fails if `config` does not validate.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        step:          usize,
        config:        TrainConfig,
        device:        B::Device,
        model:         PConvUNet<B>,
        dataset_train: InpaintDataset,
        dataset_val:   InpaintDataset,
        criterion:     InpaintingLoss<B>,
        optimizer:     O,
        checkpoints:   CheckpointManager,
        metrics:       MetricsLogger,
    ) -> Result<Self> {
        config.validate()?;

        let mut builder = DataLoaderBuilder::new(InpaintBatcher::<B>::new(device.clone()))
            .batch_size(config.batch_size)
            .shuffle(config.seed);
        if config.num_workers > 0 {
            builder = builder.num_workers(config.num_workers);
        }
        let dataloader_train = builder.build(dataset_train);

        Ok(Self {
            stepped: step,
            config,
            device,
            model,
            dataloader_train,
            dataset_val,
            criterion,
            optimizer,
            checkpoints,
            metrics,
        })
    }

    #[cfg(test)]
    pub fn model(&self) -> &PConvUNet<B> {
        &self.model
    }

    /// Train until the global step reaches `num_iter`.
    pub fn iterate(&mut self, num_iter: usize) -> Result<TrainSummary> {
        println!("Start the training");
        tracing::info!("Training from step {} to {}", self.stepped, num_iter);

        let mut step      = 0usize;
        let mut last_loss = None;

        let loader = Arc::clone(&self.dataloader_train);
        while self.stepped + step < num_iter {
            let mut produced = false;

            for batch in loader.iter() {
                produced = true;
                let global = self.stepped + step;
                if global >= num_iter {
                    break;
                }

                let (loss_dict, loss) = self.train(batch)?;
                last_loss = Some(loss);

                if step % self.config.print_interval == 0 {
                    self.report(global, &loss_dict, loss)?;
                }

                if (global + 1) % self.config.vis_interval == 0 {
                    self.run_evaluation(global)?;
                }

                if (global + 1) % self.config.save_model_interval == 0 || global + 1 == num_iter {
                    let dir = self.checkpoints.save(global + 1, &self.model, &self.optimizer)?;
                    tracing::info!("Checkpoint saved for step {} in '{}'", global + 1, dir.display());
                }

                step += 1;
            }

            if !produced {
                anyhow::bail!("Training data loader produced no batches");
            }
        }

        Ok(TrainSummary {
            steps: step,
            final_step: self.stepped + step,
            last_loss,
        })
    }

    /// One optimisation step on `batch`; returns every term and the weighted total.
    pub fn train(&mut self, batch: InpaintBatch<B>) -> Result<(LossBreakdown, f64)> {
        let (output, _) = self.model.forward(batch.input.clone(), batch.mask.clone());
        let terms = self.criterion.forward(batch.input, batch.mask, output, batch.gt);

        let loss = terms.weighted_sum(&self.config.loss_coef);
        let loss_dict = terms.to_breakdown();
        let total: f64 = loss.clone().into_scalar().elem::<f64>();
        if !total.is_finite() {
            tracing::warn!("Non-finite total loss: {}", total);
        }

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optimizer.step(self.config.lr, self.model.clone(), grads);

        Ok((loss_dict, total))
    }

    /// Print the step line and append it to the metrics CSV
    pub fn report(&self, step: usize, loss_dict: &LossBreakdown, loss: f64) -> Result<()> {
        println!("{}", format_report(step, loss_dict, loss));
        self.metrics.log(&StepMetrics::new(step, *loss_dict, loss))
    }

    fn run_evaluation(&self, global: usize) -> Result<()> {
        let filename = self.evaluation_path(global);
        let model = self.model.valid();
        evaluate(&model, &self.dataset_val, self.config.vis_count, &self.device, &filename)?;
        Ok(())
    }

    fn evaluation_path(&self, global: usize) -> PathBuf {
        PathBuf::from(&self.config.ckpt)
            .join("train_out")
            .join(format!("test_{global}.png"))
    }
}
