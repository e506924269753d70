// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Teacher-forced train + validation loop using Burn's DataLoader
// and Adam.
//
//   - Training uses Autodiff<Wgpu> for gradients
//   - model.valid() returns the model on the inner backend (Wgpu)
//   - The validation batcher must use that inner backend too
//
// Per batch the decoder walks the caption one word at a time,
// always fed the ground-truth previous word; the masked losses
// of all steps are summed and back-propagated once.
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{bail, Result};
use burn::{
    data::dataloader::DataLoaderBuilder,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::time::Instant;

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::CaptionBatcher, dataset::CaptionDataset};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::model::{CaptionModel, CaptionModelConfig};

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

const LOG_EVERY: usize = 100;

pub fn run_training(
    cfg:           &TrainConfig,
    model_cfg:     &CaptionModelConfig,
    train_dataset: CaptionDataset,
    val_dataset:   CaptionDataset,
    ckpt_manager:  &CheckpointManager,
) -> Result<Vec<EpochMetrics>> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend>(cfg, model_cfg, train_dataset, val_dataset, ckpt_manager, device)
}

pub fn train_loop<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    model_cfg:     &CaptionModelConfig,
    train_dataset: CaptionDataset,
    val_dataset:   CaptionDataset,
    ckpt_manager:  &CheckpointManager,
    device:        B::Device,
) -> Result<Vec<EpochMetrics>> {
    let shape          = train_dataset.shape();
    let train_expected = train_dataset.sample_count();
    let val_expected   = val_dataset.sample_count();
    let train_batches  = train_expected.div_ceil(cfg.batch_size);
    let metrics_logger = MetricsLogger::new(ckpt_manager.dir())?;

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: CaptionModel<B> = model_cfg.init(&device);
    tracing::info!(
        "Model ready: embedding_dim={}, units={}, vocab_size={}",
        model_cfg.embedding_dim, model_cfg.units, model_cfg.vocab_size
    );

    let mut optim = AdamConfig::new().init();

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let shuffle_seed  = cfg.seed.unwrap_or_else(rand::random);
    let train_batcher = CaptionBatcher::<B>::new(device.clone(), shape);
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(shuffle_seed)
        .num_workers(cfg.num_workers.max(1))
        .build(train_dataset);

    // ── Validation data loader (InnerBackend, no autodiff) ──────────────────────
    let val_batcher = CaptionBatcher::<B::InnerBackend>::new(device.clone(), shape);
    let val_loader  = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers.max(1))
        .build(val_dataset);

    let mut history       = Vec::with_capacity(cfg.epochs);
    let mut best_val_loss = f64::INFINITY;

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        let start = Instant::now();

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut batches        = 0usize;
        let mut train_seen     = 0usize;

        for (iteration, batch) in train_loader.iter().enumerate() {
            let [batch_len, steps] = batch.targets.dims();
            let steps   = steps as f64;
            train_seen += batch_len;
            let loss  = model.forward_loss(batch.features, batch.targets);

            // Reported per-step so the number does not scale with max_length
            let batch_loss = loss.clone().into_scalar().elem::<f64>() / steps;
            train_loss_sum += batch_loss;
            batches        += 1;

            if iteration % LOG_EVERY == 0 {
                tracing::info!(
                    "Epoch {} Batch {}/{} Loss {:.4}",
                    epoch, iteration, train_batches, batch_loss
                );
            }

            // Backward pass + Adam update
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(cfg.lr, model, grads);
        }

        check_coverage("training", epoch, train_seen, train_expected)?;

        let avg_train_loss = if batches > 0 { train_loss_sum / batches as f64 } else { f64::NAN };

        // ── Validation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();

        let mut val_loss_sum = 0.0f64;
        let mut val_batches  = 0usize;
        let mut val_seen     = 0usize;

        for batch in val_loader.iter() {
            let [batch_len, steps] = batch.targets.dims();
            let steps  = steps as f64;
            val_seen  += batch_len;
            let loss  = model_valid.forward_loss(batch.features, batch.targets);
            val_loss_sum += loss.into_scalar().elem::<f64>() / steps;
            val_batches  += 1;
        }

        check_coverage("validation", epoch, val_seen, val_expected)?;

        let avg_val_loss = if val_batches > 0 { val_loss_sum / val_batches as f64 } else { f64::NAN };
        let seconds      = start.elapsed().as_secs_f64();

        println!(
            "Epoch {:>3}/{} | train_loss={:.6} | val_loss={:.6} | {:.2} sec",
            epoch, cfg.epochs, avg_train_loss, avg_val_loss, seconds,
        );

        let metrics = EpochMetrics::new(epoch, avg_train_loss, avg_val_loss, seconds);
        metrics_logger.log(&metrics)?;
        if metrics.is_improvement(best_val_loss) {
            best_val_loss = metrics.val_loss;
            tracing::info!("Validation loss improved to {:.4}", best_val_loss);
        }
        history.push(metrics);

        ckpt_manager.save_model(&model, epoch)?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
    }

    tracing::info!("Training complete!");
    Ok(history)
}

/// The data loader ends a worker's stream at the first item it cannot
/// read, so a short epoch means feature files broke mid-run.
fn check_coverage(phase: &str, epoch: usize, seen: usize, expected: usize) -> Result<()> {
    if seen < expected {
        bail!(
            "Epoch {epoch}: {phase} saw {seen} of {expected} samples; \
             a cached feature file could not be read (see the error log above)"
        );
    }
    Ok(())
}
