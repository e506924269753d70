// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores weights using Burn's CompactRecorder.
//
// Two directories use it:
//
//   checkpoints/                 (written by `train`)
//     model_epoch_1.mpk.gz   ← encoder + decoder weights after epoch 1
//     ...
//     latest_epoch.json      ← number of the newest epoch file
//     train_config.json      ← hyper-parameters, needed to rebuild the model
//
//   feature_vectors/             (written by `prepare`)
//     backbone.mpk.gz        ← the CNN weights the features came from
//     backbone.json          ← its architecture
//
// A record only loads into a model of matching architecture, which
// is why each set of weights travels with its config.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::backbone::{Backbone, BackboneConfig};
use crate::ml::model::CaptionModel;

const BACKBONE_FILE:        &str = "backbone";
const BACKBONE_CONFIG_FILE: &str = "backbone.json";
const TRAIN_CONFIG_FILE:    &str = "train_config.json";
const LATEST_EPOCH_FILE:    &str = "latest_epoch.json";

/// Manages saving and loading of weights and their configs.
/// All files are stored in the configured directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a new CheckpointManager, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ── Caption model ─────────────────────────────────────────────────────────

    /// Save model weights for a given epoch and point latest_epoch.json at it.
    pub fn save_model<B: Backend>(&self, model: &CaptionModel<B>, epoch: usize) -> Result<()> {
        // The recorder adds the .mpk.gz extension
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest_path = self.dir.join(LATEST_EPOCH_FILE);
        fs::write(&latest_path, serde_json::to_string(&epoch)?)
            .with_context(|| format!("Failed to write {LATEST_EPOCH_FILE}"))?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Load weights from the latest saved epoch into `model`.
    pub fn load_model<B: Backend>(
        &self,
        model:  CaptionModel<B>,
        device: &B::Device,
    ) -> Result<CaptionModel<B>> {
        let epoch = self.latest_epoch()?;
        let path  = self.dir.join(format!("model_epoch_{epoch}"));

        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Have you trained the model first?",
                    path.display()
                )
            })?;

        Ok(model.load_record(record))
    }

    /// Save the training configuration to JSON.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(TRAIN_CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    /// Load the training configuration from JSON.
    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(TRAIN_CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'caption'.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Read latest_epoch.json and return the epoch number.
    pub fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join(LATEST_EPOCH_FILE);
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{LATEST_EPOCH_FILE}'. Have you run 'train' first?"))?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }

    // ── Backbone ──────────────────────────────────────────────────────────────

    pub fn has_backbone(&self) -> bool {
        self.dir.join(BACKBONE_CONFIG_FILE).is_file()
    }

    /// Persist the backbone's architecture and weights.
    pub fn save_backbone<B: Backend>(&self, backbone: &Backbone<B>, cfg: &BackboneConfig) -> Result<()> {
        let cfg_path = self.dir.join(BACKBONE_CONFIG_FILE);
        fs::write(&cfg_path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write '{}'", cfg_path.display()))?;

        let path = self.dir.join(BACKBONE_FILE);
        CompactRecorder::new()
            .record(backbone.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save backbone to '{}'", path.display()))?;

        tracing::debug!("Saved backbone to '{}'", self.dir.display());
        Ok(())
    }

    pub fn load_backbone_config(&self) -> Result<BackboneConfig> {
        let path = self.dir.join(BACKBONE_CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read '{}'. Make sure you have run 'prepare' first.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Rebuild the backbone saved in this directory.
    pub fn load_backbone<B: Backend>(&self, device: &B::Device) -> Result<(Backbone<B>, BackboneConfig)> {
        let cfg = self.load_backbone_config()?;
        let backbone = load_backbone_weights(cfg.init(device), &self.dir.join(BACKBONE_FILE), device)?;
        Ok((backbone, cfg))
    }
}

/// Load a backbone record into an already initialised backbone.
/// `path` is given without the .mpk.gz extension; the recorder adds it.
pub fn load_backbone_weights<B: Backend>(
    backbone: Backbone<B>,
    path:     &Path,
    device:   &B::Device,
) -> Result<Backbone<B>> {
    let record = CompactRecorder::new()
        .load(path.to_path_buf(), device)
        .with_context(|| format!("Cannot load backbone weights from '{}'", path.display()))?;
    Ok(backbone.load_record(record))
}
