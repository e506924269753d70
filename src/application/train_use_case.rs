// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the training pipeline in order:
//
//   Step 1: Load the captions table     (Layer 4 - data)
//   Step 2: Clean the captions          (Layer 4 - data)
//   Step 3: Attach cached features      (Layer 6 - infra)
//   Step 4: Build / load vocabulary     (Layer 6 - infra)
//   Step 5: Vectorise captions          (Layer 6 - infra)
//   Step 6: Split train/validation      (Layer 4 - data)
//   Step 7: Build datasets              (Layer 4 - data)
//   Step 8: Save config                 (Layer 6 - infra)
//   Step 9: Run training loop           (Layer 5 - ml)
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf};

use crate::data::{
    dataset::{CaptionDataset, CaptionSample},
    loader::CsvCaptionLoader,
    preprocessor::Preprocessor,
    splitter::split_grouped,
};
use crate::domain::traits::CaptionSource;
use crate::infra::{
    checkpoint::CheckpointManager,
    feature_cache::{FeatureCache, FeatureShape},
    tokenizer_store::TokenizerStore,
};
use crate::ml::{model::CaptionModelConfig, trainer::run_training};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Saved as train_config.json
// so inference can rebuild the same model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub captions_file:  String,
    pub images_dir:     String,
    pub features_dir:   String,
    pub checkpoint_dir: String,
    pub max_length:     usize,
    pub vocab_size:     usize,
    pub batch_size:     usize,
    pub epochs:         usize,
    pub lr:             f64,
    pub embedding_dim:  usize,
    pub units:          usize,
    pub train_fraction: f64,
    pub num_workers:    usize,
    pub seed:           Option<u64>,
    /// Filled in from the backbone that produced the feature cache
    #[serde(default)]
    pub feature_shape:  Option<FeatureShape>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            captions_file:  "data/captions.txt".to_string(),
            images_dir:     "data/Images".to_string(),
            features_dir:   "feature_vectors".to_string(),
            checkpoint_dir: "checkpoints".to_string(),
            max_length:     40,
            vocab_size:     5000,
            batch_size:     64,
            epochs:         10,
            lr:             1e-3,
            embedding_dim:  256,
            units:          512,
            train_fraction: 0.8,
            num_workers:    4,
            seed:           None,
            feature_shape:  None,
        }
    }
}

impl TrainConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_length < 2 {
            bail!("max_length must be at least 2 ([start] plus one word), got {}", self.max_length);
        }
        if self.vocab_size < 4 {
            bail!("vocab_size must leave room for [PAD], [UNK], [start] and [end], got {}", self.vocab_size);
        }
        if self.batch_size == 0 || self.epochs == 0 {
            bail!("batch_size and epochs must be positive");
        }
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            bail!("train_fraction must be in (0, 1), got {}", self.train_fraction);
        }
        Ok(())
    }

    /// Architecture of the caption model for a given vocabulary size.
    pub fn model_config(&self, vocab_size: usize) -> Result<CaptionModelConfig> {
        let shape = self
            .feature_shape
            .ok_or_else(|| anyhow::anyhow!("Training config has no feature shape; run 'prepare' first"))?;
        Ok(CaptionModelConfig::new(shape.dim, vocab_size)
            .with_embedding_dim(self.embedding_dim)
            .with_units(self.units))
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None       => StdRng::from_entropy(),
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let mut cfg = self.config.clone();
        cfg.validate()?;

        // ── Step 1: Load the captions table ──────────────────────────────────
        let loader  = CsvCaptionLoader::new(&cfg.captions_file, &cfg.images_dir);
        let records = loader.load_all()?;

        // ── Step 2: Clean captions ────────────────────────────────────────────
        let preprocessor = Preprocessor::new();

        // ── Step 3: Attach cached features ────────────────────────────────────
        // The backbone config says what shape every feature file has
        let backbone_cfg = CheckpointManager::new(&cfg.features_dir)?.load_backbone_config()?;
        let shape        = backbone_cfg.feature_shape();
        cfg.feature_shape = Some(shape);

        let cache = FeatureCache::new(&cfg.features_dir)?;
        let total = records.len();
        let pairs: Vec<(PathBuf, String)> = records
            .into_iter()
            .filter(|r| cache.contains(&r.image))
            .map(|r| (cache.path_for(&r.image), preprocessor.clean(&r.caption)))
            .collect();

        if pairs.len() < total {
            tracing::warn!(
                "{} of {} captions have no cached features and are skipped",
                total - pairs.len(),
                total
            );
        }

        // The data loader stops a worker at the first unreadable item,
        // so every feature file is checked once up front
        let pairs = keep_readable(pairs, shape);
        if pairs.is_empty() {
            bail!(
                "No captions with cached features in '{}'. Run 'prepare' first.",
                cfg.features_dir
            );
        }

        // ── Step 4: Build / load vocabulary ───────────────────────────────────
        let captions: Vec<String> = pairs.iter().map(|(_, c)| c.clone()).collect();
        let vocab = TokenizerStore::new(&cfg.checkpoint_dir)
            .load_or_build(&captions, cfg.vocab_size, cfg.max_length)?;
        tracing::info!("Vocabulary size: {}", vocab.size());

        // ── Step 5: Vectorise captions ────────────────────────────────────────
        let samples = pairs
            .into_iter()
            .map(|(feature_path, caption)| {
                Ok(CaptionSample { feature_path, token_ids: vocab.encode(&caption)? })
            })
            .collect::<Result<Vec<_>>>()?;

        // ── Step 6: Train / validation split by image ─────────────────────────
        let mut rng = cfg.rng();
        let (train_samples, val_samples) = split_grouped(
            samples,
            |s: &CaptionSample| s.feature_path.clone(),
            cfg.train_fraction,
            &mut rng,
        );
        tracing::info!(
            "Split: {} train, {} validation",
            train_samples.len(),
            val_samples.len()
        );
        if train_samples.is_empty() || val_samples.is_empty() {
            bail!(
                "Split left {} training and {} validation captions; add more images or change train_fraction",
                train_samples.len(),
                val_samples.len()
            );
        }

        // ── Step 7: Build Burn datasets ───────────────────────────────────────
        let train_dataset = CaptionDataset::new(train_samples, shape);
        let val_dataset   = CaptionDataset::new(val_samples, shape);

        // ── Step 8: Save config for inference ─────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_config(&cfg)?;

        // ── Step 9: Run training loop (Layer 5) ───────────────────────────────
        let model_cfg = cfg.model_config(vocab.size())?;
        run_training(&cfg, &model_cfg, train_dataset, val_dataset, &ckpt_manager)?;

        Ok(())
    }
}

/// Drop captions whose feature file cannot be read back with `shape`.
/// Each distinct file is loaded once.
fn keep_readable(pairs: Vec<(PathBuf, String)>, shape: FeatureShape) -> Vec<(PathBuf, String)> {
    let mut readable: HashMap<PathBuf, bool> = HashMap::new();
    let before = pairs.len();

    let kept: Vec<(PathBuf, String)> = pairs
        .into_iter()
        .filter(|(path, _)| {
            *readable.entry(path.clone()).or_insert_with(|| {
                match FeatureCache::load(path, shape) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable feature file: {e:#}");
                        false
                    }
                }
            })
        })
        .collect();

    if kept.len() < before {
        tracing::warn!(
            "{} captions dropped because their feature file could not be read",
            before - kept.len()
        );
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrainConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_settings() {
        let cfg = TrainConfig { max_length: 1, ..TrainConfig::default() };
        assert!(cfg.validate().is_err());

        let cfg = TrainConfig { train_fraction: 0.0, ..TrainConfig::default() };
        assert!(cfg.validate().is_err());

        // Nothing would be left to validate on
        let cfg = TrainConfig { train_fraction: 1.0, ..TrainConfig::default() };
        assert!(cfg.validate().is_err());

        let cfg = TrainConfig { batch_size: 0, ..TrainConfig::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_model_config_needs_feature_shape() {
        let mut cfg = TrainConfig::default();
        assert!(cfg.model_config(100).is_err());

        cfg.feature_shape = Some(FeatureShape::new(64, 2048));
        let model_cfg = cfg.model_config(100).unwrap();
        assert_eq!(model_cfg.feature_dim, 2048);
        assert_eq!(model_cfg.vocab_size, 100);
        assert_eq!(model_cfg.units, 512);
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let cfg  = TrainConfig { seed: Some(3), ..TrainConfig::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seed, Some(3));
        assert_eq!(back.max_length, 40);
    }

    #[test]
    fn test_keep_readable_drops_corrupt_feature_files() {
        let tmp   = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(tmp.path()).unwrap();
        let shape = FeatureShape::new(2, 3);

        let good = cache.save(Path::new("good.jpg"), &[0.5; 6], shape).unwrap();
        let bad  = cache.save(Path::new("bad.jpg"), &[0.5; 6], shape).unwrap();
        std::fs::write(&bad, b"garbage").unwrap();

        let pairs = vec![
            (good.clone(), "[start] a dog [end]".to_string()),
            (bad.clone(),  "[start] a cat [end]".to_string()),
            (good.clone(), "[start] the dog [end]".to_string()),
            (bad,          "[start] the cat [end]".to_string()),
        ];

        let kept = keep_readable(pairs, shape);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|(path, _)| *path == good));
    }
}
