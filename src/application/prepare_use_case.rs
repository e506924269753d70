// ============================================================
// Layer 2 — PrepareUseCase
// ============================================================
// Runs every image through the frozen backbone once and caches
// the resulting feature grid as <features_dir>/<image>.npy, so
// training never touches raw pixels.
//
//   Step 1: Load the captions table and list unique images
//   Step 2: Resolve the backbone (reuse, load weights, or init)
//   Step 3: Decode images in parallel, extract, write .npy files
//
// Reference: Xu et al. (2015) Show, Attend and Tell §3.1

use anyhow::{bail, Result};
use burn::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::{
    image_loader::load_image,
    loader::{unique_images, CsvCaptionLoader},
};
use crate::domain::traits::CaptionSource;
use crate::infra::{
    checkpoint::{load_backbone_weights, CheckpointManager},
    feature_cache::FeatureCache,
};
use crate::ml::backbone::{Backbone, BackboneConfig};

type PrepareBackend = burn::backend::Wgpu;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareConfig {
    pub captions_file:    String,
    pub images_dir:       String,
    pub features_dir:     String,
    pub image_size:       usize,
    pub feature_dim:      usize,
    pub grid:             usize,
    pub batch_size:       usize,
    /// Re-extract images whose cache file already exists
    pub overwrite:        bool,
    /// Burn record to load into the backbone (without .mpk.gz)
    pub backbone_weights: Option<String>,
}

impl Default for PrepareConfig {
    fn default() -> Self {
        Self {
            captions_file:    "data/captions.txt".to_string(),
            images_dir:       "data/Images".to_string(),
            features_dir:     "feature_vectors".to_string(),
            image_size:       299,
            feature_dim:      2048,
            grid:             8,
            batch_size:       16,
            overwrite:        false,
            backbone_weights: None,
        }
    }
}

impl PrepareConfig {
    pub fn backbone_config(&self) -> BackboneConfig {
        BackboneConfig::new()
            .with_image_size(self.image_size)
            .with_feature_dim(self.feature_dim)
            .with_grid(self.grid)
    }
}

/// What a prepare run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrepareSummary {
    pub extracted: usize,
    pub skipped:   usize,
    pub failed:    usize,
}

pub struct PrepareUseCase {
    config: PrepareConfig,
}

impl PrepareUseCase {
    pub fn new(config: PrepareConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<PrepareSummary> {
        let cfg    = &self.config;
        let device = burn::backend::wgpu::WgpuDevice::default();

        if cfg.batch_size == 0 {
            bail!("batch_size must be positive");
        }

        // ── Step 1: Unique images ─────────────────────────────────────────────
        let records = CsvCaptionLoader::new(&cfg.captions_file, &cfg.images_dir).load_all()?;
        let images  = unique_images(&records);
        tracing::info!("{} captions over {} unique images", records.len(), images.len());

        // ── Step 2: Backbone ──────────────────────────────────────────────────
        let store    = CheckpointManager::new(&cfg.features_dir)?;
        let backbone = resolve_backbone::<PrepareBackend>(cfg, &store, &device)?;

        // ── Step 3: Extract and cache ─────────────────────────────────────────
        let cache   = FeatureCache::new(&cfg.features_dir)?;
        let summary = extract_features(
            &backbone,
            &cfg.backbone_config(),
            &cache,
            &images,
            cfg.batch_size,
            cfg.overwrite,
            &device,
        )?;

        println!(
            "Prepared features: {} extracted, {} already cached, {} failed",
            summary.extracted, summary.skipped, summary.failed
        );
        Ok(summary)
    }
}

/// Reuse the backbone stored with the cache so features stay comparable,
/// unless the caller asks to rebuild it.
fn resolve_backbone<B: Backend>(
    cfg:    &PrepareConfig,
    store:  &CheckpointManager,
    device: &B::Device,
) -> Result<Backbone<B>> {
    let wanted = cfg.backbone_config();

    if store.has_backbone() && !cfg.overwrite {
        let (backbone, existing) = store.load_backbone::<B>(device)?;
        if existing.feature_shape() != wanted.feature_shape() || existing.image_size != wanted.image_size {
            bail!(
                "Feature cache in '{}' was built with a different backbone; pass --overwrite to rebuild it",
                store.dir().display()
            );
        }
        tracing::info!("Reusing backbone stored in '{}'", store.dir().display());
        return Ok(backbone);
    }

    let backbone = match &cfg.backbone_weights {
        Some(path) => {
            tracing::info!("Loading backbone weights from '{}'", path);
            load_backbone_weights(wanted.init::<B>(device), Path::new(path), device)?
        }
        None => {
            tracing::warn!(
                "No backbone weights given; using a randomly initialised backbone. \
                 Captions will only be as good as its untrained features."
            );
            wanted.init::<B>(device)
        }
    };

    store.save_backbone(&backbone, &wanted)?;
    Ok(backbone)
}

/// Extract and cache features for every image not already cached.
pub fn extract_features<B: Backend>(
    backbone:     &Backbone<B>,
    backbone_cfg: &BackboneConfig,
    cache:        &FeatureCache,
    images:       &[PathBuf],
    batch_size:   usize,
    overwrite:    bool,
    device:       &B::Device,
) -> Result<PrepareSummary> {
    let shape = backbone_cfg.feature_shape();
    let size  = backbone_cfg.image_size;

    let mut summary = PrepareSummary::default();

    let pending: Vec<&PathBuf> = images
        .iter()
        .filter(|img| overwrite || !cache.contains(img))
        .collect();
    summary.skipped = images.len() - pending.len();

    let total_batches = pending.len().div_ceil(batch_size);

    for (batch_idx, batch) in pending.chunks(batch_size).enumerate() {
        // Decode + resize in parallel; failures are logged and dropped
        let decoded: Vec<(&PathBuf, Vec<f32>)> = batch
            .par_iter()
            .filter_map(|&path| match load_image(path, size as u32) {
                Ok(pixels) => Some((path, pixels)),
                Err(e) => {
                    tracing::warn!("Skipping '{}': {:#}", path.display(), e);
                    None
                }
            })
            .collect();
        summary.failed += batch.len() - decoded.len();

        let (paths, pixels): (Vec<&PathBuf>, Vec<Vec<f32>>) = decoded.into_iter().unzip();
        let features = backbone.extract_flat(&pixels, size, device)?;

        for (path, feats) in paths.iter().zip(features.iter()) {
            cache.save(path, feats, shape)?;
            summary.extracted += 1;
        }

        tracing::debug!("Batch {}/{} done", batch_idx + 1, total_batches);
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn write_png(path: &Path) {
        image::RgbImage::from_pixel(12, 10, image::Rgb([200, 30, 90]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_extracts_skips_and_reports_failures() {
        let tmp = tempfile::tempdir().unwrap();
        let a   = tmp.path().join("a.png");
        let b   = tmp.path().join("b.png");
        let bad = tmp.path().join("bad.png");
        write_png(&a);
        write_png(&b);
        std::fs::write(&bad, b"not an image").unwrap();

        let device = Default::default();
        let cfg    = BackboneConfig::new().with_image_size(16).with_feature_dim(4).with_grid(2);
        let model  = cfg.init::<TestBackend>(&device);
        let cache  = FeatureCache::new(tmp.path().join("features")).unwrap();
        let images = vec![a.clone(), b.clone(), bad.clone()];

        let first = extract_features(&model, &cfg, &cache, &images, 2, false, &device).unwrap();
        assert_eq!(first, PrepareSummary { extracted: 2, skipped: 0, failed: 1 });
        assert!(cache.contains(&a));
        assert!(!cache.contains(&bad));

        let loaded = FeatureCache::load(&cache.path_for(&a), cfg.feature_shape()).unwrap();
        assert_eq!(loaded.len(), 4 * 4);

        // Second run only retries the image that failed
        let second = extract_features(&model, &cfg, &cache, &images, 2, false, &device).unwrap();
        assert_eq!(second, PrepareSummary { extracted: 0, skipped: 2, failed: 1 });
    }

    #[test]
    fn test_backbone_is_persisted_and_reused() {
        let tmp    = tempfile::tempdir().unwrap();
        let device = Default::default();
        let cfg    = PrepareConfig {
            features_dir: tmp.path().to_string_lossy().into_owned(),
            image_size:   16,
            feature_dim:  4,
            grid:         2,
            ..PrepareConfig::default()
        };
        let store = CheckpointManager::new(&cfg.features_dir).unwrap();

        resolve_backbone::<TestBackend>(&cfg, &store, &device).unwrap();
        assert!(store.has_backbone());

        // Same shape: reused
        assert!(resolve_backbone::<TestBackend>(&cfg, &store, &device).is_ok());

        // Different shape without --overwrite: refused
        let other = PrepareConfig { feature_dim: 8, ..cfg.clone() };
        assert!(resolve_backbone::<TestBackend>(&other, &store, &device).is_err());
    }
}
