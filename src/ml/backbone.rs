// ============================================================
// Layer 5 — Backbone CNN (frozen feature extractor)
// ============================================================
// Turns a preprocessed image into a grid of feature vectors:
//
//   [batch, 3, size, size]
//        │  4 × (3×3 conv, stride 2, ReLU)   299 → 150 → 75 → 38 → 19
//        ▼
//   [batch, 256, 19, 19]
//        │  1×1 conv projection to feature_dim channels
//        ▼
//   [batch, feature_dim, 19, 19]
//        │  adaptive average pool
//        ▼
//   [batch, feature_dim, grid, grid]
//        │  flatten the spatial grid, move channels last
//        ▼
//   [batch, grid * grid, feature_dim]
//
// The backbone is never trained by this crate. `prepare` either
// loads weights from a burn record or initialises them once, and
// the weights it used are stored next to the feature cache so
// captioning a new image goes through the very same extractor.

use anyhow::{bail, Result};
use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::data::image_loader::CHANNELS;
use crate::infra::feature_cache::FeatureShape;

const STAGE_CHANNELS: [usize; 4] = [32, 64, 128, 256];

#[derive(Config, Debug)]
pub struct BackboneConfig {
    /// Images are resized to image_size × image_size
    #[config(default = 299)]
    pub image_size: usize,
    /// Channels per output location
    #[config(default = 2048)]
    pub feature_dim: usize,
    /// Output grid side; locations = grid * grid
    #[config(default = 8)]
    pub grid: usize,
}

impl BackboneConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Backbone<B> {
        let mut stages  = Vec::with_capacity(STAGE_CHANNELS.len());
        let mut in_ch   = CHANNELS;
        for &out_ch in STAGE_CHANNELS.iter() {
            stages.push(
                Conv2dConfig::new([in_ch, out_ch], [3, 3])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device),
            );
            in_ch = out_ch;
        }

        let projection = Conv2dConfig::new([in_ch, self.feature_dim], [1, 1]).init(device);
        let pool       = AdaptiveAvgPool2dConfig::new([self.grid, self.grid]).init();

        Backbone { stages, projection, pool, feature_dim: self.feature_dim, grid: self.grid }
    }

    pub fn feature_shape(&self) -> FeatureShape {
        FeatureShape::new(self.grid * self.grid, self.feature_dim)
    }
}

#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    pub stages:      Vec<Conv2d<B>>,
    pub projection:  Conv2d<B>,
    pub pool:        AdaptiveAvgPool2d,
    pub feature_dim: usize,
    pub grid:        usize,
}

impl<B: Backend> Backbone<B> {
    /// images: [batch, 3, H, W] → [batch, grid * grid, feature_dim]
    pub fn extract(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let mut x = images;
        for stage in &self.stages {
            x = relu(stage.forward(x));
        }
        let x = self.pool.forward(self.projection.forward(x)); // [b, F, g, g]

        let [batch, channels, _, _] = x.dims();
        x.reshape([batch, channels, self.grid * self.grid])
            .swap_dims(1, 2)
    }

    /// Convenience for callers holding flat preprocessed images
    /// (each of length 3 * size * size, as produced by load_image).
    pub fn extract_flat(&self, images: &[Vec<f32>], size: usize, device: &B::Device) -> Result<Vec<Vec<f32>>> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let pixels = CHANNELS * size * size;
        if let Some(bad) = images.iter().find(|img| img.len() != pixels) {
            bail!("Expected {} values per {}x{} image, got {}", pixels, size, size, bad.len());
        }

        let batch = images.len();
        let flat: Vec<f32> = images.iter().flat_map(|img| img.iter().copied()).collect();
        let input = Tensor::<B, 4>::from_data(
            TensorData::new(flat, [batch, CHANNELS, size, size]),
            device,
        );

        let per_image = self.grid * self.grid * self.feature_dim;
        let values: Vec<f32> = self
            .extract(input)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| anyhow::anyhow!("Backbone read-back failed: {e:?}"))?;

        if values.len() != batch * per_image {
            bail!("Backbone returned {} values for {} images", values.len(), batch);
        }

        Ok(values.chunks(per_image).map(|c| c.to_vec()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_extract_shape() {
        let device   = Default::default();
        let backbone = BackboneConfig::new()
            .with_feature_dim(16)
            .with_grid(2)
            .init::<TestBackend>(&device);

        let images = Tensor::<TestBackend, 4>::zeros([3, 3, 32, 32], &device);
        assert_eq!(backbone.extract(images).dims(), [3, 4, 16]);
    }

    #[test]
    fn test_extract_flat_splits_per_image() {
        let device   = Default::default();
        let backbone = BackboneConfig::new()
            .with_feature_dim(5)
            .with_grid(2)
            .init::<TestBackend>(&device);

        let images = vec![vec![0.1f32; 3 * 24 * 24], vec![-0.3f32; 3 * 24 * 24]];
        let out    = backbone.extract_flat(&images, 24, &device).unwrap();

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|f| f.len() == 4 * 5));
    }

    #[test]
    fn test_extract_flat_rejects_wrong_image_size() {
        let device   = Default::default();
        let backbone = BackboneConfig::new()
            .with_feature_dim(5)
            .with_grid(2)
            .init::<TestBackend>(&device);

        let images = vec![vec![0.0f32; 3 * 24 * 24], vec![0.0f32; 3 * 16 * 16]];
        assert!(backbone.extract_flat(&images, 24, &device).is_err());
        assert!(backbone.extract_flat(&[], 24, &device).unwrap().is_empty());
    }

    #[test]
    fn test_feature_shape() {
        let cfg = BackboneConfig::new();
        assert_eq!(cfg.feature_shape(), FeatureShape::new(64, 2048));
    }
}
