// ============================================================
// Layer 4 — Caption Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<CaptionItem>
// into tensors.
//
// How batching works here:
//   Input:  N items, each with a [L, F] feature grid and
//           T token ids (T = max_length)
//   Output: features [N, L, F] (float), targets [N, T] (int)
//
// All captions are already padded to the same length by the
// Vocabulary, so no dynamic padding is needed.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::CaptionItem;
use crate::infra::feature_cache::FeatureShape;

// ─── CaptionBatch ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct CaptionBatch<B: Backend> {
    /// Cached image features, shape: [batch_size, locations, feature_dim]
    pub features: Tensor<B, 3>,

    /// Padded caption ids, shape: [batch_size, max_length]
    pub targets: Tensor<B, 2, Int>,
}

// ─── CaptionBatcher ───────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct CaptionBatcher<B: Backend> {
    device: B::Device,
    shape:  FeatureShape,
}

impl<B: Backend> CaptionBatcher<B> {
    pub fn new(device: B::Device, shape: FeatureShape) -> Self {
        Self { device, shape }
    }
}

impl<B: Backend> Batcher<CaptionItem, CaptionBatch<B>> for CaptionBatcher<B> {
    fn batch(&self, items: Vec<CaptionItem>) -> CaptionBatch<B> {
        let batch_size = items.len();
        let seq_len    = items.first().map(|i| i.token_ids.len()).unwrap_or(0);

        let feature_flat: Vec<f32> = items
            .iter()
            .flat_map(|item| item.features.iter().copied())
            .collect();

        // Burn Int tensors are built from i64 here and converted to the
        // backend's int element on creation
        let target_flat: Vec<i64> = items
            .iter()
            .flat_map(|item| item.token_ids.iter().map(|&id| id as i64))
            .collect();

        let features = Tensor::<B, 3>::from_data(
            TensorData::new(feature_flat, [batch_size, self.shape.locations, self.shape.dim]),
            &self.device,
        );

        let targets = Tensor::<B, 2, Int>::from_data(
            TensorData::new(target_flat, [batch_size, seq_len]),
            &self.device,
        );

        CaptionBatch { features, targets }
    }
}
