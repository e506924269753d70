// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Turns one image into a caption:
//
//   image → backbone → feature vectors → encoder
//         → decoder loop from [start] until [end] or max_length
//
// Each step picks the next word greedily (argmax) or by sampling
// from the softmax distribution, and keeps the attention weights
// so the caller can see where the model looked.
//
// Reference: Xu et al. (2015) Show, Attend and Tell §4

use anyhow::{Context, Result};
use burn::{prelude::*, tensor::activation::softmax};
use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};
use std::path::Path;

use crate::data::image_loader::load_image;
use crate::domain::caption::{CaptionResult, DecodeStrategy};
use crate::infra::{
    checkpoint::CheckpointManager,
    tokenizer_store::{TokenizerStore, Vocabulary, PAD_ID, UNK_TOKEN},
};
use crate::ml::{
    backbone::{Backbone, BackboneConfig},
    model::CaptionModel,
};

type InferBackend = burn::backend::Wgpu;

/// Word ids chosen by the decoder plus the attention map of each step.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub ids:       Vec<u32>,
    pub attention: Vec<Vec<f32>>,
}

/// Run the decoder loop on one image's features: [1, locations, feature_dim].
///
/// The end token and the padding id both stop decoding and are never emitted.
/// `attention` holds one row per emitted word.
pub fn decode<B: Backend, R: Rng + ?Sized>(
    model:      &CaptionModel<B>,
    features:   Tensor<B, 3>,
    start_id:   u32,
    end_id:     u32,
    max_length: usize,
    strategy:   DecodeStrategy,
    rng:        &mut R,
) -> Result<Decoded> {
    let device = features.device();

    let features   = model.encoder.forward(features);
    let mut hidden = model.decoder.reset_state(1, &device);
    let mut input  = token_tensor::<B>(start_id, &device);

    let mut ids       = Vec::new();
    let mut attention = Vec::new();

    for _ in 0..max_length {
        let step = model.decoder.forward(input, features.clone(), hidden);
        hidden   = step.hidden;

        let probs = to_vec(softmax(step.logits, 1))?;
        let next  = choose(&probs, strategy, rng)?;

        if next == end_id || next == PAD_ID {
            break;
        }
        ids.push(next);
        attention.push(to_vec(step.attention)?);
        input = token_tensor::<B>(next, &device);
    }

    Ok(Decoded { ids, attention })
}

/// Pick the next word id from a probability distribution.
pub fn choose<R: Rng + ?Sized>(probs: &[f32], strategy: DecodeStrategy, rng: &mut R) -> Result<u32> {
    match strategy {
        DecodeStrategy::Greedy => probs
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| i as u32)
            .ok_or_else(|| anyhow::anyhow!("Empty probability distribution")),
        DecodeStrategy::Sample => {
            let dist = WeightedIndex::new(probs.iter().map(|p| p.max(0.0)))
                .context("Cannot sample from the predicted distribution")?;
            Ok(dist.sample(rng) as u32)
        }
    }
}

fn token_tensor<B: Backend>(id: u32, device: &B::Device) -> Tensor<B, 2, Int> {
    Tensor::from_data(TensorData::new(vec![id as i64], [1, 1]), device)
}

fn to_vec<B: Backend>(tensor: Tensor<B, 2>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("Tensor read-back failed: {e:?}"))
}

// ─── Inferencer ───────────────────────────────────────────────────────────────
pub struct Inferencer {
    model:        CaptionModel<InferBackend>,
    backbone:     Backbone<InferBackend>,
    backbone_cfg: BackboneConfig,
    vocab:        Vocabulary,
    device:       burn::backend::wgpu::WgpuDevice,
}

impl Inferencer {
    /// Rebuild model, vocabulary and backbone from what `prepare` and
    /// `train` left on disk.
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager, features_dir: &Path) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        let cfg    = ckpt_manager.load_config()?;

        let vocab     = TokenizerStore::new(ckpt_manager.dir()).load(cfg.max_length)?;
        let model_cfg = cfg.model_config(vocab.size())?;
        let model     = ckpt_manager.load_model(model_cfg.init::<InferBackend>(&device), &device)?;
        tracing::info!("Model loaded from checkpoint");

        let (backbone, backbone_cfg) =
            CheckpointManager::new(features_dir)?.load_backbone::<InferBackend>(&device)?;
        if Some(backbone_cfg.feature_shape()) != cfg.feature_shape {
            anyhow::bail!(
                "Backbone in '{}' does not match the features the model was trained on",
                features_dir.display()
            );
        }

        Ok(Self { model, backbone, backbone_cfg, vocab, device })
    }

    /// Caption one image file.
    pub fn predict<R: Rng + ?Sized>(
        &self,
        image:    &Path,
        strategy: DecodeStrategy,
        rng:      &mut R,
    ) -> Result<CaptionResult> {
        let size   = self.backbone_cfg.image_size;
        let pixels = load_image(image, size as u32)?;

        let features = self
            .backbone
            .extract_flat(&[pixels], size, &self.device)?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("Backbone produced no features"))?;

        let shape    = self.backbone_cfg.feature_shape();
        let features = Tensor::<InferBackend, 3>::from_data(
            TensorData::new(features, [1, shape.locations, shape.dim]),
            &self.device,
        );

        let decoded = decode(
            &self.model,
            features,
            self.vocab.start_id()?,
            self.vocab.end_id()?,
            self.vocab.max_length(),
            strategy,
            rng,
        )?;

        let words = decoded
            .ids
            .iter()
            .map(|&id| self.vocab.id_to_token(id).unwrap_or_else(|| UNK_TOKEN.to_string()))
            .collect();

        Ok(CaptionResult { image: image.to_path_buf(), words, attention: decoded.attention })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::CaptionModelConfig;
    use burn::{backend::NdArray, module::Param};
    use rand::{rngs::StdRng, SeedableRng};

    type TestBackend = NdArray;

    const VOCAB: usize = 10;
    const UNITS: usize = 8;

    /// A model whose output layer ignores its input and always favours `id`.
    fn model_always_predicting(id: u32) -> CaptionModel<TestBackend> {
        let device = Default::default();
        let mut model: CaptionModel<TestBackend> = CaptionModelConfig::new(6, VOCAB)
            .with_embedding_dim(4)
            .with_units(UNITS)
            .init(&device);

        let mut bias = vec![0.0f32; VOCAB];
        bias[id as usize] = 50.0;
        model.decoder.fc2.weight = Param::from_tensor(Tensor::zeros([UNITS, VOCAB], &device));
        model.decoder.fc2.bias   = Some(Param::from_tensor(Tensor::from_data(
            TensorData::new(bias, [VOCAB]),
            &device,
        )));
        model
    }

    fn run(model: &CaptionModel<TestBackend>, strategy: DecodeStrategy, max_length: usize) -> Decoded {
        let features = Tensor::<TestBackend, 3>::ones([1, 4, 6], &Default::default());
        let mut rng  = StdRng::seed_from_u64(11);
        decode(model, features, 2, 3, max_length, strategy, &mut rng).unwrap()
    }

    #[test]
    fn test_end_token_stops_at_first_step() {
        let model = model_always_predicting(3);
        for strategy in [DecodeStrategy::Greedy, DecodeStrategy::Sample] {
            let out = run(&model, strategy, 6);
            assert!(out.ids.is_empty());
            assert!(out.attention.is_empty());
        }
    }

    #[test]
    fn test_padding_id_stops_at_first_step() {
        let model = model_always_predicting(PAD_ID);
        let out   = run(&model, DecodeStrategy::Greedy, 6);
        assert!(out.ids.is_empty());
        assert!(out.attention.is_empty());
    }

    #[test]
    fn test_ordinary_word_runs_to_max_length() {
        let model = model_always_predicting(5);
        let out   = run(&model, DecodeStrategy::Greedy, 6);
        assert_eq!(out.ids, vec![5; 6]);
        assert_eq!(out.attention.len(), 6);
        assert!(out.attention.iter().all(|a| a.len() == 4));
    }

    #[test]
    fn test_greedy_picks_argmax() {
        let mut rng = StdRng::seed_from_u64(0);
        let id = choose(&[0.1, 0.6, 0.3], DecodeStrategy::Greedy, &mut rng).unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_sampling_never_picks_zero_probability() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let id = choose(&[0.0, 0.5, 0.0, 0.5], DecodeStrategy::Sample, &mut rng).unwrap();
            assert!(id == 1 || id == 3);
        }
    }

    #[test]
    fn test_empty_distribution_is_an_error() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(choose(&[], DecodeStrategy::Greedy, &mut rng).is_err());
    }

    #[test]
    fn test_decode_respects_max_length_and_never_emits_end() {
        let device = Default::default();
        let model: CaptionModel<TestBackend> = CaptionModelConfig::new(6, 10)
            .with_embedding_dim(4)
            .with_units(8)
            .init(&device);
        let features = Tensor::<TestBackend, 3>::ones([1, 4, 6], &device);
        let mut rng  = StdRng::seed_from_u64(3);

        for strategy in [DecodeStrategy::Greedy, DecodeStrategy::Sample] {
            let out = decode(&model, features.clone(), 2, 3, 5, strategy, &mut rng).unwrap();
            assert!(out.ids.len() <= 5);
            assert!(!out.ids.contains(&3));
            assert!(!out.ids.contains(&PAD_ID));
            // One attention map per emitted word, each over the 4 locations
            assert_eq!(out.attention.len(), out.ids.len());
            assert!(out.attention.iter().all(|a| a.len() == 4));
        }
    }
}
