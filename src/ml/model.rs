use burn::{
    nn::{
        gru::{Gru, GruConfig},
        loss::CrossEntropyLossConfig,
        Embedding, EmbeddingConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{relu, softmax},
};

use crate::infra::tokenizer_store::PAD_ID;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally; do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct CaptionModelConfig {
    /// Channels per cached feature location
    pub feature_dim: usize,
    pub vocab_size:  usize,
    #[config(default = 256)]
    pub embedding_dim: usize,
    #[config(default = 512)]
    pub units: usize,
}

impl CaptionModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CaptionModel<B> {
        let encoder = CnnEncoder {
            fc: LinearConfig::new(self.feature_dim, self.embedding_dim).init(device),
        };
        let attention = BahdanauAttention {
            w1: LinearConfig::new(self.embedding_dim, self.units).init(device),
            w2: LinearConfig::new(self.units, self.units).init(device),
            v:  LinearConfig::new(self.units, 1).init(device),
        };
        let decoder = RnnDecoder {
            embedding: EmbeddingConfig::new(self.vocab_size, self.embedding_dim).init(device),
            attention,
            // GRU input is [context ; word embedding]
            gru:   GruConfig::new(self.embedding_dim * 2, self.units, true).init(device),
            fc1:   LinearConfig::new(self.units, self.units).init(device),
            fc2:   LinearConfig::new(self.units, self.vocab_size).init(device),
            units: self.units,
        };
        CaptionModel { encoder, decoder }
    }
}

// ─── Encoder ──────────────────────────────────────────────────────────────────
/// The CNN already ran offline; this dense layer is the only part of the
/// encoder that learns.
#[derive(Module, Debug)]
pub struct CnnEncoder<B: Backend> {
    pub fc: Linear<B>,
}

impl<B: Backend> CnnEncoder<B> {
    /// [batch, locations, feature_dim] → [batch, locations, embedding_dim]
    pub fn forward(&self, features: Tensor<B, 3>) -> Tensor<B, 3> {
        relu(self.fc.forward(features))
    }
}

// ─── Attention ────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct BahdanauAttention<B: Backend> {
    pub w1: Linear<B>,
    pub w2: Linear<B>,
    pub v:  Linear<B>,
}

impl<B: Backend> BahdanauAttention<B> {
    /// features: [batch, locations, embedding_dim], hidden: [batch, units]
    /// → (context [batch, embedding_dim], weights [batch, locations])
    pub fn forward(&self, features: Tensor<B, 3>, hidden: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [batch, locations, dim] = features.dims();
        let [_, units]              = hidden.dims();

        let hidden_with_time_axis = hidden
            .unsqueeze_dim::<3>(1)
            .expand([batch, locations, units]);

        // score = V(tanh(W1·f + W2·h)) : [batch, locations, 1]
        let score = self.v.forward(
            (self.w1.forward(features.clone()) + self.w2.forward(hidden_with_time_axis)).tanh(),
        );
        let weights = softmax(score, 1);

        let context = (weights.clone().expand([batch, locations, dim]) * features)
            .sum_dim(1)
            .reshape([batch, dim]);

        (context, weights.reshape([batch, locations]))
    }
}

// ─── Decoder ──────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct RnnDecoder<B: Backend> {
    pub embedding: Embedding<B>,
    pub attention: BahdanauAttention<B>,
    pub gru:       Gru<B>,
    pub fc1:       Linear<B>,
    pub fc2:       Linear<B>,
    pub units:     usize,
}

pub struct DecoderStep<B: Backend> {
    /// [batch, vocab_size]
    pub logits: Tensor<B, 2>,
    /// [batch, units]
    pub hidden: Tensor<B, 2>,
    /// [batch, locations]
    pub attention: Tensor<B, 2>,
}

impl<B: Backend> RnnDecoder<B> {
    /// One decoding step.
    /// tokens: [batch, 1] previous word ids
    pub fn forward(
        &self,
        tokens:   Tensor<B, 2, Int>,
        features: Tensor<B, 3>,
        hidden:   Tensor<B, 2>,
    ) -> DecoderStep<B> {
        let [batch, _] = tokens.dims();

        let (context, attention) = self.attention.forward(features, hidden.clone());

        let embedded = self.embedding.forward(tokens); // [batch, 1, embedding_dim]
        let x = Tensor::cat(vec![context.unsqueeze_dim::<3>(1), embedded], 2);

        let output = self.gru.forward(x, Some(hidden.unsqueeze_dim::<3>(1))); // [batch, 1, units]
        let hidden = output.reshape([batch, self.units]);

        let logits = self.fc2.forward(self.fc1.forward(hidden.clone()));

        DecoderStep { logits, hidden, attention }
    }

    pub fn reset_state(&self, batch_size: usize, device: &B::Device) -> Tensor<B, 2> {
        Tensor::zeros([batch_size, self.units], device)
    }
}

// ─── Full model ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct CaptionModel<B: Backend> {
    pub encoder: CnnEncoder<B>,
    pub decoder: RnnDecoder<B>,
}

impl<B: Backend> CaptionModel<B> {
    /// Teacher-forced pass over whole captions.
    ///
    /// features: [batch, locations, feature_dim], targets: [batch, max_length]
    /// Returns the masked loss summed over the max_length - 1 predicted steps.
    pub fn forward_loss(&self, features: Tensor<B, 3>, targets: Tensor<B, 2, Int>) -> Tensor<B, 1> {
        let [batch, seq_len] = targets.dims();
        let device = features.device();

        let features   = self.encoder.forward(features);
        let mut hidden = self.decoder.reset_state(batch, &device);
        let mut input  = targets.clone().slice([0..batch, 0..1]);
        let mut loss   = Tensor::<B, 1>::zeros([1], &device);

        for i in 1..seq_len {
            let step = self.decoder.forward(input, features.clone(), hidden);
            hidden   = step.hidden;

            let expected = targets.clone().slice([0..batch, i..i + 1]);
            loss = loss + masked_loss(step.logits, expected.clone().reshape([batch]));

            // Teacher forcing: the next input is the ground-truth word
            input = expected;
        }

        loss
    }
}

/// Sparse categorical cross-entropy on logits; positions whose target is
/// the padding id contribute zero but still count in the batch mean.
pub fn masked_loss<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
    CrossEntropyLossConfig::new()
        .with_pad_tokens(Some(vec![PAD_ID as usize]))
        .init(&logits.device())
        .forward(logits, targets)
}
