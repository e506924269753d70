// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All network code lives here, generic over burn's Backend so
// the same modules run on Wgpu, Autodiff<Wgpu> and NdArray.
//
//   backbone.rs   — Frozen convolutional feature extractor
//                   image [3, H, W] → grid of feature vectors
//
//   model.rs      — Caption network
//                   • CNN encoder (dense + ReLU)
//                   • Bahdanau additive attention
//                   • GRU decoder with two dense layers
//                   • Masked cross-entropy loss
//
//   trainer.rs    — Teacher-forced training loop with Adam,
//                   validation loss and per-epoch checkpoints
//
//   inferencer.rs — Greedy / sampled decoding of one image
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Bahdanau et al. (2015), Xu et al. (2015)

/// Frozen CNN that turns images into feature grids
pub mod backbone;

/// Encoder, attention and decoder
pub mod model;

/// Training loop with validation and checkpointing
pub mod trainer;

/// Caption decoding from a checkpoint
pub mod inferencer;
