// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence used by several use cases:
//
//   checkpoint.rs      — model / backbone weights (CompactRecorder)
//                        plus the JSON configs needed to rebuild them
//
//   tokenizer_store.rs — the caption vocabulary, built once from the
//                        training captions and reused for inference
//
//   feature_cache.rs   — one .npy feature grid per image, written by
//                        `prepare` and read by the training dataset
//
//   metrics.rs         — per-epoch loss curve as CSV
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)

/// Model and backbone checkpoint saving and loading
pub mod checkpoint;

/// Vocabulary building, saving, and loading
pub mod tokenizer_store;

/// Cached backbone features on disk
pub mod feature_cache;

/// Training metrics CSV logger
pub mod metrics;
