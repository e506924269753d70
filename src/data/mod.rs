// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between files on disk and tensor batches.
//
//   captions.txt                 Images/*.jpg
//       │                            │
//       ▼                            ▼
//   CsvCaptionLoader             load_image      (prepare step only;
//       │                            │            features are cached
//       ▼                            ▼            by infra::feature_cache)
//   Preprocessor                 backbone CNN
//       │
//       ▼
//   split_grouped     → train / validation by image
//       │
//       ▼
//   CaptionDataset    → reads cached features lazily
//       │
//       ▼
//   CaptionBatcher    → stacks samples into tensor batches
//       │
//       ▼
//   DataLoader        → shuffles, prefetches on worker threads
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads the captions CSV
pub mod loader;

/// Cleans caption text and adds [start]/[end]
pub mod preprocessor;

/// Decodes, resizes and normalises images
pub mod image_loader;

/// Implements Burn's Dataset trait over cached features
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Leakage-free train/validation split
pub mod splitter;
