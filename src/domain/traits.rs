// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer programs against these traits rather
// than concrete loaders or models:
//   - CsvCaptionLoader implements CaptionSource
//   - CaptionUseCase   implements Captioner
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use std::path::Path;

use crate::domain::caption::{CaptionRecord, CaptionResult};

// ─── CaptionSource ────────────────────────────────────────────────────────────
/// Any component that can produce (image, caption) rows.
pub trait CaptionSource {
    /// Load every row available from this source.
    fn load_all(&self) -> Result<Vec<CaptionRecord>>;
}

// ─── Captioner ────────────────────────────────────────────────────────────────
/// Any component that can describe an image in words.
pub trait Captioner {
    fn caption(&self, image: &Path) -> Result<CaptionResult>;
}
