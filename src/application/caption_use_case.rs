// ============================================================
// Layer 2 — CaptionUseCase
// ============================================================
// Loads a trained checkpoint and captions either:
//   - the image given on the command line, or
//   - a random image from the captions table, printed next to
//     one of its human-written captions for comparison
//
// The words and per-word attention weights can be written to
// a JSON file for plotting.

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    fs,
    path::{Path, PathBuf},
};

use crate::data::{loader::CsvCaptionLoader, preprocessor::Preprocessor};
use crate::domain::{
    caption::{CaptionRecord, CaptionResult, DecodeStrategy},
    traits::{CaptionSource, Captioner},
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::Inferencer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionConfig {
    pub checkpoint_dir: String,
    pub features_dir:   String,
    pub captions_file:  String,
    pub images_dir:     String,
    /// Image to caption; a random table row when absent
    pub image:          Option<String>,
    pub strategy:       DecodeStrategy,
    pub seed:           Option<u64>,
    /// Where to write words + attention weights as JSON
    pub attention_out:  Option<String>,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: "checkpoints".to_string(),
            features_dir:   "feature_vectors".to_string(),
            captions_file:  "data/captions.txt".to_string(),
            images_dir:     "data/Images".to_string(),
            image:          None,
            strategy:       DecodeStrategy::Greedy,
            seed:           None,
            attention_out:  None,
        }
    }
}

/// A prediction, plus the reference caption when the image came
/// from the captions table.
#[derive(Debug, Clone)]
pub struct CaptionOutcome {
    pub result:    CaptionResult,
    pub reference: Option<String>,
}

pub struct CaptionUseCase {
    config:     CaptionConfig,
    inferencer: Inferencer,
    rng:        RefCell<StdRng>,
}

impl CaptionUseCase {
    pub fn new(config: CaptionConfig) -> Result<Self> {
        let ckpt       = CheckpointManager::new(&config.checkpoint_dir)?;
        let inferencer = Inferencer::from_checkpoint(&ckpt, Path::new(&config.features_dir))?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None       => StdRng::from_entropy(),
        };
        Ok(Self { config, inferencer, rng: RefCell::new(rng) })
    }

    pub fn execute(&self) -> Result<CaptionOutcome> {
        let (image, reference) = match &self.config.image {
            Some(path) => (PathBuf::from(path), None),
            None => {
                let row = self.random_row()?;
                let reference = Preprocessor::new();
                let reference = reference.strip_markers(&reference.clean(&row.caption));
                (row.image, Some(reference))
            }
        };

        let result = self.caption(&image)?;

        if let Some(out) = &self.config.attention_out {
            write_attention(&result, Path::new(out))?;
        }

        Ok(CaptionOutcome { result, reference })
    }

    fn random_row(&self) -> Result<CaptionRecord> {
        let records = CsvCaptionLoader::new(&self.config.captions_file, &self.config.images_dir)
            .load_all()?;
        match records.choose(&mut *self.rng.borrow_mut()) {
            Some(row) => Ok(row.clone()),
            None => bail!("Captions table '{}' is empty", self.config.captions_file),
        }
    }
}

impl Captioner for CaptionUseCase {
    fn caption(&self, image: &Path) -> Result<CaptionResult> {
        tracing::info!("Captioning '{}'", image.display());
        self.inferencer
            .predict(image, self.config.strategy, &mut *self.rng.borrow_mut())
    }
}

/// Serialise words and attention weights as pretty JSON.
pub fn write_attention(result: &CaptionResult, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create '{}'", parent.display()))?;
    }
    fs::write(path, serde_json::to_string_pretty(result)?)
        .with_context(|| format!("Cannot write attention map to '{}'", path.display()))?;
    tracing::info!("Attention map written to '{}'", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_attention_json() {
        let tmp  = tempfile::tempdir().unwrap();
        let path = tmp.path().join("out/attention.json");
        let result = CaptionResult {
            image:     PathBuf::from("dog.jpg"),
            words:     vec!["a".into(), "dog".into()],
            attention: vec![vec![0.25; 4], vec![0.5, 0.5, 0.0, 0.0]],
        };

        write_attention(&result, &path).unwrap();

        let back: CaptionResult = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.words, result.words);
        assert_eq!(back.attention.len(), 2);
        assert_eq!(back.attention[1][1], 0.5);
    }

    #[test]
    fn test_missing_checkpoint_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = CaptionConfig {
            checkpoint_dir: tmp.path().join("ckpt").to_string_lossy().into_owned(),
            ..CaptionConfig::default()
        };
        let err = CaptionUseCase::new(cfg).err().unwrap();
        assert!(format!("{err:#}").contains("train"));
    }
}
