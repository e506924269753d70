use burn::data::dataset::Dataset;
use std::path::PathBuf;

use crate::infra::feature_cache::{FeatureCache, FeatureShape};

/// One training pair before its features are read from disk.
#[derive(Debug, Clone)]
pub struct CaptionSample {
    pub feature_path: PathBuf,
    pub token_ids:    Vec<u32>,
}

/// One training pair with its feature grid loaded.
/// `features` is row-major [locations, dim].
#[derive(Debug, Clone)]
pub struct CaptionItem {
    pub features:  Vec<f32>,
    pub token_ids: Vec<u32>,
}

/// Reads feature files lazily so only the batches in flight sit in memory.
pub struct CaptionDataset {
    samples: Vec<CaptionSample>,
    shape:   FeatureShape,
}

impl CaptionDataset {
    pub fn new(samples: Vec<CaptionSample>, shape: FeatureShape) -> Self {
        Self { samples, shape }
    }

    pub fn sample_count(&self) -> usize { self.samples.len() }

    pub fn shape(&self) -> FeatureShape { self.shape }
}

impl Dataset<CaptionItem> for CaptionDataset {
    fn get(&self, index: usize) -> Option<CaptionItem> {
        let sample = self.samples.get(index)?;
        // Unreadable files are dropped before training starts. A failure here
        // ends this worker's stream; the trainer reports the short epoch.
        match FeatureCache::load(&sample.feature_path, self.shape) {
            Ok(features) => Some(CaptionItem {
                features,
                token_ids: sample.token_ids.clone(),
            }),
            Err(e) => {
                tracing::error!("{e:#}");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_get_loads_features() {
        let tmp   = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(tmp.path()).unwrap();
        let shape = FeatureShape::new(2, 2);
        let path  = cache.save(Path::new("a.jpg"), &[1.0, 2.0, 3.0, 4.0], shape).unwrap();

        let dataset = CaptionDataset::new(
            vec![CaptionSample { feature_path: path, token_ids: vec![2, 5, 3, 0] }],
            shape,
        );

        let item = dataset.get(0).unwrap();
        assert_eq!(item.features, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(item.token_ids, vec![2, 5, 3, 0]);
        assert!(dataset.get(1).is_none());
        assert_eq!(dataset.len(), 1);
    }
}
