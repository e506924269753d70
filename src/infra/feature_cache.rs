// ============================================================
// Layer 6 — Feature Vector Cache
// ============================================================
// Running the backbone CNN inside the training loop would redo
// the same convolutions every epoch. Instead `prepare` runs it
// once per image and stores the result here; training only ever
// reads these files.
//
// File naming convention:
//   feature_vectors/
//     1000268201_693b08cb0e.jpg.npy   ← [locations, feature_dim] float32
//     1001773457_577c3a7d70.jpg.npy
//     ...
//
// The .npy format keeps the cache readable from NumPy as well.
//
// Reference: ndarray-npy crate documentation

use anyhow::{bail, Context, Result};
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Shape of one cached feature grid: [locations, dim]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureShape {
    /// Number of spatial locations (grid * grid)
    pub locations: usize,
    /// Channels per location
    pub dim: usize,
}

impl FeatureShape {
    pub fn new(locations: usize, dim: usize) -> Self {
        Self { locations, dim }
    }

    pub fn len(&self) -> usize {
        self.locations * self.dim
    }
}

/// Reads and writes per-image feature files in one directory.
#[derive(Debug, Clone)]
pub struct FeatureCache {
    dir: PathBuf,
}

impl FeatureCache {
    /// Create a cache rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create feature directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the features of `image` live: <dir>/<image file name>.npy
    pub fn path_for(&self, image: &Path) -> PathBuf {
        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| image.to_string_lossy().replace('/', "_"));
        self.dir.join(format!("{name}.npy"))
    }

    pub fn contains(&self, image: &Path) -> bool {
        self.path_for(image).is_file()
    }

    /// Write one feature grid for `image`.
    pub fn save(&self, image: &Path, features: &[f32], shape: FeatureShape) -> Result<PathBuf> {
        let path = self.path_for(image);
        let array = Array2::from_shape_vec((shape.locations, shape.dim), features.to_vec())
            .with_context(|| {
                format!(
                    "Feature buffer of length {} does not fit shape {:?}",
                    features.len(),
                    shape
                )
            })?;

        write_npy(&path, &array)
            .with_context(|| format!("Cannot write features to '{}'", path.display()))?;

        tracing::debug!("Cached features: {}", path.display());
        Ok(path)
    }

    /// Read a feature file and check it has the expected shape.
    pub fn load(path: &Path, shape: FeatureShape) -> Result<Vec<f32>> {
        let array: Array2<f32> = read_npy(path)
            .with_context(|| format!("Cannot read features from '{}'", path.display()))?;

        let (locations, dim) = array.dim();
        if locations != shape.locations || dim != shape.dim {
            bail!(
                "Feature file '{}' has shape [{}, {}], expected [{}, {}]",
                path.display(),
                locations,
                dim,
                shape.locations,
                shape.dim
            );
        }

        // iter() walks in logical (row-major) order regardless of memory layout
        Ok(array.iter().copied().collect())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_uses_image_file_name() {
        let tmp   = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(tmp.path()).unwrap();
        let path  = cache.path_for(Path::new("data/Images/abc.jpg"));
        assert_eq!(path, tmp.path().join("abc.jpg.npy"));
    }

    #[test]
    fn test_save_then_load() {
        let tmp   = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(tmp.path()).unwrap();
        let shape = FeatureShape::new(2, 3);
        let image = Path::new("imgs/x.jpg");

        assert!(!cache.contains(image));
        let path = cache.save(image, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0], shape).unwrap();
        assert!(cache.contains(image));

        let loaded = FeatureCache::load(&path, shape).unwrap();
        assert_eq!(loaded, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_load_rejects_wrong_shape() {
        let tmp   = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(tmp.path()).unwrap();
        let path  = cache
            .save(Path::new("y.jpg"), &[1.0; 6], FeatureShape::new(2, 3))
            .unwrap();

        assert!(FeatureCache::load(&path, FeatureShape::new(3, 2)).is_err());
    }

    #[test]
    fn test_save_rejects_wrong_length() {
        let tmp   = tempfile::tempdir().unwrap();
        let cache = FeatureCache::new(tmp.path()).unwrap();
        assert!(cache
            .save(Path::new("z.jpg"), &[1.0; 5], FeatureShape::new(2, 3))
            .is_err());
    }
}
