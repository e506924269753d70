// ============================================================
// Layer 4 — Captions Table Loader
// ============================================================
// Loads Flickr8K's captions.txt using the csv crate.
//
// The file looks like:
//   image,caption
//   1000268201_693b08cb0e.jpg,A child in a pink dress is climbing up a set of stairs .
//   1000268201_693b08cb0e.jpg,"A girl going into a wooden building , with a dog ."
//
// Captions that contain commas are quoted, which is why this is
// parsed as real CSV rather than split on the first comma.
//
// The image column only holds a file name; the loader joins it
// onto the images directory so later stages get full paths.
//
// Reference: csv crate documentation
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::domain::caption::CaptionRecord;
use crate::domain::traits::CaptionSource;

/// Shape of one CSV row as it sits on disk
#[derive(Debug, Deserialize)]
struct CaptionRow {
    image:   String,
    caption: String,
}

/// Loads (image, caption) rows from a CSV file.
/// Implements the CaptionSource trait from Layer 3.
pub struct CsvCaptionLoader {
    captions_file: PathBuf,
    images_dir:    PathBuf,
}

impl CsvCaptionLoader {
    pub fn new(captions_file: impl Into<PathBuf>, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            captions_file: captions_file.into(),
            images_dir:    images_dir.into(),
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }
}

impl CaptionSource for CsvCaptionLoader {
    fn load_all(&self) -> Result<Vec<CaptionRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_path(&self.captions_file)
            .with_context(|| {
                format!("Cannot open captions file '{}'", self.captions_file.display())
            })?;

        let mut records = Vec::new();
        let mut skipped = 0usize;

        for (line, row) in reader.deserialize::<CaptionRow>().enumerate() {
            match row {
                Ok(row) => {
                    records.push(CaptionRecord::new(
                        self.images_dir.join(row.image.trim()),
                        row.caption,
                    ));
                }
                // One bad row is logged and skipped
                Err(e) => {
                    skipped += 1;
                    // +2: one for the header, one because lines are 1-based
                    tracing::warn!("Skipping captions row {}: {}", line + 2, e);
                }
            }
        }

        tracing::info!(
            "Loaded {} captions from '{}' ({} rows skipped)",
            records.len(),
            self.captions_file.display(),
            skipped
        );
        Ok(records)
    }
}

/// Sorted, de-duplicated image paths of a captions table.
pub fn unique_images(records: &[CaptionRecord]) -> Vec<PathBuf> {
    let mut images: Vec<PathBuf> = records.iter().map(|r| r.image.clone()).collect();
    images.sort();
    images.dedup();
    images
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_captions(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("captions.txt");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_loads_rows_and_joins_image_dir() {
        let tmp  = tempfile::tempdir().unwrap();
        let file = write_captions(
            tmp.path(),
            "image,caption\na.jpg,A dog .\na.jpg,\"A dog , running .\"\nb.jpg,A cat\n",
        );

        let loader  = CsvCaptionLoader::new(&file, "data/Images");
        let records = loader.load_all().unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].image, PathBuf::from("data/Images/a.jpg"));
        assert_eq!(records[1].caption, "A dog , running .");
    }

    #[test]
    fn test_skips_malformed_rows() {
        let tmp  = tempfile::tempdir().unwrap();
        let file = write_captions(tmp.path(), "image,caption\na.jpg,ok\nbroken\nb.jpg,fine\n");

        let records = CsvCaptionLoader::new(&file, "imgs").load_all().unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let loader = CsvCaptionLoader::new("/definitely/not/here.txt", "imgs");
        assert!(loader.load_all().is_err());
    }

    #[test]
    fn test_unique_images_sorted() {
        let records = vec![
            CaptionRecord::new("b.jpg", "x"),
            CaptionRecord::new("a.jpg", "y"),
            CaptionRecord::new("b.jpg", "z"),
        ];
        assert_eq!(
            unique_images(&records),
            vec![PathBuf::from("a.jpg"), PathBuf::from("b.jpg")]
        );
    }
}
