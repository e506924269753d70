// ============================================================
// Layer 3 — Caption Domain Types
// ============================================================
// A captions table is a flat list of (image, caption) rows.
// Flickr8K has five captions per image, so the same image
// path appears on several rows.
//
// Example row after preprocessing:
//   image:   data/Images/1000268201_693b08cb0e.jpg
//   caption: "[start] a child in a pink dress is climbing up stairs [end]"

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One row of the captions table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionRecord {
    /// Full path to the image on disk
    pub image: PathBuf,

    /// Caption text (raw when loaded, cleaned after preprocessing)
    pub caption: String,
}

impl CaptionRecord {
    pub fn new(image: impl Into<PathBuf>, caption: impl Into<String>) -> Self {
        Self {
            image:   image.into(),
            caption: caption.into(),
        }
    }

    /// The bare file name of the image, e.g. "1000268201_693b08cb0e.jpg"
    pub fn image_name(&self) -> Option<&str> {
        self.image.file_name().and_then(|n| n.to_str())
    }
}

/// How the decoder picks the next word at inference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeStrategy {
    /// Always take the most probable word
    Greedy,
    /// Draw the next word from the softmax distribution
    Sample,
}

/// A generated caption plus the attention map that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionResult {
    /// The image that was captioned
    pub image: PathBuf,

    /// Predicted words, without the [start]/[end] markers
    pub words: Vec<String>,

    /// One row of attention weights (over feature locations) per word
    pub attention: Vec<Vec<f32>>,
}

impl CaptionResult {
    pub fn text(&self) -> String {
        self.words.join(" ")
    }

    pub fn image(&self) -> &Path {
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_name() {
        let r = CaptionRecord::new("data/Images/abc.jpg", "a dog");
        assert_eq!(r.image_name(), Some("abc.jpg"));
    }

    #[test]
    fn test_caption_text_joins_words() {
        let result = CaptionResult {
            image:     PathBuf::from("x.jpg"),
            words:     vec!["a".into(), "dog".into(), "runs".into()],
            attention: Vec::new(),
        };
        assert_eq!(result.text(), "a dog runs");
    }
}
