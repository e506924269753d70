// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Builds, saves and loads the caption vocabulary.
//
// The vocabulary is a plain word-level mapping:
//   0        → [PAD]   (padding, masked out of the loss)
//   1        → [UNK]   (any word outside the vocabulary)
//   2..size  → corpus words, most frequent first
//
// Captions are already cleaned by the Preprocessor, so no
// normaliser is configured and words are split on whitespace
// only ("[start]" must survive as a single token).
//
// The tokenizer JSON is written by hand in HuggingFace format
// and loaded back through tokenizers::Tokenizer::from_file, the
// same file is then reused at inference time.

use anyhow::{Context, Result};
use std::{collections::HashMap, path::PathBuf};
use tokenizers::Tokenizer;

use crate::data::preprocessor::{END_TOKEN, START_TOKEN};

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const PAD_ID:    u32  = 0;
pub const UNK_ID:    u32  = 1;

const TOKENIZER_FILE: &str = "tokenizer.json";

// ─── Vocabulary ───────────────────────────────────────────────────────────────
/// A loaded tokenizer plus the fixed output length captions are
/// padded or truncated to.
pub struct Vocabulary {
    tokenizer:  Tokenizer,
    max_length: usize,
}

impl Vocabulary {
    pub fn new(tokenizer: Tokenizer, max_length: usize) -> Self {
        Self { tokenizer, max_length }
    }

    /// Vectorise a cleaned caption into exactly `max_length` ids.
    pub fn encode(&self, caption: &str) -> Result<Vec<u32>> {
        let enc = self
            .tokenizer
            .encode(caption, false)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;

        let mut ids = enc.get_ids().to_vec();
        ids.truncate(self.max_length);
        ids.resize(self.max_length, PAD_ID);
        Ok(ids)
    }

    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.tokenizer.token_to_id(token)
    }

    pub fn id_to_token(&self, id: u32) -> Option<String> {
        self.tokenizer.id_to_token(id)
    }

    /// Number of ids the model's output layer must cover.
    /// [PAD] and [UNK] live in the word-level vocab itself.
    pub fn size(&self) -> usize {
        self.tokenizer.get_vocab_size(false)
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn start_id(&self) -> Result<u32> {
        self.token_to_id(START_TOKEN)
            .ok_or_else(|| anyhow::anyhow!("Vocabulary has no '{START_TOKEN}' token"))
    }

    pub fn end_id(&self) -> Result<u32> {
        self.token_to_id(END_TOKEN)
            .ok_or_else(|| anyhow::anyhow!("Vocabulary has no '{END_TOKEN}' token"))
    }
}

// ─── TokenizerStore ───────────────────────────────────────────────────────────
pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load existing tokenizer or build a new one from captions
    pub fn load_or_build(
        &self,
        captions:   &[String],
        vocab_size: usize,
        max_length: usize,
    ) -> Result<Vocabulary> {
        let tok_path = self.dir.join(TOKENIZER_FILE);
        if tok_path.exists() {
            tracing::info!("Loading existing tokenizer from disk");
            self.load(max_length)
        } else {
            tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
            self.build_and_save(captions, vocab_size, max_length)
        }
    }

    /// Load a previously saved tokenizer from JSON file
    pub fn load(&self, max_length: usize) -> Result<Vocabulary> {
        let path = self.dir.join(TOKENIZER_FILE);
        let tokenizer = Tokenizer::from_file(&path).map_err(|e| {
            anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e)
        })?;
        Ok(Vocabulary::new(tokenizer, max_length))
    }

    fn build_and_save(
        &self,
        captions:   &[String],
        vocab_size: usize,
        max_length: usize,
    ) -> Result<Vocabulary> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;

        let words = rank_words(captions, vocab_size);

        // ── Vocab JSON: special tokens first, then words by rank ─────────────
        let mut vocab = serde_json::Map::new();
        vocab.insert(PAD_TOKEN.into(), serde_json::json!(PAD_ID));
        vocab.insert(UNK_TOKEN.into(), serde_json::json!(UNK_ID));
        for (i, word) in words.iter().enumerate() {
            vocab.insert(word.clone(), serde_json::json!(i + 2));
        }

        // ── Tokenizer JSON in HuggingFace format ──────────────────────────────
        let tokenizer_json = serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                {"id": PAD_ID, "content": PAD_TOKEN, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": UNK_ID, "content": UNK_TOKEN, "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
            ],
            "normalizer": null,
            "pre_tokenizer": {
                "type": "WhitespaceSplit"
            },
            "post_processor": null,
            "decoder": null,
            "model": {
                "type": "WordLevel",
                "vocab": vocab,
                "unk_token": UNK_TOKEN
            }
        });

        let tok_path = self.dir.join(TOKENIZER_FILE);
        std::fs::write(&tok_path, serde_json::to_string_pretty(&tokenizer_json)?)
            .with_context(|| "Cannot write tokenizer JSON")?;

        tracing::info!(
            "Tokenizer built with {} entries, saved to '{}'",
            words.len() + 2,
            tok_path.display()
        );

        self.load(max_length)
    }
}

/// Corpus words ordered by descending frequency (ties alphabetical),
/// capped so that words + the two special tokens fit in `vocab_size`.
fn rank_words(captions: &[String], vocab_size: usize) -> Vec<String> {
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for caption in captions {
        for word in caption.split_whitespace() {
            if word != PAD_TOKEN && word != UNK_TOKEN {
                *freq.entry(word).or_insert(0) += 1;
            }
        }
    }

    let mut words: Vec<(&str, usize)> = freq.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    words.truncate(vocab_size.saturating_sub(2));
    words.into_iter().map(|(w, _)| w.to_string()).collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "[start] a dog runs [end]".to_string(),
            "[start] a dog sits [end]".to_string(),
            "[start] a cat [end]".to_string(),
        ]
    }

    #[test]
    fn test_rank_words_by_frequency() {
        let words = rank_words(&corpus(), 100);
        // [end], [start] and "a" appear 3 times; ties sort alphabetically
        assert_eq!(&words[..4], &["[end]", "[start]", "a", "dog"]);
    }

    #[test]
    fn test_rank_words_respects_vocab_size() {
        let words = rank_words(&corpus(), 4);
        assert_eq!(words.len(), 2);
    }

    #[test]
    fn test_build_encode_and_reload() {
        let tmp   = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(tmp.path());
        let vocab = store.load_or_build(&corpus(), 100, 8).unwrap();

        assert_eq!(vocab.token_to_id(PAD_TOKEN), Some(PAD_ID));
        assert_eq!(vocab.token_to_id(UNK_TOKEN), Some(UNK_ID));
        assert_eq!(vocab.size(), 2 + 7);

        let ids = vocab.encode("[start] a dog flies [end]").unwrap();
        assert_eq!(ids.len(), 8);
        assert_eq!(ids[0], vocab.start_id().unwrap());
        // "flies" is out of vocabulary
        assert_eq!(ids[3], UNK_ID);
        assert_eq!(ids[4], vocab.end_id().unwrap());
        assert!(ids[5..].iter().all(|&id| id == PAD_ID));

        // Second call loads the saved file instead of rebuilding
        let again = store.load_or_build(&[], 100, 8).unwrap();
        assert_eq!(again.size(), vocab.size());
        assert_eq!(again.id_to_token(ids[2]).as_deref(), Some("dog"));
    }

    #[test]
    fn test_encode_truncates_long_captions() {
        let tmp   = tempfile::tempdir().unwrap();
        let vocab = TokenizerStore::new(tmp.path())
            .load_or_build(&corpus(), 100, 3)
            .unwrap();
        let ids = vocab.encode("[start] a dog runs [end]").unwrap();
        assert_eq!(ids.len(), 3);
    }
}
