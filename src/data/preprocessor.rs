// ============================================================
// Layer 4 — Caption Preprocessor
// ============================================================
// Normalises raw caption text before it is vectorised.
//
// Flickr8K captions are hand-typed, so they contain:
//   - Mixed case ("A dog", "a Dog")
//   - Punctuation ("A dog , running .")
//   - Irregular spacing around that punctuation
//
// Cleaning steps (applied in order):
//   1. Lowercase everything
//   2. Remove every character that is neither a word character
//      nor whitespace
//   3. Collapse whitespace runs into a single space and trim
//   4. Wrap in the [start] / [end] markers the decoder learns
//      to begin and stop on
//
// Reference: Rust Book §8 (Strings in Rust)
//            regex crate documentation

use regex::Regex;

pub const START_TOKEN: &str = "[start]";
pub const END_TOKEN:   &str = "[end]";

pub struct Preprocessor {
    punctuation: Regex,
    whitespace:  Regex,
}

impl Preprocessor {
    /// Create a new Preprocessor with its patterns compiled once.
    pub fn new() -> Self {
        Self {
            // \w and \s are Unicode-aware in the regex crate
            punctuation: Regex::new(r"[^\w\s]").expect("punctuation pattern is valid"),
            whitespace:  Regex::new(r"\s+").expect("whitespace pattern is valid"),
        }
    }

    /// Clean a raw caption and add the start/end markers.
    pub fn clean(&self, text: &str) -> String {
        let lower     = text.to_lowercase();
        let no_punct  = self.punctuation.replace_all(&lower, "");
        let collapsed = self.whitespace.replace_all(&no_punct, " ");
        let body      = collapsed.trim();

        if body.is_empty() {
            format!("{START_TOKEN} {END_TOKEN}")
        } else {
            format!("{START_TOKEN} {body} {END_TOKEN}")
        }
    }

    /// Remove the markers again, for showing a caption to a person.
    pub fn strip_markers(&self, text: &str) -> String {
        text.split_whitespace()
            .filter(|w| *w != START_TOKEN && *w != END_TOKEN)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Implement Default so Preprocessor can be created with Preprocessor::default()
impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_wraps() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("A Dog Runs"), "[start] a dog runs [end]");
    }

    #[test]
    fn test_removes_punctuation() {
        let p = Preprocessor::new();
        assert_eq!(
            p.clean("A child , in a pink dress ."),
            "[start] a child in a pink dress [end]"
        );
    }

    #[test]
    fn test_collapses_whitespace() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("  two\t dogs \n play  "), "[start] two dogs play [end]");
    }

    #[test]
    fn test_keeps_digits_and_underscores() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("3 men_in hats!"), "[start] 3 men_in hats [end]");
    }

    #[test]
    fn test_empty_caption_still_has_markers() {
        let p = Preprocessor::new();
        assert_eq!(p.clean(" ... "), "[start] [end]");
    }

    #[test]
    fn test_strip_markers() {
        let p = Preprocessor::new();
        assert_eq!(p.strip_markers("[start] a dog runs [end]"), "a dog runs");
    }
}
