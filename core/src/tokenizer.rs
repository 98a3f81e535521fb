use crate::config::StopWords;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\p{L}\p{M}\p{N}_\s]").expect("valid regex");
}

/// Normalizes text into lower-cased terms and drops stop words.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stop_words: Arc<StopWords>,
}

impl Tokenizer {
    pub fn new(stop_words: StopWords) -> Self {
        Self { stop_words: Arc::new(stop_words) }
    }

    pub fn stop_words(&self) -> &StopWords {
        &self.stop_words
    }

    /// Punctuation becomes a word boundary, then the text is split on whitespace,
    /// lower-cased and filtered. The normalized copy of `text` is built up front;
    /// terms are split off it one at a time as the iterator advances.
    pub fn tokenize(&self, text: &str) -> Terms<'_> {
        Terms { text: normalize(text), pos: 0, stop_words: &self.stop_words }
    }

    /// Undecodable bytes are replaced and so read as word boundaries.
    pub fn tokenize_bytes(&self, bytes: &[u8]) -> Terms<'_> {
        self.tokenize(&String::from_utf8_lossy(bytes))
    }
}

/// Strip non-word characters and lower-case. Shared with stop-word loading so
/// configured entries compare equal to emitted terms.
pub(crate) fn normalize(text: &str) -> String {
    NON_WORD.replace_all(text, " ").to_lowercase()
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(StopWords::default())
    }
}

/// Single-pass term stream returned by [`Tokenizer::tokenize`]; owns the
/// normalized text.
pub struct Terms<'a> {
    text: String,
    pos: usize,
    stop_words: &'a StopWords,
}

impl Iterator for Terms<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let rest = &self.text[self.pos..];
            let start = match rest.find(|c: char| !c.is_whitespace()) {
                Some(i) => i,
                None => {
                    self.pos = self.text.len();
                    return None;
                }
            };
            let word = &rest[start..];
            let len = word.find(char::is_whitespace).unwrap_or(word.len());
            let token = &word[..len];
            self.pos += start + len;
            if !self.stop_words.contains(token) {
                return Some(token.to_owned());
            }
        }
    }
}
