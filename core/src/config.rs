use crate::error::ConfigError;
use crate::tokenizer::normalize;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BUCKET_CAPACITY: usize = 5000;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_CONCURRENT_MAPPERS: usize = 8;

/// Articles, conjunctions and prepositions.
const DEFAULT_STOP_WORDS: &[&str] = &[
    "a","an","the",
    "and","or","but","nor","so","yet","for",
    "about","above","across","after","against","along","among","around","at",
    "before","behind","below","beneath","beside","between","beyond","by",
    "down","during","except","from","in","inside","into","near","of","off","on","onto",
    "out","outside","over","past","since","through","throughout","to","toward","towards",
    "under","underneath","until","up","upon","with","within","without",
];

/// Immutable, case-insensitive stop-word set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct StopWords(HashSet<String>);

impl StopWords {
    pub fn empty() -> Self {
        Self(HashSet::new())
    }

    /// Entries are normalized like document text. An entry that normalizes to
    /// more than one term could never match a single token and is skipped.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = HashSet::new();
        for word in words {
            let normalized = normalize(word.as_ref());
            let mut terms = normalized.split_whitespace();
            match (terms.next(), terms.next()) {
                (Some(term), None) => {
                    set.insert(term.to_owned());
                }
                (None, _) => {}
                (Some(_), Some(_)) => {
                    tracing::warn!(entry = word.as_ref(), "stop word splits into several terms, ignored");
                }
            }
        }
        Self(set)
    }

    /// One word per line; blank lines and `#` comments are skipped.
    pub fn parse_list(text: &str) -> Self {
        Self::new(text.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Ok(Self::parse_list(&text))
    }

    /// Expects an already lower-cased token.
    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for StopWords {
    fn default() -> Self {
        Self::new(DEFAULT_STOP_WORDS)
    }
}

impl From<Vec<String>> for StopWords {
    fn from(words: Vec<String>) -> Self {
        Self::new(words)
    }
}

impl From<StopWords> for Vec<String> {
    fn from(words: StopWords) -> Self {
        let mut list: Vec<String> = words.0.into_iter().collect();
        list.sort();
        list
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexConfig {
    /// Surviving terms per bucket.
    pub bucket_capacity: usize,
    pub stop_words: StopWords,
    pub fetch_timeout_secs: u64,
    pub max_concurrent_mappers: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: DEFAULT_BUCKET_CAPACITY,
            stop_words: StopWords::default(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            max_concurrent_mappers: DEFAULT_MAX_CONCURRENT_MAPPERS,
        }
    }
}

impl IndexConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config: IndexConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_capacity == 0 {
            return Err(ConfigError::Invalid("bucketCapacity must be at least 1".into()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("fetchTimeoutSecs must be at least 1".into()));
        }
        if self.max_concurrent_mappers == 0 {
            return Err(ConfigError::Invalid("maxConcurrentMappers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
