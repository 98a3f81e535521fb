//! Map phase: one document in, fixed-capacity term-count buckets out.

use crate::config::{IndexConfig, DEFAULT_BUCKET_CAPACITY};
use crate::error::FetchError;
use crate::index::{Bucket, BucketNumber, Document};
use crate::source::DocumentSource;
use crate::tokenizer::Tokenizer;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WarningKind {
    FetchFailed,
    FetchTimeout,
    MapperFailed,
}

/// A document that contributed nothing because its map task failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapWarning {
    pub document_id: u32,
    pub document_name: String,
    pub kind: WarningKind,
    pub reason: String,
}

impl MapWarning {
    pub fn new(document: &Document, kind: WarningKind, reason: impl Into<String>) -> Self {
        Self { document_id: document.id, document_name: document.name.clone(), kind, reason: reason.into() }
    }

    fn from_fetch(document: &Document, err: &FetchError) -> Self {
        let kind = match err {
            FetchError::Timeout(_) => WarningKind::FetchTimeout,
            _ => WarningKind::FetchFailed,
        };
        Self::new(document, kind, err.to_string())
    }
}

#[derive(Debug, Default)]
pub struct MapOutcome {
    pub buckets: Vec<Bucket>,
    pub warning: Option<MapWarning>,
}

#[derive(Debug, Clone)]
pub struct Mapper {
    tokenizer: Tokenizer,
    bucket_capacity: usize,
}

impl Mapper {
    /// A capacity of zero is treated as one.
    pub fn new(tokenizer: Tokenizer, bucket_capacity: usize) -> Self {
        Self { tokenizer, bucket_capacity: bucket_capacity.max(1) }
    }

    pub fn from_config(config: &IndexConfig) -> Self {
        Self::new(Tokenizer::new(config.stop_words.clone()), config.bucket_capacity)
    }

    pub fn bucket_capacity(&self) -> usize {
        self.bucket_capacity
    }

    /// Split already fetched text into buckets. Stop words never advance the
    /// bucket counter and an empty trailing bucket is dropped.
    pub fn map_text(&self, document: &Document, text: &str) -> Vec<Bucket> {
        let mut buckets = Vec::new();
        let mut current = BucketBuilder::new(1);
        for term in self.tokenizer.tokenize(text) {
            current.add(term);
            if current.counted == self.bucket_capacity {
                let next = BucketBuilder::new(current.number + 1);
                buckets.push(std::mem::replace(&mut current, next).finish(document));
            }
        }
        if current.counted > 0 {
            buckets.push(current.finish(document));
        }
        buckets
    }

    /// Fetch then map. A fetch failure or expired timeout yields no buckets
    /// and a warning instead of an error.
    #[tracing::instrument(name = "map", skip_all, fields(doc_id = document.id, doc = %document.name))]
    pub async fn map<S: DocumentSource>(
        &self,
        source: &S,
        document: &Document,
        fetch_timeout: Duration,
    ) -> MapOutcome {
        let fetched = match tokio::time::timeout(fetch_timeout, source.fetch(document)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(fetch_timeout)),
        };
        match fetched {
            Ok(text) => {
                let buckets = self.map_text(document, &text);
                tracing::debug!(buckets = buckets.len(), "mapped document");
                MapOutcome { buckets, warning: None }
            }
            Err(err) => {
                tracing::warn!(error = %err, "document skipped");
                MapOutcome { buckets: Vec::new(), warning: Some(MapWarning::from_fetch(document, &err)) }
            }
        }
    }
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new(Tokenizer::default(), DEFAULT_BUCKET_CAPACITY)
    }
}

struct BucketBuilder {
    number: BucketNumber,
    counted: usize,
    frequencies: BTreeMap<String, u32>,
}

impl BucketBuilder {
    fn new(number: BucketNumber) -> Self {
        Self { number, counted: 0, frequencies: BTreeMap::new() }
    }

    fn add(&mut self, term: String) {
        *self.frequencies.entry(term).or_insert(0) += 1;
        self.counted += 1;
    }

    fn finish(self, document: &Document) -> Bucket {
        Bucket {
            document_id: document.id,
            document_name: document.name.clone(),
            bucket_number: self.number,
            frequencies: self.frequencies,
        }
    }
}
