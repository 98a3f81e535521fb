use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub type DocId = u32;
pub type BucketNumber = u32;

/// Where a document's text comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Inline content.
    Text(String),
    /// Local file, decoded lossily.
    Path(PathBuf),
    /// http(s) location.
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub name: String,
    pub source: Source,
}

impl Document {
    pub fn new(id: DocId, name: impl Into<String>, source: Source) -> Self {
        Self { id, name: name.into(), source }
    }

    pub fn text(id: DocId, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, name, Source::Text(text.into()))
    }
}

/// A document as submitted by a caller, before the driver assigns its id.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentInput {
    pub name: String,
    #[serde(flatten)]
    pub source: Source,
}

/// Assign ids `1..=N` in input order.
pub fn assign_ids(inputs: Vec<DocumentInput>) -> Vec<Document> {
    inputs
        .into_iter()
        .zip(1..)
        .map(|(input, id)| Document::new(id, input.name, input.source))
        .collect()
}

/// One fixed-capacity chunk of a document's term stream with local counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub document_id: DocId,
    pub document_name: String,
    pub bucket_number: BucketNumber,
    pub frequencies: BTreeMap<String, u32>,
}

impl Bucket {
    /// Number of counted terms, stop words excluded.
    pub fn term_total(&self) -> u64 {
        self.frequencies.values().map(|&c| c as u64).sum()
    }

    pub fn distinct_terms(&self) -> usize {
        self.frequencies.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub document_id: DocId,
    pub document_name: String,
    pub bucket_number: BucketNumber,
    pub term_frequency: u32,
}

// Highest frequency first, then document name, then bucket number. The id only
// separates documents that share a name.
impl Ord for Occurrence {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .term_frequency
            .cmp(&self.term_frequency)
            .then_with(|| self.document_name.cmp(&other.document_name))
            .then_with(|| self.bucket_number.cmp(&other.bucket_number))
            .then_with(|| self.document_id.cmp(&other.document_id))
    }
}

impl PartialOrd for Occurrence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lower-cased term → occurrences, terms kept in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvertedIndex {
    entries: BTreeMap<String, Vec<Occurrence>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_entries(entries: BTreeMap<String, Vec<Occurrence>>) -> Self {
        Self { entries }
    }

    /// Case-insensitive lookup.
    pub fn get(&self, term: &str) -> Option<&[Occurrence]> {
        self.entries.get(&term.to_lowercase()).map(Vec::as_slice)
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Occurrence])> {
        self.entries.iter().map(|(t, occ)| (t.as_str(), occ.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> IndexSummary {
        IndexSummary {
            term_count: self.entries.len() as u64,
            total_occurrence_count: self.entries.values().map(|o| o.len() as u64).sum(),
        }
    }

    /// Compact JSON; identical bucket sets give identical bytes.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub term_count: u64,
    pub total_occurrence_count: u64,
}
