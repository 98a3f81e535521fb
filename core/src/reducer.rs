//! Reduce phase: merge every bucket into one sorted inverted index.

use crate::index::{Bucket, IndexSummary, InvertedIndex, Occurrence};
use std::collections::BTreeMap;

/// Accumulates occurrences bucket by bucket; [`IndexBuilder::finish`] sorts.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    entries: BTreeMap<String, Vec<Occurrence>>,
    occurrences: u64,
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// One occurrence per distinct term in the bucket. Keys that only differ
    /// by case are folded before counting.
    pub fn add_bucket(&mut self, bucket: Bucket) {
        let mut folded: BTreeMap<String, u32> = BTreeMap::new();
        for (term, count) in bucket.frequencies {
            if count == 0 {
                continue;
            }
            *folded.entry(term.to_lowercase()).or_insert(0) += count;
        }
        for (term, term_frequency) in folded {
            self.entries.entry(term).or_default().push(Occurrence {
                document_id: bucket.document_id,
                document_name: bucket.document_name.clone(),
                bucket_number: bucket.bucket_number,
                term_frequency,
            });
            self.occurrences += 1;
        }
    }

    pub fn finish(mut self) -> (InvertedIndex, IndexSummary) {
        for occurrences in self.entries.values_mut() {
            occurrences.sort_unstable();
        }
        let summary = IndexSummary {
            term_count: self.entries.len() as u64,
            total_occurrence_count: self.occurrences,
        };
        (InvertedIndex::from_entries(self.entries), summary)
    }
}

/// Build the global index. The order of `buckets` does not affect the result.
#[tracing::instrument(name = "reduce", skip_all)]
pub fn reduce<I>(buckets: I) -> (InvertedIndex, IndexSummary)
where
    I: IntoIterator<Item = Bucket>,
{
    let mut builder = IndexBuilder::new();
    let mut bucket_count = 0usize;
    for bucket in buckets {
        builder.add_bucket(bucket);
        bucket_count += 1;
    }
    let (index, summary) = builder.finish();
    tracing::debug!(
        buckets = bucket_count,
        terms = summary.term_count,
        occurrences = summary.total_occurrence_count,
        "reduced buckets"
    );
    (index, summary)
}
