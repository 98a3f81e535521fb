//! Fan-out/fan-in driver: one map task per document under a concurrency cap,
//! a wait-for-all join, then a single reduce.

use crate::config::IndexConfig;
use crate::error::PipelineError;
use crate::index::{Bucket, Document, IndexSummary, InvertedIndex};
use crate::mapper::{MapWarning, Mapper, WarningKind};
use crate::persist::IndexSink;
use crate::reducer::reduce;
use crate::source::DocumentSource;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug)]
pub struct BatchResult {
    pub index: InvertedIndex,
    pub summary: IndexSummary,
    pub warnings: Vec<MapWarning>,
    pub documents: usize,
}

/// What a caller sees once the index has been handed to a sink.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedBatch {
    pub location: String,
    pub summary: IndexSummary,
    pub warnings: Vec<MapWarning>,
    pub documents: usize,
}

/// Reject a batch before any mapper is started.
pub fn validate_documents(documents: &[Document]) -> Result<(), PipelineError> {
    if documents.is_empty() {
        return Err(PipelineError::InvalidInput("document list is empty".into()));
    }
    let mut seen = HashSet::with_capacity(documents.len());
    for doc in documents {
        if doc.id == 0 {
            return Err(PipelineError::InvalidInput(format!("document {:?} has id 0", doc.name)));
        }
        if doc.name.trim().is_empty() {
            return Err(PipelineError::InvalidInput(format!("document {} has an empty name", doc.id)));
        }
        if !seen.insert(doc.id) {
            return Err(PipelineError::InvalidInput(format!("duplicate document id {}", doc.id)));
        }
    }
    Ok(())
}

pub struct Pipeline<S> {
    config: IndexConfig,
    mapper: Mapper,
    source: Arc<S>,
}

impl<S: DocumentSource> Pipeline<S> {
    pub fn new(config: IndexConfig, source: S) -> Self {
        let mapper = Mapper::from_config(&config);
        Self { config, mapper, source: Arc::new(source) }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    #[tracing::instrument(name = "batch", skip_all, fields(documents = documents.len()))]
    pub async fn run(&self, documents: Vec<Document>) -> Result<BatchResult, PipelineError> {
        validate_documents(&documents)?;
        let total = documents.len();
        let (buckets, warnings) = self.map_all(documents).await;
        let (index, summary) = reduce(buckets);
        tracing::info!(
            documents = total,
            failed = warnings.len(),
            terms = summary.term_count,
            occurrences = summary.total_occurrence_count,
            "batch reduced"
        );
        Ok(BatchResult { index, summary, warnings, documents: total })
    }

    /// Run the batch and persist it. A sink failure discards the index.
    ///
    /// `sink.persist` runs inline on the calling task. Callers on a shared
    /// runtime with a slow sink should run [`Pipeline::run`] and hand the
    /// result to the sink from `spawn_blocking` instead.
    pub async fn run_and_persist<K: IndexSink + ?Sized>(
        &self,
        documents: Vec<Document>,
        sink: &K,
    ) -> Result<PersistedBatch, PipelineError> {
        let result = self.run(documents).await?;
        let location = sink.persist(&result.index, &result.summary)?;
        Ok(PersistedBatch {
            location,
            summary: result.summary,
            warnings: result.warnings,
            documents: result.documents,
        })
    }

    async fn map_all(&self, documents: Vec<Document>) -> (Vec<Bucket>, Vec<MapWarning>) {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_mappers.max(1)));
        let timeout = self.config.fetch_timeout();
        let mut tasks = Vec::with_capacity(documents.len());
        for document in documents {
            let permits = Arc::clone(&permits);
            let source = Arc::clone(&self.source);
            let mapper = self.mapper.clone();
            let key = document.clone();
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                mapper.map(&*source, &document, timeout).await
            });
            tasks.push((key, handle));
        }

        // Every task is awaited; a panicked mapper only loses its own document.
        let mut buckets = Vec::new();
        let mut warnings = Vec::new();
        for (document, handle) in tasks {
            match handle.await {
                Ok(outcome) => {
                    buckets.extend(outcome.buckets);
                    warnings.extend(outcome.warning);
                }
                Err(err) => {
                    tracing::warn!(doc_id = document.id, error = %err, "map task failed");
                    warnings.push(MapWarning::new(&document, WarningKind::MapperFailed, err.to_string()));
                }
            }
        }
        warnings.sort_by_key(|w| w.document_id);
        (buckets, warnings)
    }
}
