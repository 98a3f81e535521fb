//! Bucketed inverted index built with a map-reduce pass over documents.
//!
//! Each document is tokenized and counted into fixed-size buckets by a
//! [`Mapper`]; [`reduce`] merges every bucket into one [`InvertedIndex`] whose
//! per-term occurrences are ordered by frequency. [`Pipeline`] runs the mappers
//! concurrently and joins them before reducing.

pub mod config;
pub mod error;
pub mod index;
pub mod mapper;
pub mod persist;
pub mod pipeline;
pub mod reducer;
pub mod source;
pub mod tokenizer;

pub use config::{IndexConfig, StopWords};
pub use error::{ConfigError, FetchError, PipelineError, SinkError};
pub use index::{assign_ids, Bucket, DocId, Document, DocumentInput, IndexSummary, InvertedIndex, Occurrence, Source};
pub use mapper::{MapOutcome, MapWarning, Mapper, WarningKind};
pub use persist::{FileSink, IndexSink};
pub use pipeline::{validate_documents, BatchResult, PersistedBatch, Pipeline};
pub use reducer::{reduce, IndexBuilder};
pub use source::{DefaultSource, DocumentSource};
pub use tokenizer::{Terms, Tokenizer};
