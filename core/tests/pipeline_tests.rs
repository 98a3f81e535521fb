use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use wordindex::persist::{load_index, load_index_bytes, load_meta};
use wordindex::{
    DefaultSource, Document, DocumentSource, FetchError, FileSink, IndexConfig, IndexSink, IndexSummary,
    InvertedIndex, Pipeline, PipelineError, SinkError, Source, StopWords, WarningKind,
};

fn config() -> IndexConfig {
    IndexConfig {
        stop_words: StopWords::new(["the", "on", "a", "and"]),
        fetch_timeout_secs: 1,
        ..IndexConfig::default()
    }
}

fn source() -> DefaultSource {
    DefaultSource::new(Duration::from_secs(1)).unwrap()
}

/// Serves inline text but refuses the listed ids.
struct FlakySource {
    failing: HashSet<u32>,
}

impl DocumentSource for FlakySource {
    fn fetch(&self, document: &Document) -> impl Future<Output = Result<String, FetchError>> + Send {
        let result = match (&document.source, self.failing.contains(&document.id)) {
            (Source::Text(text), false) => Ok(text.clone()),
            _ => Err(FetchError::Status { url: document.name.clone(), status: 503 }),
        };
        async move { result }
    }
}

/// Sleeps before answering and records the peak number of concurrent fetches.
struct SlowSource {
    delay: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl DocumentSource for SlowSource {
    fn fetch(&self, _document: &Document) -> impl Future<Output = Result<String, FetchError>> + Send {
        async move {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok("slow words".to_string())
        }
    }
}

fn two_cats() -> Vec<Document> {
    vec![
        Document::text(1, "doc1", "the cat sat on the mat"),
        Document::text(2, "doc2", "a cat and a hat"),
    ]
}

#[tokio::test]
async fn two_documents_end_to_end() {
    let pipeline = Pipeline::new(config(), source());
    let result = pipeline.run(two_cats()).await.unwrap();

    assert_eq!(result.summary, IndexSummary { term_count: 4, total_occurrence_count: 5 });
    assert!(result.warnings.is_empty());
    let json = String::from_utf8(result.index.to_json().unwrap()).unwrap();
    assert_eq!(
        json,
        concat!(
            r#"{"cat":[{"documentId":1,"documentName":"doc1","bucketNumber":1,"termFrequency":1},"#,
            r#"{"documentId":2,"documentName":"doc2","bucketNumber":1,"termFrequency":1}],"#,
            r#""hat":[{"documentId":2,"documentName":"doc2","bucketNumber":1,"termFrequency":1}],"#,
            r#""mat":[{"documentId":1,"documentName":"doc1","bucketNumber":1,"termFrequency":1}],"#,
            r#""sat":[{"documentId":1,"documentName":"doc1","bucketNumber":1,"termFrequency":1}]}"#,
        )
    );
}

#[tokio::test]
async fn failed_fetch_degrades_to_a_warning() {
    let docs = vec![
        Document::text(1, "doc1", "the cat sat on the mat"),
        Document::text(2, "doc2", "broken source"),
        Document::text(3, "doc3", "a cat and a hat"),
    ];
    let pipeline = Pipeline::new(config(), FlakySource { failing: HashSet::from([2]) });
    let result = pipeline.run(docs).await.unwrap();

    assert_eq!(result.documents, 3);
    assert_eq!(result.summary, IndexSummary { term_count: 4, total_occurrence_count: 5 });
    assert!(result.index.get("broken").is_none());
    assert_eq!(result.warnings.len(), 1);
    let warning = &result.warnings[0];
    assert_eq!((warning.document_id, warning.document_name.as_str()), (2, "doc2"));
    assert_eq!(warning.kind, WarningKind::FetchFailed);
    assert!(warning.reason.contains("503"));
}

#[tokio::test]
async fn missing_file_is_reported_not_fatal() {
    let docs = vec![
        Document::text(1, "doc1", "the cat sat on the mat"),
        Document::new(2, "ghost", Source::Path("/no/such/file.txt".into())),
    ];
    let result = Pipeline::new(config(), source()).run(docs).await.unwrap();
    assert_eq!(result.summary.term_count, 3);
    assert_eq!(result.warnings[0].kind, WarningKind::FetchFailed);
}

#[tokio::test]
async fn slow_fetch_times_out_into_a_warning() {
    let slow = SlowSource { delay: Duration::from_secs(5), active: AtomicUsize::new(0), peak: AtomicUsize::new(0) };
    let cfg = IndexConfig { fetch_timeout_secs: 1, ..config() };
    assert!(cfg.validate().is_ok());
    let result = Pipeline::new(cfg, slow).run(vec![Document::text(1, "slow", "")]).await.unwrap();
    assert!(result.index.is_empty());
    assert_eq!(result.warnings[0].kind, WarningKind::FetchTimeout);
}

#[tokio::test]
async fn every_document_is_joined_before_reduce() {
    let slow = SlowSource { delay: Duration::from_millis(20), active: AtomicUsize::new(0), peak: AtomicUsize::new(0) };
    let cfg = IndexConfig { max_concurrent_mappers: 2, ..config() };
    let pipeline = Pipeline::new(cfg, slow);
    let docs = (1..=8).map(|id| Document::text(id, format!("doc{id}"), "")).collect();
    let result = pipeline.run(docs).await.unwrap();

    // every document answers "slow words"
    assert_eq!(result.index.get("slow").unwrap().len(), 8);
    assert_eq!(result.summary.total_occurrence_count, 16);
}

#[tokio::test]
async fn peak_concurrency_never_exceeds_limit() {
    let slow = Arc::new(SlowSource {
        delay: Duration::from_millis(20),
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    struct Shared(Arc<SlowSource>);
    impl DocumentSource for Shared {
        fn fetch(&self, document: &Document) -> impl Future<Output = Result<String, FetchError>> + Send {
            self.0.fetch(document)
        }
    }
    let cfg = IndexConfig { max_concurrent_mappers: 3, ..config() };
    let docs = (1..=10).map(|id| Document::text(id, format!("doc{id}"), "")).collect();
    Pipeline::new(cfg, Shared(Arc::clone(&slow))).run(docs).await.unwrap();
    let peak = slow.peak.load(Ordering::SeqCst);
    assert!((1..=3).contains(&peak), "peak concurrency was {peak}");
}

#[tokio::test]
async fn empty_batch_is_rejected() {
    let err = Pipeline::new(config(), source()).run(Vec::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
}

#[tokio::test]
async fn file_sink_writes_the_serialized_index() {
    let dir = tempdir().unwrap();
    let sink = FileSink::new(dir.path().join("out"));
    let pipeline = Pipeline::new(config(), source());

    let persisted = pipeline.run_and_persist(two_cats(), &sink).await.unwrap();
    assert!(persisted.location.ends_with("index.json"));

    let expected = pipeline.run(two_cats()).await.unwrap().index.to_json().unwrap();
    assert_eq!(load_index_bytes(sink.paths()).unwrap(), expected);

    let loaded: InvertedIndex = load_index(sink.paths()).unwrap();
    assert_eq!(loaded.summary(), persisted.summary);
    let meta = load_meta(sink.paths()).unwrap();
    assert_eq!(meta.summary, persisted.summary);
    assert_eq!(meta.version, 1);
}

struct BrokenSink;

impl IndexSink for BrokenSink {
    fn persist(&self, _index: &InvertedIndex, _summary: &IndexSummary) -> Result<String, SinkError> {
        Err(SinkError::Io {
            path: "/readonly/index.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

#[tokio::test]
async fn sink_failure_is_fatal() {
    let err = Pipeline::new(config(), source()).run_and_persist(two_cats(), &BrokenSink).await.unwrap_err();
    assert!(matches!(err, PipelineError::Sink(SinkError::Io { .. })));
}

/// Local HTTP server with one good document; every other path is a 404.
async fn serve_documents() -> String {
    use axum::{routing::get, Router};
    let app = Router::new().route("/cats.txt", get(|| async { "the cat sat on the mat" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn url_documents_are_fetched_and_http_errors_become_warnings() {
    let base = serve_documents().await;
    let docs = vec![
        Document::new(1, "web", Source::Url(format!("{base}/cats.txt"))),
        Document::new(2, "missing", Source::Url(format!("{base}/gone.txt"))),
    ];
    let result = Pipeline::new(config(), source()).run(docs).await.unwrap();

    assert_eq!(result.index.terms().collect::<Vec<_>>(), vec!["cat", "mat", "sat"]);
    assert_eq!(result.index.get("cat").unwrap()[0].document_name, "web");
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].document_id, 2);
    assert_eq!(result.warnings[0].kind, WarningKind::FetchFailed);
    assert!(result.warnings[0].reason.contains("404"), "{}", result.warnings[0].reason);
}
