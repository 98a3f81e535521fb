use anyhow::Result;
use axum::{extract::{Path, State}, http::{header, HeaderMap, StatusCode}, response::IntoResponse, routing::{get, post}, Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wordindex::persist::{load_index_bytes, IndexPaths};
use wordindex::{
    assign_ids, validate_documents, BatchResult, DefaultSource, Document, DocumentInput, FileSink, IndexConfig, IndexSink,
    IndexSummary, MapWarning, PersistedBatch, Pipeline, Source,
};

/// Finished batches kept in the registry (and on disk) before the oldest are dropped.
pub const DEFAULT_MAX_RETAINED_BATCHES: usize = 256;

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub documents: Vec<DocumentInput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRecord {
    pub batch_id: u64,
    pub status: BatchStatus,
    pub documents: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<IndexSummary>,
    pub warnings: Vec<MapWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub output_root: PathBuf,
    pub pipeline: Arc<Pipeline<DefaultSource>>,
    pub batches: Arc<RwLock<HashMap<u64, BatchRecord>>>,
    pub next_id: Arc<AtomicU64>,
    pub admin_token: Option<String>,
    /// `url` documents are fetched by the server; off unless enabled.
    pub allow_url_sources: bool,
    pub max_retained_batches: usize,
}

impl AppState {
    pub fn new(output_root: impl Into<PathBuf>, config: IndexConfig, admin_token: Option<String>) -> Result<Self> {
        config.validate()?;
        let source = DefaultSource::new(config.fetch_timeout())?;
        Ok(Self {
            output_root: output_root.into(),
            pipeline: Arc::new(Pipeline::new(config, source)),
            batches: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            admin_token,
            allow_url_sources: false,
            max_retained_batches: DEFAULT_MAX_RETAINED_BATCHES,
        })
    }

    pub fn allow_url_sources(mut self, allow: bool) -> Self {
        self.allow_url_sources = allow;
        self
    }

    /// Zero is treated as one.
    pub fn max_retained_batches(mut self, max: usize) -> Self {
        self.max_retained_batches = max.max(1);
        self
    }

    fn batch_dir(&self, id: u64) -> PathBuf {
        self.output_root.join(format!("batch-{id}"))
    }

    fn update(&self, id: u64, f: impl FnOnce(&mut BatchRecord)) {
        if let Some(record) = self.batches.write().get_mut(&id) {
            f(record);
        }
    }

    /// Drop the oldest finished batches beyond the retention cap, returning their ids.
    fn evict_finished(&self) -> Vec<u64> {
        let mut batches = self.batches.write();
        let mut finished: Vec<u64> = batches
            .values()
            .filter(|r| matches!(r.status, BatchStatus::Completed | BatchStatus::Failed))
            .map(|r| r.batch_id)
            .collect();
        if finished.len() <= self.max_retained_batches {
            return Vec::new();
        }
        finished.sort_unstable();
        let excess = finished.len() - self.max_retained_batches;
        let evicted: Vec<u64> = finished.into_iter().take(excess).collect();
        for id in &evicted {
            batches.remove(id);
        }
        evicted
    }

    async fn prune(&self) {
        for id in self.evict_finished() {
            let dir = self.batch_dir(id);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => tracing::debug!(batch_id = id, "evicted batch"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(batch_id = id, dir = %dir.display(), error = %e, "failed to remove evicted batch"),
            }
        }
    }
}

/// Server-side knobs that are not part of the pipeline config.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub allow_url_sources: bool,
    pub max_retained_batches: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self { allow_url_sources: false, max_retained_batches: DEFAULT_MAX_RETAINED_BATCHES }
    }
}

pub fn build_app(output_dir: String, config: IndexConfig, options: ServerOptions) -> Result<Router> {
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let state = AppState::new(output_dir, config, admin_token)?
        .allow_url_sources(options.allow_url_sources)
        .max_retained_batches(options.max_retained_batches);

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Ok(router(state).layer(cors).layer(TraceLayer::new_for_http()))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/batches", post(submit_batch))
        .route("/batches/:batch_id", get(batch_status))
        .route("/batches/:batch_id/result", get(batch_result))
        .with_state(state)
}

pub async fn submit_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), (StatusCode, String)> {
    authorize(&state, &headers)?;
    check_sources(&state, &req.documents)?;
    let documents = assign_ids(req.documents);
    validate_documents(&documents).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let id = state.next_id.fetch_add(1, Ordering::SeqCst);
    let record = BatchRecord {
        batch_id: id,
        status: BatchStatus::Pending,
        documents: documents.len(),
        summary: None,
        warnings: Vec::new(),
        location: None,
        error: None,
    };
    state.batches.write().insert(id, record);
    tracing::info!(batch_id = id, documents = documents.len(), "batch accepted");

    let worker = state.clone();
    tokio::spawn(async move {
        worker.update(id, |r| r.status = BatchStatus::Running);
        match run_batch(&worker, id, documents).await {
            Ok(done) => worker.update(id, |r| {
                r.status = BatchStatus::Completed;
                r.summary = Some(done.summary);
                r.warnings = done.warnings;
                r.location = Some(done.location);
            }),
            Err(err) => {
                tracing::error!(batch_id = id, error = %err, "batch failed");
                worker.update(id, |r| {
                    r.status = BatchStatus::Failed;
                    r.error = Some(err.to_string());
                });
            }
        }
        worker.prune().await;
    });

    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "batchId": id, "status": BatchStatus::Pending }))))
}

/// Map and reduce on the runtime, then write the files on the blocking pool.
async fn run_batch(state: &AppState, id: u64, documents: Vec<Document>) -> Result<PersistedBatch> {
    let result = state.pipeline.run(documents).await?;
    let sink = FileSink::new(state.batch_dir(id));
    let BatchResult { index, summary, warnings, documents } = result;
    let location = tokio::task::spawn_blocking(move || sink.persist(&index, &summary)).await??;
    Ok(PersistedBatch { location, summary, warnings, documents })
}

pub async fn batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<u64>,
) -> Result<Json<BatchRecord>, (StatusCode, String)> {
    let record = state.batches.read().get(&batch_id).cloned();
    record.map(Json).ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown batch {batch_id}")))
}

/// Serves the persisted `index.json` bytes unchanged.
pub async fn batch_result(
    State(state): State<AppState>,
    Path(batch_id): Path<u64>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let status = state
        .batches
        .read()
        .get(&batch_id)
        .map(|r| r.status)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown batch {batch_id}")))?;
    if status != BatchStatus::Completed {
        return Err((StatusCode::CONFLICT, format!("batch {batch_id} is not completed")));
    }
    let bytes = load_index_bytes(&IndexPaths::new(state.batch_dir(batch_id)))
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], bytes))
}

/// Server-side file reads are never allowed; URL fetches only when enabled.
fn check_sources(state: &AppState, documents: &[DocumentInput]) -> Result<(), (StatusCode, String)> {
    for doc in documents {
        match &doc.source {
            Source::Text(_) => {}
            Source::Path(_) => {
                return Err((StatusCode::BAD_REQUEST, format!("document {:?}: path sources are not accepted", doc.name)));
            }
            Source::Url(_) if !state.allow_url_sources => {
                return Err((StatusCode::BAD_REQUEST, format!("document {:?}: url sources are disabled", doc.name)));
            }
            Source::Url(_) => {}
        }
    }
    Ok(())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Ok(()),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
