use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use crawler::{CrawlHistory, CrawlRequest, CrawlResult, Crawler};
use search_core::search::DEFAULT_LIMIT;
use search_core::{
    Analyzer, DocId, Document, DocumentRequest, DocumentStore, IndexingService, InsertOutcome, InvertedIndex, QueryEngine,
    SearchHit, SearchRequest, UpdateOutcome,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod error;

pub use error::ApiError;

pub const DEFAULT_MAX_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(alias = "q")]
    pub query: String,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct UrlParams {
    pub url: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub total_results: usize,
    pub limit: usize,
    pub offset: usize,
    pub took_ms: u64,
    pub results: Vec<SearchResultItem>,
}

#[derive(Serialize)]
pub struct SearchResultItem {
    #[serde(flatten)]
    pub hit: SearchHit,
    /// Stored metadata, absent if the document vanished after ranking.
    pub document: Option<Document>,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<DocumentStore>,
    pub indexing: IndexingService,
    pub engine: QueryEngine,
    pub crawler: Crawler,
    pub max_limit: usize,
}

impl AppState {
    /// Wires one shared index into the write and query paths and replays
    /// the store into it.
    pub fn new(store: DocumentStore, max_limit: usize) -> Result<Self> {
        let analyzer = Arc::new(Analyzer::english());
        let index = Arc::new(InvertedIndex::new());
        let indexing = IndexingService::new(index.clone(), analyzer.clone());
        indexing.rebuild_from(&store)?;
        let store = Arc::new(store);
        let crawler = Crawler::new(store.clone(), Some(indexing.clone()))?;
        Ok(Self {
            store,
            indexing,
            engine: QueryEngine::new(index, analyzer),
            crawler,
            max_limit: max_limit.max(1),
        })
    }
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/search", get(search_handler))
        .route("/api/documents", get(list_documents).post(create_document).delete(delete_all_documents))
        .route("/api/documents/count", get(count_documents))
        .route("/api/documents/url", get(document_by_url))
        .route("/api/documents/:id", get(document_by_id).put(update_document).delete(delete_document))
        .route("/api/index/stats", get(index_stats))
        .route("/api/crawler/start", post(start_crawl))
        .route("/api/crawler/history", get(crawl_history))
        .route("/api/crawler/history/:id", get(crawl_history_by_id))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(state.max_limit);
    let offset = params.offset.unwrap_or(0);
    tracing::info!(query = %params.query, limit, offset, "search");

    let request = SearchRequest::new(params.query).page(limit, offset);
    let found = state.engine.search(&request, state.store.as_ref());

    let mut results = Vec::with_capacity(found.results.len());
    for hit in found.results {
        let document = match state.store.get(hit.doc_id) {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!(doc_id = hit.doc_id, error = %err, "document lookup failed");
                None
            }
        };
        results.push(SearchResultItem { hit, document });
    }
    Ok(Json(SearchResponse {
        query: found.query,
        total_results: found.total_results,
        limit: found.limit,
        offset: found.offset,
        took_ms: found.took_ms,
        results,
    }))
}

async fn create_document(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    if request.url.trim().is_empty() {
        return Err(ApiError::BadRequest("url must not be empty".into()));
    }
    match state.store.insert(request)? {
        InsertOutcome::Inserted(doc) => {
            state.indexing.add(Some(doc.id), &doc.content);
            tracing::info!(doc_id = doc.id, url = %doc.url, "document added");
            Ok((StatusCode::CREATED, Json(doc)))
        }
        InsertOutcome::DuplicateUrl(existing) => {
            Err(ApiError::Conflict(format!("Document with URL already exists (id={existing})")))
        }
    }
}

async fn list_documents(State(state): State<AppState>) -> Result<Json<Vec<Document>>, ApiError> {
    Ok(Json(state.store.list()?))
}

async fn count_documents(State(state): State<AppState>) -> Json<usize> {
    Json(state.store.count())
}

async fn document_by_id(State(state): State<AppState>, Path(id): Path<DocId>) -> Result<Json<Document>, ApiError> {
    state
        .store
        .get(id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Document not found: ID={id}")))
}

async fn document_by_url(
    State(state): State<AppState>,
    Query(params): Query<UrlParams>,
) -> Result<Json<Document>, ApiError> {
    state
        .store
        .get_by_url(&params.url)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Document not found: URL={}", params.url)))
}

async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<DocId>,
    Json(request): Json<DocumentRequest>,
) -> Result<Json<Document>, ApiError> {
    if request.url.trim().is_empty() {
        return Err(ApiError::BadRequest("url must not be empty".into()));
    }
    match state.store.update(id, request)? {
        UpdateOutcome::Updated(doc) => {
            state.indexing.reindex(doc.id, &doc.content);
            tracing::info!(doc_id = id, "document updated");
            Ok(Json(doc))
        }
        UpdateOutcome::NotFound => Err(ApiError::NotFound(format!("Document not found: ID={id}"))),
        UpdateOutcome::DuplicateUrl(owner) => {
            Err(ApiError::Conflict(format!("URL already exists (id={owner})")))
        }
    }
}

async fn delete_document(State(state): State<AppState>, Path(id): Path<DocId>) -> Result<StatusCode, ApiError> {
    if !state.store.delete(id)? {
        return Err(ApiError::NotFound(format!("Document not found: ID={id}")));
    }
    state.indexing.remove(id);
    tracing::info!(doc_id = id, "document deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_all_documents(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store.clear()?;
    state.indexing.clear();
    tracing::info!("all documents deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn index_stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let data = state.indexing.index().read();
    Json(serde_json::json!({
        "documents": data.count(),
        "terms": data.term_count(),
        "next_doc_id": data.next_doc_id(),
    }))
}

async fn start_crawl(
    State(state): State<AppState>,
    Json(request): Json<CrawlRequest>,
) -> Result<Json<CrawlResult>, ApiError> {
    if request.start_url.trim().is_empty() {
        return Err(ApiError::BadRequest("start_url must not be empty".into()));
    }
    let result = state.crawler.crawl(&request).await?;
    Ok(Json(result))
}

async fn crawl_history(State(state): State<AppState>) -> Result<Json<Vec<CrawlHistory>>, ApiError> {
    Ok(Json(state.crawler.history().list()?))
}

async fn crawl_history_by_id(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<CrawlHistory>, ApiError> {
    state
        .crawler
        .history()
        .get(id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Crawl not found: ID={id}")))
}
