use anyhow::Result;
use axum::{extract::{Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use kbsearch_core::grounding::build_context;
use kbsearch_core::persist::{append_records, load_records, replay};
use kbsearch_core::tokenizer::tokenize;
use kbsearch_core::{KnowledgeRecord, VectorEngine, DEFAULT_LIMIT};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

const MAX_K: usize = 100;

/// Start-up settings: flags from the binary plus environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// JSONL record log replayed at start-up and appended to on every add.
    pub records: Option<PathBuf>,
    pub default_k: usize,
    pub admin_token: Option<String>,
    pub cors_allow_origin: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { records: None, default_k: DEFAULT_LIMIT, admin_token: None, cors_allow_origin: None }
    }
}

impl ServerConfig {
    /// Read `ADMIN_TOKEN` and `CORS_ALLOW_ORIGIN` from the environment.
    pub fn from_env(records: Option<PathBuf>, default_k: usize) -> Self {
        Self {
            records,
            default_k,
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
            cors_allow_origin: std::env::var("CORS_ALLOW_ORIGIN").ok(),
        }
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub k: Option<usize>,
}

#[derive(Deserialize)]
pub struct ContextParams {
    pub q: String,
    pub k: Option<usize>,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}
fn default_max_chars() -> usize { 500 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub text: String,
    pub highlighted: String,
    pub metadata: serde_json::Value,
}

#[derive(Serialize)]
pub struct ContextResponse {
    pub query: String,
    pub context: Option<String>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub documents: usize,
    pub vocabulary: usize,
    pub stale: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<VectorEngine>>,
    pub records_path: Option<PathBuf>,
    pub admin_token: Option<String>,
    pub default_k: usize,
}

/// Build the router with a fresh engine, replaying the record log if one is configured.
pub fn build_app(config: ServerConfig) -> Result<Router> {
    let mut engine = VectorEngine::new();
    if let Some(path) = &config.records {
        replay(&mut engine, read_log(path)?);
    }
    Ok(router_with_engine(engine, config))
}

/// Build the router around an engine supplied by the caller.
pub fn router_with_engine(engine: VectorEngine, config: ServerConfig) -> Router {
    let cors = match config.cors_allow_origin.as_deref() {
        Some(val) => {
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
        None => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        records_path: config.records,
        admin_token: config.admin_token,
        default_k: config.default_k,
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/context", get(context_handler))
        .route("/stats", get(stats_handler))
        .route("/documents", post(add_document))
        .route("/index/batch", post(index_batch))
        .route("/index/clear", post(index_clear))
        .route("/index/rebuild", post(index_rebuild))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// A missing log is an empty knowledge base, not an error.
fn read_log(path: &Path) -> Result<Vec<KnowledgeRecord>> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "record log not found, starting empty");
        return Ok(Vec::new());
    }
    Ok(load_records(path)?)
}

fn clamp_k(k: Option<usize>, default_k: usize) -> usize {
    k.unwrap_or(default_k).clamp(1, MAX_K)
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<SearchResponse> {
    let start = std::time::Instant::now();
    let k = clamp_k(params.k, state.default_k);
    let words = highlight_words(&params.q);

    let (total_hits, results) = {
        let mut engine = state.engine.lock();
        let hits = engine.search_limit(&params.q, usize::MAX);
        let total_hits = hits.len();
        let results: Vec<SearchHit> = hits
            .into_iter()
            .take(k)
            .map(|hit| SearchHit {
                id: hit.document.id.clone(),
                score: hit.score,
                text: hit.document.text.clone(),
                highlighted: highlight_terms(&hit.document.text, &words),
                metadata: hit.document.metadata.clone(),
            })
            .collect();
        (total_hits, results)
    };

    let elapsed = start.elapsed();
    Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, results })
}

pub async fn context_handler(State(state): State<AppState>, Query(params): Query<ContextParams>) -> Json<ContextResponse> {
    let k = clamp_k(params.k, state.default_k);
    let context = {
        let mut engine = state.engine.lock();
        let hits = engine.search_limit(&params.q, k);
        build_context(&hits, params.max_chars)
    };
    Json(ContextResponse { query: params.q, context })
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let engine = state.engine.lock();
    Json(StatsResponse { documents: engine.len(), vocabulary: engine.vocabulary_size(), stale: engine.is_stale() })
}

/// Query words worth highlighting: surrounding punctuation trimmed, stop words
/// and short words dropped, inner apostrophes kept so "don't" still matches.
fn highlight_words(query: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for raw in query.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric());
        if tokenize(word).is_empty() || words.iter().any(|w| w.eq_ignore_ascii_case(word)) {
            continue;
        }
        words.push(word.to_string());
    }
    words.sort_by(|a, b| b.len().cmp(&a.len()));
    words
}

/// Wrap query words in `<em>`, HTML-escaping everything else in `text`.
fn highlight_terms(text: &str, words: &[String]) -> String {
    let alternation = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
    let pat = match regex::RegexBuilder::new(&format!(r"\b(?:{alternation})\b")).case_insensitive(true).build() {
        Ok(pat) if !words.is_empty() => pat,
        _ => return escape_html(text),
    };
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in pat.find_iter(text) {
        out.push_str(&escape_html(&text[last..m.start()]));
        out.push_str("<em>");
        out.push_str(&escape_html(m.as_str()));
        out.push_str("</em>");
        last = m.end();
    }
    out.push_str(&escape_html(&text[last..]));
    out
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// --- Admin endpoints ---
async fn add_document(State(state): State<AppState>, headers: HeaderMap, Json(record): Json<KnowledgeRecord>) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let documents = ingest(&state, vec![record])?;
    Ok(Json(serde_json::json!({ "added": 1, "documents": documents })))
}

async fn index_batch(State(state): State<AppState>, headers: HeaderMap, Json(records): Json<Vec<KnowledgeRecord>>) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let added = records.len();
    let documents = ingest(&state, records)?;
    Ok(Json(serde_json::json!({ "added": added, "documents": documents })))
}

async fn index_clear(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    state.engine.lock().clear();
    tracing::info!("index cleared");
    Ok(Json(serde_json::json!({ "documents": 0 })))
}

async fn index_rebuild(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let path = state
        .records_path
        .as_ref()
        .ok_or((StatusCode::BAD_REQUEST, "no record log configured".to_string()))?;
    // Held across the read so no append lands between reading the log and replaying it.
    let mut engine = state.engine.lock();
    let records = read_log(path).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    engine.clear();
    let replayed = replay(&mut engine, records);
    Ok(Json(serde_json::json!({ "documents": replayed })))
}

/// Persist to the record log (when configured), then add to the engine, all under
/// the engine lock so the log and the corpus see the same order. A failed write
/// leaves the engine untouched.
fn ingest(state: &AppState, records: Vec<KnowledgeRecord>) -> Result<usize, (StatusCode, String)> {
    let mut engine = state.engine.lock();
    if let Some(path) = &state.records_path {
        append_records(path, &records).map_err(|e| {
            tracing::warn!(error = %e, "record log append failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    }
    for record in records {
        engine.add(record.id, record.text, record.metadata);
    }
    Ok(engine.len())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
