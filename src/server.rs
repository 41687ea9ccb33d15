//! HTTP server.
//!
//! Thin axum layer over [`AnswerPipeline`]. Model and TOC failures never
//! surface as HTTP errors: `/chat` always answers `200` and encodes the
//! outcome in the body.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Chat page |
//! | `GET`  | `/static/*` | Files from `[server].static_dir` |
//! | `POST` | `/chat` | `{ "query" }` → `{ "answer", "source" }` |
//! | `GET`  | `/toc` | Plain-text table of contents, or `404` |
//! | `GET`  | `/health` | `{ "status": "ok" }` |
//! | `POST` | `/upload_pdf/` | Store an uploaded PDF (multipart field `file`) |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the page can be
//! opened from another host during development.

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::Instrument;

use crate::config::Config;
use crate::models::AnswerSource;
use crate::pipeline::AnswerPipeline;

const TOC_UNAVAILABLE: &str = "No TOC available";

/// Shared state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<AnswerPipeline>,
    upload_dir: Arc<PathBuf>,
}

/// Starts the HTTP server with a pipeline built from `config`.
///
/// Fails before binding if the index artifact cannot be loaded.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pipeline = AnswerPipeline::from_config(config)?;
    run_server_with_pipeline(config, Arc::new(pipeline)).await
}

/// Starts the HTTP server around an existing pipeline.
///
/// Used by tests and by binaries that supply their own index or models.
pub async fn run_server_with_pipeline(
    config: &Config,
    pipeline: Arc<AnswerPipeline>,
) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(config, pipeline);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the application router.
pub fn router(config: &Config, pipeline: Arc<AnswerPipeline>) -> Router {
    let state = AppState {
        pipeline,
        upload_dir: Arc::new(config.server.upload_dir.clone()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/chat", post(handle_chat))
        .route("/toc", get(handle_toc))
        .route("/health", get(handle_health))
        .route("/upload_pdf/", post(handle_upload))
        .nest_service("/static", ServeDir::new(&config.server.static_dir))
        .layer(DefaultBodyLimit::max(upload_limit_bytes(config.server.max_upload_mb)))
        .layer(cors)
        .with_state(state)
}

/// `max_upload_mb` in bytes, saturating for configs built without `parse_config`.
fn upload_limit_bytes(max_upload_mb: usize) -> usize {
    max_upload_mb.saturating_mul(1024 * 1024)
}

// ============ GET / ============

async fn handle_index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    query: String,
}

#[derive(Serialize)]
struct ChatResponse {
    answer: String,
    /// Which stage produced the answer: `toc`, `primary`, `fallback` or `failed`.
    source: AnswerSource,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("chat", %request_id);

    let answer = async {
        tracing::info!(query = %req.query.trim(), "received question");
        let answer = state.pipeline.resolve(&req.query).await;
        tracing::info!(
            source = %answer.source,
            degraded = answer.source.is_degraded(),
            "answered"
        );
        answer
    }
    .instrument(span)
    .await;

    Json(ChatResponse {
        answer: answer.text,
        source: answer.source,
    })
}

// ============ GET /toc ============

async fn handle_toc(State(state): State<AppState>) -> Response {
    match state.pipeline.toc().extract().await {
        Some(toc) => toc.into_response(),
        None => (StatusCode::NOT_FOUND, TOC_UNAVAILABLE).into_response(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// ============ POST /upload_pdf/ ============

/// Upload outcome. The index is not rebuilt, so `chunks` is always 0.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum UploadResponse {
    Success { chunks: usize },
    Error { message: String },
}

async fn handle_upload(State(state): State<AppState>, multipart: Multipart) -> Json<UploadResponse> {
    match save_upload(multipart, &state.upload_dir).await {
        Ok(path) => {
            tracing::info!(path = %path.display(), "stored uploaded PDF");
            Json(UploadResponse::Success { chunks: 0 })
        }
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "PDF upload error");
            Json(UploadResponse::Error {
                message: format!("{:#}", e),
            })
        }
    }
}

/// Write the `file` field of `multipart` into `dir` under its own file name.
async fn save_upload(mut multipart: Multipart, dir: &Path) -> anyhow::Result<PathBuf> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .and_then(upload_file_name)
            .context("upload has no usable file name")?;
        let bytes = field.bytes().await?;

        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        return Ok(path);
    }

    anyhow::bail!("missing multipart field 'file'")
}

/// Final path component of a client-supplied file name.
fn upload_file_name(raw: &str) -> Option<String> {
    Path::new(raw)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}
