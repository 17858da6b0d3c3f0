//! HTTP upload surface.
//!
//! Lets other services push documents through the same pipeline as the CLI.
//! Uploaded files are staged in a temporary directory that is removed when
//! the request finishes, whether ingestion succeeded or not.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `POST` | `/ingest` | Multipart upload; returns an [`IngestReport`] |
//!
//! `POST /ingest` stages every non-empty multipart field that carries a file
//! name. Two optional text fields adjust the run: `namespace`, and `dry_run`
//! (`true`/`false`), which can turn dry-run on but never off when the server
//! is configured for it. Everything else comes from the server's configuration.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "no files uploaded" } }
//! ```
//!
//! Error codes: `bad_request` (400) for malformed uploads and configuration
//! errors, `ingest_failed` (500) for loader or backend failures, `internal`
//! (500) for staging failures.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{parse_bool, Config};
use crate::error::is_config_error;
use crate::ingest::{ingest, BackendFactory, DefaultBackends, IngestOptions};
use crate::models::IngestReport;
use crate::progress::NoProgress;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    backends: Arc<dyn BackendFactory>,
}

impl AppState {
    /// State using the configured embedding provider and Pinecone.
    pub fn new(config: Config) -> Self {
        let backends = Arc::new(DefaultBackends::from_config(&config));
        Self::with_backends(config, backends)
    }

    /// State using caller-supplied backends.
    pub fn with_backends(config: Config, backends: Arc<dyn BackendFactory>) -> Self {
        Self {
            config: Arc::new(config),
            backends,
        }
    }
}

/// Build the router. Exposed so tests and embedding programs can serve it
/// on their own listener.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/health", get(handle_health))
        .route("/ingest", post(handle_ingest))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let app = router(AppState::new(config.clone()));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "ingest server listening");
    println!("Ingest server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Configuration mistakes are the caller's fault; everything else is ours.
fn classify_ingest_error(err: anyhow::Error) -> AppError {
    if is_config_error(&err) {
        bad_request(format!("{:#}", err))
    } else {
        AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "ingest_failed".to_string(),
            message: format!("{:#}", err),
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /ingest ============

async fn handle_ingest(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestReport>, AppError> {
    let staging = tempfile::TempDir::new()
        .map_err(|e| internal(format!("failed to create staging directory: {}", e)))?;

    let mut namespace: Option<String> = None;
    let mut dry_run = false;
    let mut files = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        let file_name = field.file_name().map(|name| sanitize_file_name(name, files));

        if let Some(file_name) = file_name {
            let data = field
                .bytes()
                .await
                .map_err(|e| bad_request(format!("failed to read '{}': {}", file_name, e)))?;
            if data.is_empty() {
                tracing::debug!(file = %file_name, "skipping empty upload");
                continue;
            }
            tokio::fs::write(staging.path().join(&file_name), &data)
                .await
                .map_err(|e| internal(format!("failed to stage '{}': {}", file_name, e)))?;
            tracing::debug!(file = %file_name, bytes = data.len(), "staged upload");
            files += 1;
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| bad_request(format!("failed to read field '{}': {}", field_name, e)))?;
        match field_name.as_str() {
            "namespace" => {
                let value = value.trim();
                namespace = (!value.is_empty()).then(|| value.to_string());
            }
            "dry_run" => {
                dry_run = parse_bool("dry_run", &value).map_err(|e| bad_request(e.to_string()))?;
            }
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    if files == 0 {
        return Err(bad_request("no files uploaded"));
    }

    let mut options = IngestOptions::from_config(&state.config, staging.path());
    if namespace.is_some() {
        options.namespace = namespace;
    }
    options.dry_run |= dry_run;

    tracing::info!(files, dry_run = options.dry_run, "ingesting upload");
    let report = ingest(&options, state.backends.as_ref(), &NoProgress)
        .await
        .map_err(classify_ingest_error)?;

    Ok(Json(report))
}

/// Flatten an uploaded file name so it cannot escape the staging directory.
fn sanitize_file_name(name: &str, position: usize) -> String {
    let flat = name.trim().replace(['/', '\\'], "_");
    if flat.is_empty() || flat == "." || flat == ".." {
        format!("upload_{}.txt", position)
    } else {
        flat
    }
}
