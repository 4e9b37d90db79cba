//! HTTP front end.
//!
//! Thin glue over a shared [`Vault`]. Every core call is blocking I/O and runs
//! on tokio's blocking pool, so a slow commit never stalls other requests.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Ingest a YAML or JSON document, returns the receipt |
//! | `GET`  | `/retrieve/{id}` | Stored YAML (`?format=json` for JSON, `?field=a.b` for one field) |
//! | `GET`  | `/retrieve/{id}/raw` | The prompt text only |
//! | `GET`  | `/lookup/{*name}` | Resolve `category/name` or a bare title |
//! | `GET`  | `/health` | Health check (version and document count) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "schema_violation", "message": "...", "details": [...] } }
//! ```
//!
//! | Code | Status |
//! |------|--------|
//! | `malformed_input`, `bad_request` | 400 |
//! | `not_found`, `field_not_found` | 404 |
//! | `duplicate_identifier` | 409 |
//! | `schema_violation` | 422 |
//! | `storage_write_failed`, `commit_failed`, `internal` | 500 |

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::IngestError;
use crate::lookup::project;
use crate::models::{IngestReceipt, Prompt};
use crate::vault::Vault;

/// Build the router over an opened vault.
pub fn router(vault: Arc<Vault>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/retrieve/{id}", get(handle_retrieve))
        .route("/retrieve/{id}/raw", get(handle_retrieve_raw))
        .route("/lookup/{*name}", get(handle_lookup))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(vault)
}

/// Open the configured repository and serve until the process is stopped.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();
    let owned = config.clone();
    let (vault, issues) = tokio::task::spawn_blocking(move || Vault::open(&owned)).await??;
    for issue in &issues {
        warn!("integrity: {}", issue);
    }

    let app = router(Arc::new(vault));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    println!("prompt-serve listening on http://{}", bind_addr);

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
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn not_found(code: &str, message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: code.to_string(),
        message: message.into(),
        details: None,
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
        details: None,
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
        details: None,
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let (status, details) = match &err {
            IngestError::MalformedInput { .. } => (StatusCode::BAD_REQUEST, None),
            IngestError::SchemaViolation { violations } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                serde_json::to_value(violations).ok(),
            ),
            IngestError::DuplicateIdentifier { id, existing } => (
                StatusCode::CONFLICT,
                Some(json!({ "id": id, "existing": existing })),
            ),
            IngestError::StorageWriteFailed { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
            IngestError::CommitFailed { path, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(json!({ "path": path })),
            ),
        };
        AppError {
            status,
            code: err.code().to_string(),
            message: err.to_string(),
            details,
        }
    }
}

impl From<crate::error::StoreError> for AppError {
    fn from(err: crate::error::StoreError) -> Self {
        warn!("read failed: {}", err);
        internal(err.to_string())
    }
}

/// Run a blocking vault call off the async executor.
async fn blocking<T, E>(
    vault: &Arc<Vault>,
    f: impl FnOnce(&Vault) -> Result<T, E> + Send + 'static,
) -> Result<T, AppError>
where
    T: Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    let vault = Arc::clone(vault);
    match tokio::task::spawn_blocking(move || f(&vault)).await {
        Ok(result) => result.map_err(Into::into),
        Err(e) => Err(internal(format!("worker failed: {}", e))),
    }
}

// ============ POST /upload ============

async fn handle_upload(
    State(vault): State<Arc<Vault>>,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestReceipt>), AppError> {
    if body.is_empty() {
        return Err(bad_request("request body is empty"));
    }
    let receipt = blocking(&vault, move |v| v.ingest_bytes(&body)).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

// ============ GET /retrieve/{id} ============

#[derive(Deserialize)]
struct RetrieveQuery {
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    field: Option<String>,
}

async fn handle_retrieve(
    State(vault): State<Arc<Vault>>,
    Path(id): Path<String>,
    Query(query): Query<RetrieveQuery>,
) -> Result<Response, AppError> {
    if let Some(field) = query.field {
        let prompt = fetch(&vault, id.clone()).await?;
        let value = project(&prompt, &field).ok_or_else(|| {
            not_found(
                "field_not_found",
                format!("document '{}' has no field '{}'", id, field),
            )
        })?;
        return Ok(Json(json!({ "id": id, "field": field, "value": value })).into_response());
    }

    match query.format.as_deref() {
        None | Some("yaml") => {
            let lookup_id = id.clone();
            let found = blocking(&vault, move |v| v.document_text(&lookup_id)).await?;
            let (_, text) = found.ok_or_else(|| missing_document(&id))?;
            Ok(([(header::CONTENT_TYPE, "application/yaml")], text).into_response())
        }
        Some("json") => Ok(Json(fetch(&vault, id).await?).into_response()),
        Some(other) => Err(bad_request(format!(
            "unsupported format '{}', expected yaml or json",
            other
        ))),
    }
}

// ============ GET /retrieve/{id}/raw ============

async fn handle_retrieve_raw(
    State(vault): State<Arc<Vault>>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let prompt = fetch(&vault, id).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        prompt.prompt,
    )
        .into_response())
}

async fn fetch(vault: &Arc<Vault>, id: String) -> Result<Prompt, AppError> {
    let lookup_id = id.clone();
    blocking(vault, move |v| v.by_id(&lookup_id))
        .await?
        .ok_or_else(|| missing_document(&id))
}

fn missing_document(id: &str) -> AppError {
    not_found("not_found", format!("no document with id '{}'", id))
}

// ============ GET /lookup/{*name} ============

#[derive(Serialize)]
struct LookupResponse {
    path: PathBuf,
    document: Prompt,
}

async fn handle_lookup(
    State(vault): State<Arc<Vault>>,
    Path(name): Path<String>,
) -> Result<Json<LookupResponse>, AppError> {
    let query = name.clone();
    let found = blocking(&vault, move |v| v.by_name(&query))
        .await?
        .ok_or_else(|| not_found("not_found", format!("no document named '{}'", name)))?;
    Ok(Json(LookupResponse {
        path: found.path,
        document: found.prompt,
    }))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    documents: usize,
}

async fn handle_health(State(vault): State<Arc<Vault>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        documents: vault.document_count(),
    })
}
