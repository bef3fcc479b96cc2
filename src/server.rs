//! JSON HTTP API for ingestion and grounded chat.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/ingest` | Upload a document (multipart) into a namespace |
//! | `GET`  | `/api/status/{namespace}` | Processing state for a namespace |
//! | `POST` | `/api/chat` | Grounded reply to one utterance |
//! | `POST` | `/api/synthesize` | Synthesize reply text into audio |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses use one schema:
//!
//! ```json
//! { "error": { "code": "unsupported_format", "message": "no text extractor for 'scan.png'" } }
//! ```
//!
//! `bad_request` and `unsupported_format` map to 400; upstream provider
//! failures (`storage_write`, `embedding_provider`, `index_write`,
//! `completion_request`, `synthesis_request`) map to 502; everything else
//! is a 500 `internal`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser clients can
//! upload documents and drive conversations cross-origin.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::completion::{ChatMessage, CompletionClient, GroundedResponder};
use crate::config::Config;
use crate::embedding::EmbeddingClient;
use crate::error::Error;
use crate::index::IndexClient;
use crate::ingest::{IngestReport, Ingestor, ProcessingState};
use crate::storage::ObjectStore;
use crate::synthesis::SynthesisClient;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    ingestor: Arc<Ingestor>,
    responder: Arc<GroundedResponder>,
    synthesis: Arc<SynthesisClient>,
}

/// Starts the HTTP server on the address from `[server].bind`.
///
/// Builds every external client up front so missing credentials fail at
/// startup, not on the first request.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState {
        ingestor: Arc::new(Ingestor::new(
            ObjectStore::new(config.storage.clone()),
            EmbeddingClient::new(&config.embedding)?,
            IndexClient::new(&config.index)?,
            config.chunking.clone(),
        )),
        responder: Arc::new(GroundedResponder::new(
            EmbeddingClient::new(&config.embedding)?,
            IndexClient::new(&config.index)?,
            CompletionClient::new(&config.completion)?,
        )),
        synthesis: Arc::new(SynthesisClient::new(&config.synthesis)?),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/ingest", post(handle_ingest))
        .route("/api/status/{namespace}", get(handle_status))
        .route("/api/chat", post(handle_chat))
        .route("/api/synthesize", post(handle_synthesize))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    tracing::info!(bind = %config.server.bind, "server listening");

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
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

/// Internal error type that converts into an HTTP response.
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

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::UnsupportedFormat(_) => (StatusCode::BAD_REQUEST, "unsupported_format"),
            Error::StorageWrite(_) => (StatusCode::BAD_GATEWAY, "storage_write"),
            Error::EmbeddingProvider(_) => (StatusCode::BAD_GATEWAY, "embedding_provider"),
            Error::IndexWrite(_) => (StatusCode::BAD_GATEWAY, "index_write"),
            Error::CompletionRequest(_) => (StatusCode::BAD_GATEWAY, "completion_request"),
            Error::SynthesisRequest(_) => (StatusCode::BAD_GATEWAY, "synthesis_request"),
            Error::TranscriptionStream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError {
            status,
            code: code.to_string(),
            message: err.to_string(),
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

// ============ POST /api/ingest ============

#[derive(Serialize)]
struct IngestResponse {
    message: String,
    #[serde(flatten)]
    report: IngestReport,
}

/// Handler for `POST /api/ingest`.
///
/// Expects a multipart form with a `namespace` text field and a `file`
/// field carrying the document. Responds once ingestion has finished; the
/// namespace is queryable as soon as the 200 arrives.
async fn handle_ingest(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, AppError> {
    let mut namespace: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("namespace") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid namespace field: {e}")))?;
                namespace = Some(value);
            }
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| bad_request("file field has no filename"))?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("invalid file field: {e}")))?;
                file = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let namespace = namespace
        .filter(|ns| !ns.is_empty())
        .ok_or_else(|| bad_request("namespace must not be empty"))?;
    let (file_name, bytes) = file.ok_or_else(|| bad_request("file field is required"))?;

    let report = state.ingestor.ingest(&namespace, &file_name, &bytes).await?;
    Ok(Json(IngestResponse {
        message: "success".to_string(),
        report,
    }))
}

// ============ GET /api/status/{namespace} ============

#[derive(Serialize)]
struct StatusResponse {
    namespace: String,
    state: ProcessingState,
}

async fn handle_status(
    State(state): State<AppState>,
    Path(namespace): Path<String>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: state.ingestor.state(&namespace),
        namespace,
    })
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    namespace: String,
    utterance: String,
    #[serde(default)]
    history: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatResponse {
    reply: String,
}

/// Handler for `POST /api/chat`.
///
/// Stateless: the caller supplies the conversation history with every
/// request and appends turns on its own side.
async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if request.utterance.trim().is_empty() {
        return Err(bad_request("utterance must not be empty"));
    }
    if request.namespace.is_empty() {
        return Err(bad_request("namespace must not be empty"));
    }

    let reply = state
        .responder
        .reply(&request.namespace, &request.utterance, &request.history)
        .await?;
    Ok(Json(ChatResponse { reply }))
}

// ============ POST /api/synthesize ============

#[derive(Deserialize)]
struct SynthesizeRequest {
    text: String,
}

/// Handler for `POST /api/synthesize`.
///
/// Returns the raw audio bytes so a browser client can play them directly.
async fn handle_synthesize(
    State(state): State<AppState>,
    Json(request): Json<SynthesizeRequest>,
) -> Result<Response, AppError> {
    if request.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }

    let audio = state.synthesis.synthesize(&request.text).await?;
    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response())
}
