use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    response::{
        IntoResponse, Response,
        sse::{Event, Sse},
    },
    routing::{get, post},
};
use serde::Serialize;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::agent::{AgentRunner, GeminiRunner};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::{self, SourceFormat};
use crate::gemini::GeminiClient;
use crate::orchestrator::{
    Orchestrator, ProgressReporter, RunResult, RunStep, SilentReporter,
};
use crate::prompts::PromptEngine;

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState<R> {
    pub config: Config,
    pub runner: R,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Wrapper mapping crate errors onto HTTP responses: input faults are the
/// caller's (400), upstream model faults are a bad gateway (502), the rest
/// is a 500.
pub struct ApiError(Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidInput(_) | Error::UnsupportedFormat(_) | Error::Extraction(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

// ---------------------------------------------------------------------------
// Streaming events
// ---------------------------------------------------------------------------

/// Wire format for the streaming endpoint: progress events during the run,
/// then exactly one `complete` (with the full result flattened in) or one
/// `error`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Progress {
        step: RunStep,
        iteration: u32,
        max_iterations: u32,
        message: String,
    },
    Complete {
        #[serde(flatten)]
        result: RunResult,
    },
    Error {
        message: String,
    },
}

fn sse_event(event: &RunEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        Err(e) => Event::default().data(format!(
            "{{\"type\":\"error\",\"message\":\"event serialization failed: {e}\"}}"
        )),
    }
}

type SseSender = tokio::sync::mpsc::UnboundedSender<std::result::Result<Event, Infallible>>;

/// Reporter that forwards each pipeline stage onto the SSE channel.
struct ChannelReporter {
    tx: SseSender,
}

impl ProgressReporter for ChannelReporter {
    fn step(&self, step: RunStep, iteration: u32, max_iterations: u32, message: &str) {
        let event = RunEvent::Progress {
            step,
            iteration,
            max_iterations,
            message: message.to_string(),
        };
        // A dropped receiver just means the client went away mid-run.
        let _ = self.tx.send(Ok(sse_event(&event)));
    }
}

// ---------------------------------------------------------------------------
// Multipart intake
// ---------------------------------------------------------------------------

struct UploadPart {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

async fn read_upload(mut multipart: Multipart) -> Result<UploadPart> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidInput(format!("failed to read upload: {e}")))?;
        return Ok(UploadPart {
            filename,
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Err(Error::InvalidInput(
        "multipart field 'file' is required".to_string(),
    ))
}

fn extract_upload_text(part: &UploadPart) -> Result<String> {
    let format = SourceFormat::detect(&part.filename, part.content_type.as_deref())?;
    extract::extract_text(format, &part.bytes)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Falsity Chart Generator API",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "claimchart",
    }))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: String,
    filename: String,
    text_length: usize,
}

/// Upload preflight: extract and validate without burning any model calls.
async fn upload<R>(
    State(state): State<AppState<R>>,
    multipart: Multipart,
) -> std::result::Result<Json<UploadResponse>, ApiError>
where
    R: AgentRunner + Clone + Send + Sync + 'static,
{
    let part = read_upload(multipart).await?;
    let text = extract_upload_text(&part)?;
    extract::validate_source_text(&text, state.config.max_source_chars)?;

    info!(filename = part.filename, text_chars = text.len(), "upload accepted");
    Ok(Json(UploadResponse {
        message: "File uploaded successfully".to_string(),
        filename: part.filename,
        text_length: text.len(),
    }))
}

async fn process<R>(
    State(state): State<AppState<R>>,
    multipart: Multipart,
) -> std::result::Result<Response, ApiError>
where
    R: AgentRunner + Clone + Send + Sync + 'static,
{
    let part = read_upload(multipart).await?;
    let text = extract_upload_text(&part)?;
    info!(filename = part.filename, text_chars = text.len(), "processing complaint");

    let engine = PromptEngine::new(state.config.prompt_dir.clone());
    let orchestrator =
        Orchestrator::with_reporter(state.runner.clone(), engine, state.config.clone(), SilentReporter);
    let result = orchestrator.run(&text).await?;

    let status = if result.status.is_failure() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(result)).into_response())
}

async fn process_stream<R>(
    State(state): State<AppState<R>>,
    multipart: Multipart,
) -> std::result::Result<Response, ApiError>
where
    R: AgentRunner + Clone + Send + Sync + 'static,
{
    let part = read_upload(multipart).await?;
    let text = extract_upload_text(&part)?;
    // Reject bad input as a plain 400 before committing to a stream.
    extract::validate_source_text(&text, state.config.max_source_chars)?;
    info!(filename = part.filename, text_chars = text.len(), "processing complaint (streaming)");

    let (sse_tx, sse_rx) =
        tokio::sync::mpsc::unbounded_channel::<std::result::Result<Event, Infallible>>();
    let reporter = ChannelReporter {
        tx: sse_tx.clone(),
    };
    let config = state.config.clone();
    let runner = state.runner.clone();

    tokio::spawn(async move {
        let engine = PromptEngine::new(config.prompt_dir.clone());
        let orchestrator = Orchestrator::with_reporter(runner, engine, config, reporter);
        let event = match orchestrator.run(&text).await {
            Ok(result) => RunEvent::Complete { result },
            Err(e) => RunEvent::Error {
                message: e.to_string(),
            },
        };
        let _ = sse_tx.send(Ok(sse_event(&event)));
    });

    Ok(Sse::new(UnboundedReceiverStream::new(sse_rx)).into_response())
}

// ---------------------------------------------------------------------------
// Router and entry point
// ---------------------------------------------------------------------------

pub fn router<R>(state: AppState<R>) -> Router
where
    R: AgentRunner + Clone + Send + Sync + 'static,
{
    let cors = match state.config.allowed_origin.as_deref() {
        Some(origin) => match origin.parse::<HeaderValue>() {
            Ok(value) => CorsLayer::new()
                .allow_origin(value)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => {
                warn!(origin, "invalid allowed_origin, cross-origin requests stay blocked");
                CorsLayer::new()
            }
        },
        None => CorsLayer::new(),
    };

    Router::new()
        .route("/", get(root))
        .route("/api/health", get(health))
        .route("/api/upload", post(upload::<R>))
        .route("/api/process", post(process::<R>))
        .route("/api/process/stream", post(process_stream::<R>))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: Config) -> Result<()> {
    let client = GeminiClient::new(&config)?;
    let runner = GeminiRunner::new(client);
    let listen_addr = config.listen_addr.clone();

    let app = router(AppState { config, runner });
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .map_err(|e| Error::Server(format!("failed to bind {listen_addr}: {e}")))?;
    info!(addr = listen_addr, "listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Server(format!("serve failed: {e}")))?;
    Ok(())
}
