use crate::cli::Args;
use crate::config::prompt::TaskPrompt;
use crate::llm::chat::Provider;
use crate::llm::{ Part, ProviderError };
use crate::models::chat::{
    AnalyzeResumeRequest,
    ChatReply,
    ChatRequest,
    ErrorBody,
    FileUpload,
    HealthReply,
    HistoryTurn,
    SaveReply,
    SynthesizeRequest,
};
use crate::storage::{ PersonaStore, StoreError };
use axum::{
    extract::{ rejection::JsonRejection, DefaultBodyLimit, State },
    http::StatusCode,
    response::{ IntoResponse, Response },
    routing::{ get, post },
    Json,
    Router,
};
use log::{ error, info, warn };
use serde_json::{ json, Value as JsonValue };
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };
use tower_http::services::{ ServeDir, ServeFile };

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<Provider>,
    pub store: Arc<PersonaStore>,
    pub static_dir: PathBuf,
    pub max_body_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Model response was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Storage(StoreError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("{} → {}", status, self);
        } else {
            warn!("{} → {}", status, self);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    // Unknown paths get the SPA entry document so client-side routes survive a reload.
    let index = ServeFile::new(state.static_dir.join("index.html"));
    let assets = ServeDir::new(&state.static_dir).fallback(index);

    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/analyze-resume", post(analyze_resume_handler))
        .route("/api/synthesize", post(synthesize_handler))
        .route("/api/health", get(health_handler))
        .route("/api/save_dna", post(save_dna_handler))
        .route("/shadow_config.json", get(get_config_handler))
        .fallback_service(assets)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    args: &Args,
    state: AppState
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = args.server_addr().parse::<SocketAddr>()?;
    let app = router(state);

    if args.enable_tls {
        let (cert_path, key_path) = match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert), Some(key)) => (cert, key),
            _ => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("TLS enabled without cert/key".into());
            }
        };
        let _ = rustls::crypto::ring::default_provider().install_default();
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;

        info!("HTTPS server listening on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            e
        })?;
        info!("HTTP server listening on: http://{}", addr);
        axum::serve(listener, app.into_make_service()).await?;
    }

    Ok(())
}

async fn chat_handler(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Json<ChatReply>, ApiError> {
    let Json(req) = body?;
    let message = req.message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("'message' is required".to_string()))?;

    let history: Vec<_> = req.history.iter().map(HistoryTurn::to_turn).collect();
    let text = state.provider.chat(
        &history,
        &message,
        req.system_instruction.as_deref(),
        req.model.as_deref()
    ).await?;

    Ok(Json(ChatReply { text }))
}

async fn analyze_resume_handler(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeResumeRequest>, JsonRejection>
) -> Result<Json<JsonValue>, ApiError> {
    let Json(req) = body?;
    run_task(&state, TaskPrompt::ResumeAnalysis, req.text, req.file).await
}

async fn synthesize_handler(
    State(state): State<AppState>,
    body: Result<Json<SynthesizeRequest>, JsonRejection>
) -> Result<Json<JsonValue>, ApiError> {
    let Json(req) = body?;
    run_task(&state, TaskPrompt::Synthesis, req.content, req.file).await
}

/// Attachment first, instruction last, JSON back.
async fn run_task(
    state: &AppState,
    task: TaskPrompt,
    text: Option<String>,
    file: Option<FileUpload>
) -> Result<Json<JsonValue>, ApiError> {
    let text = text.filter(|t| !t.trim().is_empty());
    if text.is_none() && file.is_none() {
        return Err(ApiError::BadRequest("Provide text or a file to analyze".to_string()));
    }

    let mut parts = Vec::with_capacity(2);
    if let Some(file) = file {
        let attachment = file
            .decode()
            .map_err(|e| ApiError::BadRequest(format!("Attachment is not valid base64: {}", e)))?;
        info!("{}: attachment {} ({} bytes)", task.name(), attachment.mime_type, attachment.data.len());
        parts.push(Part::Inline(attachment));
    }
    parts.push(Part::Text(task.render(text.as_deref())));

    let raw = state.provider.generate_json(parts).await?;
    let parsed: JsonValue = serde_json::from_str(strip_code_fence(&raw))?;
    Ok(Json(parsed))
}

/// Models occasionally wrap JSON in a markdown fence even when asked not to.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

async fn get_config_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.get().await {
        Some(doc) => (StatusCode::OK, Json(doc)),
        None => {
            info!("No persona document found in bucket or local fallback");
            (StatusCode::NOT_FOUND, Json(json!({})))
        }
    }
}

fn is_empty_document(doc: &JsonValue) -> bool {
    match doc {
        JsonValue::Null => true,
        JsonValue::Object(map) => map.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        _ => false,
    }
}

async fn save_dna_handler(
    State(state): State<AppState>,
    body: Result<Json<JsonValue>, JsonRejection>
) -> Result<Json<SaveReply>, ApiError> {
    let Json(doc) = body?;
    if is_empty_document(&doc) {
        return Err(ApiError::BadRequest("No configuration data provided".to_string()));
    }

    let location = state.store.put(&doc).await?;
    Ok(Json(SaveReply { status: "success".to_string(), location }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthReply> {
    Json(HealthReply {
        status: "healthy".to_string(),
        key_active: state.provider.is_configured(),
        persistence_mode: (if state.store.has_backend() { "cloud" } else { "local" }).to_string(),
        bucket: state.store.bucket().map(str::to_string),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
