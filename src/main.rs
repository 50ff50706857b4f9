//! Mistral OCR & Q&A document gateway.
//!
//! REST surface over the Mistral cloud API: upload and manage PDF documents,
//! run OCR, and ask questions about them (blocking or streamed). All durable
//! state lives with the provider; each handler validates input, makes one
//! adapter call, and maps the result.

mod config;
mod error;
mod format;
mod mistral;
mod schemas;
mod stream;
mod validate;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::HeaderValue,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use config::Settings;
use error::ApiError;
use mistral::MistralClient;
use schemas::{
    DocumentConversationRequest, DocumentConversationResponse, DocumentQaRequest,
    DocumentQaResponse, FileListResponse, FileRetrieveResponse, FileUploadResponse,
    OcrProcessResponse, OcrQueryRequest, SignedUrlQuery, SignedUrlResponse,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    settings: Arc<Settings>,
    mistral: Option<Arc<MistralClient>>,
}

impl AppState {
    /// The adapter handle, or the fixed not-initialized error when client
    /// construction failed at startup.
    fn client(&self) -> Result<Arc<MistralClient>, ApiError> {
        self.mistral.clone().ok_or(ApiError::NotInitialized)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "mistral_docqa=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    // A missing API key leaves the service up but answering every call with
    // a not-initialized error until restarted with valid configuration.
    let mistral = match MistralClient::from_env() {
        Ok(client) => {
            info!("Mistral client initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!("Mistral client not initialized: {}", e);
            None
        }
    };

    let cors = cors_layer(&settings);
    let body_limit = settings.body_limit();

    let state = AppState {
        settings: Arc::new(settings),
        mistral,
    };

    // Build router
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/documents/upload", post(upload_document))
        .route("/documents/", get(list_documents))
        .route(
            "/documents/{file_id}",
            get(retrieve_document).delete(delete_document),
        )
        .route("/documents/{file_id}/signed-url", get(get_signed_url))
        .route("/ocr/query", post(query_ocr))
        .route("/qa/query", post(query_document))
        .route("/qa/conversation", post(query_document_conversation))
        .route("/qa/stream", post(query_document_stream))
        .route(
            "/qa/conversation/stream",
            post(query_document_conversation_stream),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state.clone());

    // Run server
    let addr = format!("{}:{}", state.settings.host, state.settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    if settings.cors_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = settings
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

// ============================================================================
// Service endpoints
// ============================================================================

/// Root endpoint: service banner with the endpoint map and upload limits.
async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "mistral ocr and q&a document gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "limits": {
            "max_file_size_mb": state.settings.max_file_size_mb,
            "max_pages": state.settings.max_pages,
        },
        "endpoints": {
            "documents": {
                "upload": "/documents/upload",
                "list": "/documents/",
                "retrieve": "/documents/{file_id}",
                "delete": "/documents/{file_id}",
                "signed_url": "/documents/{file_id}/signed-url",
            },
            "ocr": {
                "process": "/ocr/query",
            },
            "qa": {
                "query": "/qa/query",
                "conversation": "/qa/conversation",
                "stream": "/qa/stream",
                "conversation_stream": "/qa/conversation/stream",
            },
        },
    }))
}

/// Health check: reports whether the Mistral adapter initialized.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "mistral_initialized": state.mistral.is_some(),
    }))
}

// ============================================================================
// Document management
// ============================================================================

/// Upload a PDF to Mistral cloud for later OCR and Q&A.
async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileUploadResponse>, ApiError> {
    let client = state.client()?;

    let mut filename: Option<String> = None;
    let mut data: Vec<u8> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            filename = field.file_name().map(|s| s.to_string());
            data = field.bytes().await?.to_vec();
            break;
        }
    }

    validate::validate_upload(
        filename.as_deref(),
        data.len(),
        state.settings.max_file_size_mb,
    )?;
    let filename = filename.unwrap_or_default();

    info!("Received file: {} ({} bytes)", filename, data.len());

    // The provider's upload wants a real seekable handle, so stage the bytes
    // through a scoped temporary file. Dropping `tmp` removes the file on
    // every exit path, including adapter failure.
    let tmp = tempfile::NamedTempFile::new()?;
    tokio::fs::write(tmp.path(), &data).await?;
    let staged = tokio::fs::File::from_std(tmp.reopen()?);

    let uploaded = client
        .upload_file(staged, &filename, data.len() as u64)
        .await
        .map_err(|e| ApiError::provider("failed to upload file", e))?;

    Ok(Json(format::upload_response(uploaded, data.len() as u64)))
}

/// List all uploaded documents.
async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<FileListResponse>, ApiError> {
    let files = state
        .client()?
        .list_files()
        .await
        .map_err(|e| ApiError::provider("failed to list files", e))?;

    Ok(Json(format::file_list(files)))
}

/// Retrieve metadata for one document.
async fn retrieve_document(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileRetrieveResponse>, ApiError> {
    let client = state.client()?;
    validate::validate_file_id(&file_id)?;

    match client.retrieve_file(&file_id).await {
        Ok(file) => Ok(Json(format::file_metadata(file))),
        Err(e) if e.is_not_found() => Err(ApiError::NotFound(file_id)),
        Err(e) => Err(ApiError::provider("failed to retrieve file", e)),
    }
}

/// Delete a document from Mistral cloud.
async fn delete_document(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<schemas::DeleteFileResponse>, ApiError> {
    let client = state.client()?;
    validate::validate_file_id(&file_id)?;

    let deleted = client
        .delete_file(&file_id)
        .await
        .map_err(|e| ApiError::provider("failed to delete file", e))?;
    debug!("Provider delete response: id={} deleted={}", deleted.id, deleted.deleted);

    Ok(Json(format::delete_response(&file_id)))
}

/// Get a time-bounded access URL for a document.
async fn get_signed_url(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
    Query(query): Query<SignedUrlQuery>,
) -> Result<Json<SignedUrlResponse>, ApiError> {
    let client = state.client()?;
    validate::validate_file_id(&file_id)?;

    let signed = client
        .get_signed_url(&file_id, query.expiry_hours)
        .await
        .map_err(|e| ApiError::provider("failed to get signed url", e))?;

    Ok(Json(SignedUrlResponse { url: signed.url }))
}

// ============================================================================
// OCR
// ============================================================================

/// Run OCR over an uploaded document, returning markdown per page.
async fn query_ocr(
    State(state): State<AppState>,
    Json(request): Json<OcrQueryRequest>,
) -> Result<Json<OcrProcessResponse>, ApiError> {
    let client = state.client()?;
    validate::validate_file_id(&request.file_id)?;

    let signed = client
        .get_signed_url(&request.file_id, None)
        .await
        .map_err(|e| ApiError::provider("failed to process ocr", e))?;

    let ocr = client
        .process_ocr(
            &state.settings.ocr_model,
            &signed.url,
            request.include_image_base64,
        )
        .await
        .map_err(|e| ApiError::provider("failed to process ocr", e))?;

    Ok(Json(format::ocr_pages(ocr)))
}

// ============================================================================
// Q&A
// ============================================================================

/// Ask a question about a document.
async fn query_document(
    State(state): State<AppState>,
    Json(request): Json<DocumentQaRequest>,
) -> Result<Json<DocumentQaResponse>, ApiError> {
    let client = state.client()?;
    validate::validate_file_id(&request.file_id)?;

    let model = request
        .model
        .unwrap_or_else(|| state.settings.default_qa_model.clone());
    let history = request.conversation_history.unwrap_or_default();

    let completion = client
        .query_document(&model, &request.file_id, &request.question, &history)
        .await
        .map_err(|e| ApiError::provider("failed to query document", e))?;

    Ok(Json(format::qa_response(
        completion,
        &request.file_id,
        &request.question,
    )?))
}

/// Ask a question about a document with caller-supplied conversation history.
/// The last message must be from the user; it becomes the current question.
async fn query_document_conversation(
    State(state): State<AppState>,
    Json(request): Json<DocumentConversationRequest>,
) -> Result<Json<DocumentConversationResponse>, ApiError> {
    let client = state.client()?;
    validate::validate_file_id(&request.file_id)?;

    let (history, question) = schemas::split_conversation(&request.messages)?;
    let model = request
        .model
        .unwrap_or_else(|| state.settings.default_qa_model.clone());

    let completion = client
        .query_document(&model, &request.file_id, &question, &history)
        .await
        .map_err(|e| ApiError::provider("failed to query document", e))?;

    Ok(Json(format::conversation_response(
        completion,
        &request.file_id,
        request.messages.len(),
    )?))
}

/// Ask a question about a document, streaming the answer as SSE frames.
async fn query_document_stream(
    State(state): State<AppState>,
    Json(request): Json<DocumentQaRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state.client()?;
    validate::validate_file_id(&request.file_id)?;

    let model = request
        .model
        .unwrap_or_else(|| state.settings.default_qa_model.clone());
    let history = request.conversation_history.unwrap_or_default();

    let upstream = client
        .query_document_stream(&model, &request.file_id, &request.question, &history)
        .await
        .map_err(|e| ApiError::provider("failed to stream query", e))?;

    Ok(stream::sse_response(stream::relay_frames(upstream)))
}

/// Conversation-mode streaming Q&A.
async fn query_document_conversation_stream(
    State(state): State<AppState>,
    Json(request): Json<DocumentConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let client = state.client()?;
    validate::validate_file_id(&request.file_id)?;

    let (history, question) = schemas::split_conversation(&request.messages)?;
    let model = request
        .model
        .unwrap_or_else(|| state.settings.default_qa_model.clone());

    let upstream = client
        .query_document_stream(&model, &request.file_id, &question, &history)
        .await
        .map_err(|e| ApiError::provider("failed to stream query", e))?;

    Ok(stream::sse_response(stream::relay_frames(upstream)))
}
