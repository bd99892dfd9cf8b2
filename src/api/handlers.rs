//! API handlers for peer chat and conversation management

use super::models::*;
use crate::conversation::{Thread, ThreadSummary};
use crate::engine::{wrap_response, ConversationEngine, Continuation, TurnRequest};
use crate::error::{ChatError, ErrorKind};
use crate::metrics::METRICS;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 200;

/// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversationEngine>,
}

/// API error body
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

/// HTTP status for each error kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::UnknownModel | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::UnsupportedAttachment => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ContentTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::UpstreamError => StatusCode::BAD_GATEWAY,
        ErrorKind::CorruptState | ErrorKind::StoreWriteFailed | ErrorKind::Configuration => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(err: ChatError) -> (StatusCode, Json<ApiError>) {
    let kind = err.kind();
    (
        status_for(kind),
        Json(ApiError::new(kind.as_code(), err.to_string())),
    )
}

/// Run one chat turn
///
/// POST /api/v1/chat
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    info!(
        "Chat request: model={}, continuation={:?}, attachments={}",
        request.model,
        request.continuation_id,
        request.files.len() + request.images.len()
    );

    let continuation = Continuation::from_parts(
        request.continuation_id,
        request.title,
        request.continue_latest,
    )
    .map_err(|msg| error_response(ChatError::InvalidRequest(msg)))?;

    let mut attachments = request.files;
    attachments.extend(request.images);

    let turn = TurnRequest {
        continuation,
        model_id: request.model,
        prompt: request.prompt,
        attachments,
        reasoning_effort: request.reasoning_effort,
    };

    // The turn runs detached so a dropped client does not abort persistence.
    let engine = state.engine.clone();
    let result = tokio::spawn(async move { engine.handle_turn(turn).await })
        .await
        .map_err(|e| {
            error!("Chat turn task failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new("INTERNAL_ERROR", "chat turn did not complete")),
            )
        })?
        .map_err(error_response)?;

    Ok(Json(ChatResponse {
        content: wrap_response(&result.assistant_turn.content.text, &result.model_used),
        continuation_id: result.continuation_id,
        model_used: result.model_used,
        new_thread: result.new_thread,
        omitted_turns: result.omitted_turns,
        truncation_notices: result.truncation_notices,
    }))
}

/// List catalog models
///
/// GET /api/v1/models
pub async fn list_models(State(state): State<AppState>) -> Json<ModelListResponse> {
    let models = state
        .engine
        .catalog()
        .list_models()
        .iter()
        .map(ModelInfo::from)
        .collect();
    Json(ModelListResponse { models })
}

/// Recent conversations, most recently updated first
///
/// GET /api/v1/conversations?limit=N
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Vec<ThreadSummary>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let summaries = state
        .engine
        .store()
        .list_thread_summaries(limit)
        .await
        .map_err(error_response)?;
    Ok(Json(summaries))
}

/// Latest conversation and the model used in it
///
/// GET /api/v1/conversations/latest
pub async fn latest_conversation(State(state): State<AppState>) -> ApiResult<LatestConversation> {
    let latest = state
        .engine
        .store()
        .list_thread_summaries(1)
        .await
        .map_err(error_response)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ApiError::new(
                    ErrorKind::NotFound.as_code(),
                    "No conversations yet",
                )),
            )
        })?;

    let catalog = state.engine.catalog();
    let model_used = latest
        .last_model
        .as_deref()
        .map(|id| catalog.display_name(id).to_string());

    Ok(Json(LatestConversation {
        continuation_id: latest.continuation_id,
        title: latest.title,
        updated_at: latest.updated_at,
        model_used,
    }))
}

/// Full conversation
///
/// GET /api/v1/conversations/:id
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Thread> {
    let thread = state
        .engine
        .store()
        .load_thread(&id)
        .await
        .map_err(error_response)?;
    Ok(Json(thread))
}

/// Delete a conversation
///
/// DELETE /api/v1/conversations/:id
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    state
        .engine
        .store()
        .delete_thread(&id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        models: state.engine.catalog().len(),
    })
}

/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
}
