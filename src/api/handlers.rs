//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ConversationResponse, ErrorResponse, PersonasResponse, RandomPersonasQuery,
    StartConversationRequest,
};
use super::AppState;
use crate::llm::{LlmError, LlmMessage, LlmRequest, LlmResponse};
use crate::runtime::{CommandError, SseEvent};
use crate::state_machine::state::DEFAULT_MAX_TURNS;
use crate::state_machine::TransitionError;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

/// Personas picked when a start request names none
const DEFAULT_RANDOM_COUNT: usize = 2;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Persona catalog
        .route("/api/personas", get(list_personas))
        .route("/api/personas/random", get(random_personas))
        // Conversation control
        .route("/api/conversation", get(get_conversation))
        .route("/api/conversation/start", post(start_conversation))
        .route("/api/conversation/stop", post(stop_conversation))
        // SSE streaming
        .route("/api/conversation/stream", get(stream_conversation))
        // Inference proxy
        .route("/api/chat", post(proxy_chat))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Persona Catalog
// ============================================================

async fn list_personas(State(state): State<AppState>) -> Json<PersonasResponse> {
    Json(PersonasResponse {
        personas: state.catalog.all().to_vec(),
    })
}

async fn random_personas(
    State(state): State<AppState>,
    Query(query): Query<RandomPersonasQuery>,
) -> Json<PersonasResponse> {
    let count = query.count.unwrap_or(DEFAULT_RANDOM_COUNT);
    let personas = state
        .catalog
        .random_subset(count, &mut rand::thread_rng());
    Json(PersonasResponse { personas })
}

// ============================================================
// Conversation Control
// ============================================================

async fn get_conversation(State(state): State<AppState>) -> Json<ConversationResponse> {
    Json(ConversationResponse {
        conversation: state.orchestrator.snapshot(),
    })
}

async fn start_conversation(
    State(state): State<AppState>,
    body: Result<Json<StartConversationRequest>, JsonRejection>,
) -> Result<Json<ConversationResponse>, AppError> {
    let Json(req) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let participants = match &req.participants {
        Some(ids) => state
            .catalog
            .resolve(ids)
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
        None => state
            .catalog
            .random_subset(DEFAULT_RANDOM_COUNT, &mut rand::thread_rng()),
    };

    let conversation = state
        .orchestrator
        .start(
            req.topic,
            participants,
            req.max_turns.unwrap_or(DEFAULT_MAX_TURNS),
        )
        .await?;

    Ok(Json(ConversationResponse { conversation }))
}

async fn stop_conversation(
    State(state): State<AppState>,
) -> Result<Json<ConversationResponse>, AppError> {
    let conversation = state.orchestrator.stop().await?;
    Ok(Json(ConversationResponse { conversation }))
}

// ============================================================
// SSE Streaming
// ============================================================

async fn stream_conversation(State(state): State<AppState>) -> impl IntoResponse {
    // Subscribe before taking the snapshot so nothing falls between them
    let broadcast_rx = state.orchestrator.subscribe();
    let init_event = SseEvent::Init {
        snapshot: state.orchestrator.snapshot(),
    };
    sse_stream(init_event, broadcast_rx)
}

// ============================================================
// Inference Proxy
// ============================================================

async fn proxy_chat(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<LlmResponse>, AppError> {
    let Json(body) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let messages = match body.get("messages") {
        Some(messages @ Value::Array(_)) => messages.clone(),
        _ => {
            return Err(AppError::BadRequest(
                "Messages array is required".to_string(),
            ))
        }
    };
    let messages: Vec<LlmMessage> = serde_json::from_value(messages)
        .map_err(|e| AppError::BadRequest(format!("Invalid message: {e}")))?;

    let response = state.llm.complete(&LlmRequest { messages }).await?;
    Ok(Json(response))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("botchat ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Conflict(String),
    Internal(String),
    Status(StatusCode, String),
}

impl From<CommandError> for AppError {
    fn from(e: CommandError) -> Self {
        let message = e.to_string();
        match e {
            CommandError::Rejected(
                TransitionError::InvalidConfiguration(_) | TransitionError::InvalidPersona(_),
            ) => AppError::BadRequest(message),
            CommandError::Rejected(
                TransitionError::ConversationInProgress | TransitionError::NotStarted,
            ) => AppError::Conflict(message),
            CommandError::Rejected(TransitionError::InvalidTransition(_))
            | CommandError::RuntimeGone => AppError::Internal(message),
        }
    }
}

impl From<LlmError> for AppError {
    fn from(e: LlmError) -> Self {
        let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
        AppError::Status(status, e.message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Status(status, msg) => (status, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
