use axum::{
    extract::State,
    middleware::from_fn_with_state,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    errors::AppError,
    middleware::rate_limit_middleware,
    models::chat::{MessageRole, NewChatMessage, StreamChatRequest},
    routes::health::health_check,
    services::chat::generation::{self, StreamParams},
    state::AppState,
};

/// Routes under `/api/v1/chat`. Only `/stream` sits behind the rate
/// gate; `/health` must stay reachable for probes even when a client
/// has exhausted its budget.
pub fn chat_routes(state: AppState) -> Router<AppState> {
    let gated = Router::new()
        .route("/stream", post(stream_chat))
        .route_layer(from_fn_with_state(state, rate_limit_middleware));

    gated.route("/health", get(health_check))
}

/// Accepts a user message, persists it, and answers with an SSE stream
/// of generated fragments followed by a terminal chunk.
#[instrument(skip(state, payload), err)]
async fn stream_chat(
    State(state): State<AppState>,
    Json(payload): Json<StreamChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.message.trim().is_empty() {
        return Err(AppError::InvalidInput("Message cannot be empty".to_string()));
    }

    // All responses stream; the flag is accepted for wire compatibility.
    debug!(
        stream = payload.stream,
        temperature = payload.temperature,
        max_tokens = payload.max_tokens,
        "Received chat stream request"
    );

    let session_id = match payload.session_id {
        Some(id) if !id.trim().is_empty() => id,
        _ => Uuid::new_v4().to_string(),
    };

    let user_message = NewChatMessage {
        session_id: session_id.clone(),
        message_id: Uuid::new_v4().to_string(),
        role: MessageRole::User,
        content: payload.message.clone(),
    };
    state.store.save_message(user_message).await?;

    let params = StreamParams {
        session_id,
        message_id: Uuid::new_v4().to_string(),
        prompt: payload.message,
        temperature: payload.temperature,
        max_tokens: payload.max_tokens,
    };

    let stream = generation::stream_and_persist(state, params)
        .map(|chunk| Event::default().json_data(&chunk));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
