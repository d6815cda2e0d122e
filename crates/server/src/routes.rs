//! HTTP surface of the pipeline.
//!
//! - `GET  /health`       — readiness probe with store mode and session count
//! - `POST /v1/messages`  — one conversational turn for a merchant

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use lapak_agent::{ConversationSessionStore, Orchestrator, OrchestratorReply};
use lapak_core::ports::SellerDirectory;
use lapak_core::{ApplicationError, IntentAction};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator<Arc<dyn SellerDirectory>>>,
    pub sessions: Arc<ConversationSessionStore>,
    pub store_mode: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub store_mode: &'static str,
    pub active_sessions: usize,
    pub checked_at: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub user_id: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub reply: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub quick_replies: Vec<String>,
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/messages", post(handle_message))
        .with_state(state)
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "ready",
        store_mode: state.store_mode,
        active_sessions: state.sessions.active_sessions().await,
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}

pub async fn handle_message(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, Json<ApiError>)> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }
    if request.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }

    // A panic inside the pipeline must never leak to the merchant; the turn
    // runs in its own task and a crash folds into the localized apology.
    let orchestrator = Arc::clone(&state.orchestrator);
    let owned_user = user_id.to_string();
    let text = request.text.clone();
    let turn =
        tokio::spawn(async move { orchestrator.handle_message(&owned_user, &text).await });

    let reply = match turn.await {
        Ok(reply) => reply,
        Err(join_error) => {
            let failure = ApplicationError::Internal(join_error.to_string());
            error!(user_id, error = %failure, "conversation turn crashed");
            OrchestratorReply {
                message: failure.user_message().to_string(),
                quick_replies: Vec::new(),
                action: IntentAction::Unknown,
            }
        }
    };
    info!(
        event_name = "http.message_handled",
        user_id,
        action = reply.action.wire_name(),
        "conversation turn completed"
    );

    Ok(Json(MessageResponse {
        reply: reply.message,
        quick_replies: reply.quick_replies,
        action: reply.action.wire_name().to_string(),
    }))
}

fn bad_request(message: &str) -> (StatusCode, Json<ApiError>) {
    (StatusCode::UNPROCESSABLE_ENTITY, Json(ApiError { error: message.to_string() }))
}
