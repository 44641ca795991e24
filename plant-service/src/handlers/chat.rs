use crate::dtos::{ChatRequest, ChatResponse};
use crate::startup::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

/// `POST /chat/text`
pub async fn chat_text(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = payload
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid JSON body: {}", e)))?;

    request
        .validate()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Validation error: {}", e)))?;

    let text = request.text.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("text is required")));
    }

    let reply = state.chat.reply(text, request.room_id.as_deref()).await;
    Ok(Json(ChatResponse { reply }))
}
