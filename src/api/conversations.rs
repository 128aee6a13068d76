use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::conversations::{
    CreateConversationRequest, MarkReadResponse, SendMessageRequest, UpdateConversationRequest,
};
use crate::domain::message::MessageBody;
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

pub async fn create_conversation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse> {
    let conversation =
        state.conversation_service.get_or_create(auth_user.user_id, payload.seller_id, payload.product_id).await?;
    Ok(Json(conversation))
}

pub async fn list_conversations(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let views = state.conversation_service.list_conversations(auth_user.user_id).await?;
    Ok(Json(views))
}

pub async fn get_conversation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let conversation = state.conversation_service.get_conversation(id, auth_user.user_id).await?;
    Ok(Json(conversation))
}

pub async fn update_conversation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateConversationRequest>,
) -> Result<impl IntoResponse> {
    let conversation = state.conversation_service.set_status(id, auth_user.user_id, payload.status).await?;
    Ok(Json(conversation))
}

pub async fn delete_conversation(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.conversation_service.delete_conversation(id, auth_user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_messages(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let messages = state.conversation_service.list_messages_for(id, auth_user.user_id).await?;
    Ok(Json(messages))
}

/// Sends to the caller's counterpart in the conversation.
pub async fn send_message(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let body = MessageBody::try_from(payload)?;
    let conversation = state.conversation_service.get_conversation(id, auth_user.user_id).await?;
    let receiver_id = conversation.counterpart_of(auth_user.user_id).ok_or(AppError::NotFound)?;

    let message = state.conversation_service.send_message(id, auth_user.user_id, receiver_id, body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let marked = state.conversation_service.mark_read(id, auth_user.user_id).await?;
    Ok(Json(MarkReadResponse { marked }))
}
