use crate::api::AppState;
use crate::api::middleware::AuthUser;
use crate::api::schemas::notifications::MarkAllReadResponse;
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

pub async fn list_notifications(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let notifications = state.notification_service.list(auth_user.user_id).await?;
    Ok(Json(notifications))
}

pub async fn mark_notification_read(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let notification = state.notification_service.mark_read(id, auth_user.user_id).await?;
    Ok(Json(notification))
}

pub async fn mark_all_read(auth_user: AuthUser, State(state): State<AppState>) -> Result<impl IntoResponse> {
    let updated = state.notification_service.mark_all_read(auth_user.user_id).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}
