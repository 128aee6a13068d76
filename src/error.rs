use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// The steps of a message send that run after the message row is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStep {
    Snapshot,
    UnreadCounter,
    Notification,
}

impl DeliveryStep {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::UnreadCounter => "unread_counter",
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for DeliveryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Authentication failed")]
    AuthError,
    #[error("Not found")]
    NotFound,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Image upload failed: {0}")]
    Upload(String),
    #[error("Message {message_id} stored but {step} update failed: {reason}")]
    PartialDelivery { message_id: Uuid, step: DeliveryStep, reason: String },
    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Wraps a failure of a post-insert send step, keeping the committed message id.
    #[must_use]
    pub fn partial(message_id: Uuid, step: DeliveryStep, source: &Self) -> Self {
        Self::PartialDelivery { message_id, step, reason: source.to_string() }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": "Backing store unavailable" }))
            }
            Self::AuthError => {
                tracing::debug!("Authentication failed");
                (StatusCode::UNAUTHORIZED, json!({ "error": "Unauthorized" }))
            }
            Self::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, json!({ "error": "Not found" }))
            }
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            Self::Conflict(msg) => {
                tracing::debug!(message = %msg, "Conflict");
                (StatusCode::CONFLICT, json!({ "error": msg }))
            }
            Self::Upload(msg) => {
                tracing::warn!(message = %msg, "Image upload failed");
                (StatusCode::BAD_GATEWAY, json!({ "error": "Image upload failed" }))
            }
            Self::PartialDelivery { message_id, step, reason } => {
                tracing::error!(%message_id, %step, %reason, "Message delivered partially");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({
                        "error": "Message stored but delivery did not complete",
                        "messageId": message_id,
                        "failedStep": step.as_str(),
                    }),
                )
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal server error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}
