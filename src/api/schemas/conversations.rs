use crate::domain::conversation::ConversationStatus;
use crate::domain::message::{ImageUpload, MessageBody};
use crate::error::AppError;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opens a conversation with the caller as buyer.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    pub seller_id: Uuid,
    pub product_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConversationRequest {
    pub status: ConversationStatus,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub file_name: String,
    pub content_type: Option<String>,
    /// Standard base64.
    pub data: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: String,
    pub image: Option<ImagePayload>,
}

impl TryFrom<SendMessageRequest> for MessageBody {
    type Error = AppError;

    fn try_from(request: SendMessageRequest) -> Result<Self, Self::Error> {
        let image = request
            .image
            .map(|image| {
                let data = STANDARD
                    .decode(image.data.as_bytes())
                    .map_err(|_| AppError::BadRequest("Image data is not valid base64".into()))?;
                Ok::<_, AppError>(ImageUpload {
                    file_name: image.file_name,
                    content_type: image.content_type,
                    data: Bytes::from(data),
                })
            })
            .transpose()?;

        Ok(Self { text: request.text, image })
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub marked: u64,
}
