use crate::error::{AppError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

/// Snapshot text recorded on a conversation when the latest message has no text.
pub const IMAGE_SNAPSHOT: &str = "[image]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
}

impl MessageKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl FromStr for MessageKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            other => Err(AppError::BadRequest(format!("Unknown message kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub body: String,
    pub kind: MessageKind,
    pub image_url: Option<String>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl ImageUpload {
    /// Lower-cased extension of the original file name, `bin` when there is none.
    #[must_use]
    pub fn extension(&self) -> String {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map_or_else(|| "bin".to_string(), str::to_ascii_lowercase)
    }
}

/// What a sender submits: text, an image, or both.
#[derive(Debug, Clone, Default)]
pub struct MessageBody {
    pub text: String,
    pub image: Option<ImageUpload>,
}

impl MessageBody {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into(), image: None }
    }

    #[must_use]
    pub fn with_image(mut self, image: ImageUpload) -> Self {
        self.image = Some(image);
        self
    }

    /// # Errors
    /// Returns `AppError::BadRequest` for an empty body or one over the configured limits.
    pub fn validate(&self, max_chars: usize, max_image_bytes: usize) -> Result<()> {
        if self.text.trim().is_empty() && self.image.is_none() {
            return Err(AppError::BadRequest("Message must contain text or an image".into()));
        }
        if self.text.chars().count() > max_chars {
            return Err(AppError::BadRequest(format!("Message exceeds {max_chars} characters")));
        }
        if let Some(image) = &self.image {
            if image.data.is_empty() {
                return Err(AppError::BadRequest("Image is empty".into()));
            }
            if image.data.len() > max_image_bytes {
                return Err(AppError::BadRequest("Image too large".into()));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn snapshot_text(&self) -> String {
        if self.text.trim().is_empty() { IMAGE_SNAPSHOT.to_string() } else { self.text.clone() }
    }
}
