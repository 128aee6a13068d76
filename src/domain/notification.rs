use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NewMessage,
}

impl NotificationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NewMessage => "new_message",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new_message" => Ok(Self::NewMessage),
            other => Err(AppError::BadRequest(format!("Unknown notification kind: {other}"))),
        }
    }
}

/// Navigation reference back to the message that caused the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: Option<NotificationData>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub data: Option<NotificationData>,
}

impl NewNotification {
    #[must_use]
    pub fn new_message(receiver_id: Uuid, conversation_id: Uuid, message_id: Uuid) -> Self {
        Self {
            user_id: receiver_id,
            kind: NotificationKind::NewMessage,
            title: "New Message".to_string(),
            body: "You have a new message".to_string(),
            data: Some(NotificationData { conversation_id, message_id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_notification_references_message() {
        let (receiver, conversation, message) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let n = NewNotification::new_message(receiver, conversation, message);

        assert_eq!(n.user_id, receiver);
        assert_eq!(n.kind, NotificationKind::NewMessage);
        assert_eq!(n.data, Some(NotificationData { conversation_id: conversation, message_id: message }));
    }

    #[test]
    fn test_data_uses_snake_case_keys() {
        let data = NotificationData { conversation_id: Uuid::nil(), message_id: Uuid::nil() };
        let value = serde_json::to_value(data).expect("serialize");
        assert!(value.get("conversation_id").is_some());
        assert!(value.get("message_id").is_some());
    }
}
