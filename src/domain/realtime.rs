use crate::domain::conversation::Conversation;
use crate::domain::message::Message;
use crate::domain::notification::Notification;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An observable stream. Each maps to one pub/sub channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Messages inserted into one conversation.
    Conversation(Uuid),
    /// Create/update/delete of any conversation the user takes part in.
    UserConversations(Uuid),
    /// Notifications created for the user.
    Notifications(Uuid),
}

impl Topic {
    /// Parses the suffix produced by `Display`, i.e. a channel name without its prefix.
    #[must_use]
    pub fn parse(suffix: &str) -> Option<Self> {
        let (kind, id) = suffix.split_once(':')?;
        let id = Uuid::parse_str(id).ok()?;
        match kind {
            "conversation" => Some(Self::Conversation(id)),
            "user" => Some(Self::UserConversations(id)),
            "notifications" => Some(Self::Notifications(id)),
            _ => None,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conversation(id) => write!(f, "conversation:{id}"),
            Self::UserConversations(id) => write!(f, "user:{id}"),
            Self::Notifications(id) => write!(f, "notifications:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealtimeEvent {
    MessageInserted { message: Message },
    ConversationChanged { change: ChangeKind, conversation: Conversation },
    NotificationCreated { notification: Notification },
}
