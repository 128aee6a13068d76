use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Archived,
}

impl ConversationStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for ConversationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "archived" => Ok(Self::Archived),
            other => Err(AppError::BadRequest(format!("Unknown conversation status: {other}"))),
        }
    }
}

/// Which side of the conversation a user is on. Each role owns its own unread counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Buyer,
    Seller,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub product_id: Uuid,
    pub last_message: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    pub buyer_unread_count: i32,
    pub seller_unread_count: i32,
    pub status: ConversationStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Conversation {
    #[must_use]
    pub fn role_of(&self, user_id: Uuid) -> Option<Role> {
        if user_id == self.buyer_id {
            Some(Role::Buyer)
        } else if user_id == self.seller_id {
            Some(Role::Seller)
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.role_of(user_id).is_some()
    }

    /// The other participant, if `user_id` is one of the pair.
    #[must_use]
    pub fn counterpart_of(&self, user_id: Uuid) -> Option<Uuid> {
        match self.role_of(user_id)? {
            Role::Buyer => Some(self.seller_id),
            Role::Seller => Some(self.buyer_id),
        }
    }

    #[must_use]
    pub const fn unread_for(&self, role: Role) -> i32 {
        match role {
            Role::Buyer => self.buyer_unread_count,
            Role::Seller => self.seller_unread_count,
        }
    }

    #[must_use]
    pub const fn participants(&self) -> [Uuid; 2] {
        [self.buyer_id, self.seller_id]
    }

    /// Checks that `receiver` is the counterpart of `sender` and returns the receiver's role.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the pair is not this conversation's buyer and seller.
    pub fn receiver_role(&self, sender_id: Uuid, receiver_id: Uuid) -> Result<Role> {
        match self.counterpart_of(sender_id) {
            Some(counterpart) if counterpart == receiver_id => {
                self.role_of(receiver_id).ok_or_else(|| AppError::BadRequest("Receiver is not a participant".into()))
            }
            Some(_) => Err(AppError::BadRequest("Receiver must be the other participant".into())),
            None => Err(AppError::BadRequest("Sender is not a participant".into())),
        }
    }
}
