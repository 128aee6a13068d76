use crate::domain::conversation::Conversation;
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct ConversationRecord {
    pub(crate) id: Uuid,
    pub(crate) buyer_id: Uuid,
    pub(crate) seller_id: Uuid,
    pub(crate) product_id: Uuid,
    pub(crate) last_message: Option<String>,
    pub(crate) last_message_at: Option<OffsetDateTime>,
    pub(crate) buyer_unread_count: i32,
    pub(crate) seller_unread_count: i32,
    pub(crate) status: String,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl TryFrom<ConversationRecord> for Conversation {
    type Error = AppError;

    fn try_from(record: ConversationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            buyer_id: record.buyer_id,
            seller_id: record.seller_id,
            product_id: record.product_id,
            last_message: record.last_message,
            last_message_at: record.last_message_at,
            buyer_unread_count: record.buyer_unread_count,
            seller_unread_count: record.seller_unread_count,
            status: record.status.parse()?,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}
