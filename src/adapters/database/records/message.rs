use crate::domain::message::Message;
use crate::error::AppError;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) conversation_id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) receiver_id: Uuid,
    pub(crate) body: String,
    pub(crate) kind: String,
    pub(crate) image_url: Option<String>,
    pub(crate) is_read: bool,
    pub(crate) read_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<MessageRecord> for Message {
    type Error = AppError;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            conversation_id: record.conversation_id,
            sender_id: record.sender_id,
            receiver_id: record.receiver_id,
            body: record.body,
            kind: record.kind.parse()?,
            image_url: record.image_url,
            is_read: record.is_read,
            read_at: record.read_at,
            created_at: record.created_at,
        })
    }
}
