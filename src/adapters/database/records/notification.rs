use crate::domain::notification::{Notification, NotificationData};
use crate::error::AppError;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct NotificationRecord {
    pub(crate) id: Uuid,
    pub(crate) user_id: Uuid,
    pub(crate) kind: String,
    pub(crate) title: String,
    pub(crate) body: String,
    pub(crate) data: Option<Json<NotificationData>>,
    pub(crate) is_read: bool,
    pub(crate) read_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
}

impl TryFrom<NotificationRecord> for Notification {
    type Error = AppError;

    fn try_from(record: NotificationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: record.id,
            user_id: record.user_id,
            kind: record.kind.parse()?,
            title: record.title,
            body: record.body,
            data: record.data.map(|Json(data)| data),
            is_read: record.is_read,
            read_at: record.read_at,
            created_at: record.created_at,
        })
    }
}
