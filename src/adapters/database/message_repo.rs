use crate::adapters::database::records::MessageRecord;
use crate::domain::message::{Message, MessageKind};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub(crate) struct NewMessage<'a> {
    pub(crate) conversation_id: Uuid,
    pub(crate) sender_id: Uuid,
    pub(crate) receiver_id: Uuid,
    pub(crate) body: &'a str,
    pub(crate) kind: MessageKind,
    pub(crate) image_url: Option<&'a str>,
}

#[derive(Clone, Debug, Default)]
pub struct MessageRepository {}

impl MessageRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Records a new, unread message.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation or a participant does not exist.
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, message), fields(conversation_id = %message.conversation_id))]
    pub(crate) async fn create(&self, conn: &mut PgConnection, message: NewMessage<'_>) -> Result<Message> {
        let result = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (conversation_id, sender_id, receiver_id, body, kind, image_url, is_read)
            VALUES ($1, $2, $3, $4, $5, $6, false)
            RETURNING id, conversation_id, sender_id, receiver_id, body, kind, image_url, is_read, read_at, created_at
            "#,
        )
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(message.body)
        .bind(message.kind.as_str())
        .bind(message.image_url)
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => record.try_into(),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23503") => {
                // Foreign key violation: the conversation was deleted in the meantime
                Err(AppError::NotFound)
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// All messages of a conversation in creation order.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn list_for_conversation(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
    ) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, conversation_id, sender_id, receiver_id, body, kind, image_url, is_read, read_at, created_at
            FROM messages
            WHERE conversation_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(conn)
        .await?;

        records.into_iter().map(TryInto::try_into).collect()
    }

    /// The newest `per_conversation` messages of each conversation, returned oldest first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, conversation_ids), fields(count = conversation_ids.len()))]
    pub(crate) async fn recent_for_conversations(
        &self,
        conn: &mut PgConnection,
        conversation_ids: &[Uuid],
        per_conversation: i64,
    ) -> Result<Vec<Message>> {
        if conversation_ids.is_empty() || per_conversation <= 0 {
            return Ok(Vec::new());
        }

        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, conversation_id, sender_id, receiver_id, body, kind, image_url, is_read, read_at, created_at
            FROM (
                SELECT m.*, ROW_NUMBER() OVER (PARTITION BY conversation_id ORDER BY created_at DESC, id DESC) AS rn
                FROM messages m
                WHERE conversation_id = ANY($1)
            ) t
            WHERE t.rn <= $2
            ORDER BY conversation_id, created_at ASC, id ASC
            "#,
        )
        .bind(conversation_ids)
        .bind(per_conversation)
        .fetch_all(conn)
        .await?;

        records.into_iter().map(TryInto::try_into).collect()
    }

    /// Flags every unread message addressed to `receiver_id` in the conversation as read.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn mark_read_for_receiver(
        &self,
        conn: &mut PgConnection,
        conversation_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = true, read_at = NOW()
            WHERE conversation_id = $1 AND receiver_id = $2 AND is_read = false
            "#,
        )
        .bind(conversation_id)
        .bind(receiver_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}
