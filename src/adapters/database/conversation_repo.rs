use crate::adapters::database::records::ConversationRecord;
use crate::domain::conversation::{Conversation, ConversationStatus, Role};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

#[derive(Clone, Debug, Default)]
pub struct ConversationRepository {}

impl ConversationRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Looks up the conversation for a (buyer, seller, product) triple.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_triple(
        &self,
        conn: &mut PgConnection,
        buyer_id: Uuid,
        seller_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, buyer_id, seller_id, product_id, last_message, last_message_at,
                   buyer_unread_count, seller_unread_count, status, created_at, updated_at
            FROM conversations
            WHERE buyer_id = $1 AND seller_id = $2 AND product_id = $3
            "#,
        )
        .bind(buyer_id)
        .bind(seller_id)
        .bind(product_id)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn find_by_id(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, buyer_id, seller_id, product_id, last_message, last_message_at,
                   buyer_unread_count, seller_unread_count, status, created_at, updated_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    /// Inserts a fresh conversation with both unread counters at zero.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` if the triple already exists.
    /// Returns `AppError::NotFound` if a participant or the product does not exist.
    /// Returns `AppError::BadRequest` if buyer and seller are the same user.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn create(
        &self,
        conn: &mut PgConnection,
        buyer_id: Uuid,
        seller_id: Uuid,
        product_id: Uuid,
    ) -> Result<Conversation> {
        let result = sqlx::query_as::<_, ConversationRecord>(
            r#"
            INSERT INTO conversations (buyer_id, seller_id, product_id, buyer_unread_count, seller_unread_count, status)
            VALUES ($1, $2, $3, 0, 0, 'active')
            RETURNING id, buyer_id, seller_id, product_id, last_message, last_message_at,
                      buyer_unread_count, seller_unread_count, status, created_at, updated_at
            "#,
        )
        .bind(buyer_id)
        .bind(seller_id)
        .bind(product_id)
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => record.try_into(),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(AppError::Conflict("Conversation already exists".into()))
            }
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
                Err(AppError::NotFound)
            }
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(CHECK_VIOLATION) => {
                Err(AppError::BadRequest("Buyer and seller must be different users".into()))
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// Records the latest message text and time, unless a newer snapshot is already stored.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn, text))]
    pub(crate) async fn update_snapshot(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        text: &str,
        at: OffsetDateTime,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET last_message = $2, last_message_at = $3
            WHERE id = $1 AND (last_message_at IS NULL OR last_message_at <= $3)
            "#,
        )
        .bind(id)
        .bind(text)
        .bind(at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Locks the conversation row until the surrounding transaction ends.
    ///
    /// Counter updates take this lock first so the statements after it see every
    /// message write committed by the previous holder.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn lock(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, buyer_id, seller_id, product_id, last_message, last_message_at,
                   buyer_unread_count, seller_unread_count, status, created_at, updated_at
            FROM conversations
            WHERE id = $1
            FOR NO KEY UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    /// Sets the role's unread counter to the number of messages still unread by that
    /// participant. Must run after [`Self::lock`] in the same transaction.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the conversation no longer exists.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn refresh_unread(&self, conn: &mut PgConnection, id: Uuid, role: Role) -> Result<Conversation> {
        let sql = match role {
            Role::Buyer => {
                r#"
                UPDATE conversations c SET buyer_unread_count = (
                    SELECT COUNT(*)::int FROM messages m
                    WHERE m.conversation_id = c.id AND m.receiver_id = c.buyer_id AND NOT m.is_read
                )
                WHERE c.id = $1
                RETURNING id, buyer_id, seller_id, product_id, last_message, last_message_at,
                          buyer_unread_count, seller_unread_count, status, created_at, updated_at
                "#
            }
            Role::Seller => {
                r#"
                UPDATE conversations c SET seller_unread_count = (
                    SELECT COUNT(*)::int FROM messages m
                    WHERE m.conversation_id = c.id AND m.receiver_id = c.seller_id AND NOT m.is_read
                )
                WHERE c.id = $1
                RETURNING id, buyer_id, seller_id, product_id, last_message, last_message_at,
                          buyer_unread_count, seller_unread_count, status, created_at, updated_at
                "#
            }
        };

        let record =
            sqlx::query_as::<_, ConversationRecord>(sql).bind(id).fetch_optional(conn).await?.ok_or(AppError::NotFound)?;

        record.try_into()
    }

    /// Conversations where the user is buyer or seller, most recently updated first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn list_for_user(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<Vec<Conversation>> {
        let records = sqlx::query_as::<_, ConversationRecord>(
            r#"
            SELECT id, buyer_id, seller_id, product_id, last_message, last_message_at,
                   buyer_unread_count, seller_unread_count, status, created_at, updated_at
            FROM conversations
            WHERE buyer_id = $1 OR seller_id = $1
            ORDER BY updated_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(conn)
        .await?;

        records.into_iter().map(TryInto::try_into).collect()
    }

    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn set_status(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        status: ConversationStatus,
    ) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            UPDATE conversations SET status = $2
            WHERE id = $1
            RETURNING id, buyer_id, seller_id, product_id, last_message, last_message_at,
                      buyer_unread_count, seller_unread_count, status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    /// Deletes a conversation; its messages go with it through the cascade.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the deletion fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn delete(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<Conversation>> {
        let record = sqlx::query_as::<_, ConversationRecord>(
            r#"
            DELETE FROM conversations
            WHERE id = $1
            RETURNING id, buyer_id, seller_id, product_id, last_message, last_message_at,
                      buyer_unread_count, seller_unread_count, status, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }
}
