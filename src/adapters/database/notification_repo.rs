use crate::adapters::database::records::NotificationRecord;
use crate::domain::notification::{NewNotification, Notification};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use sqlx::types::Json;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct NotificationRepository {}

impl NotificationRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the owning user does not exist.
    /// Returns `AppError::Database` if the insert fails.
    #[tracing::instrument(level = "debug", skip(self, conn, notification), fields(user_id = %notification.user_id))]
    pub(crate) async fn create(&self, conn: &mut PgConnection, notification: &NewNotification) -> Result<Notification> {
        let result = sqlx::query_as::<_, NotificationRecord>(
            r#"
            INSERT INTO notifications (user_id, kind, title, body, data)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, kind, title, body, data, is_read, read_at, created_at
            "#,
        )
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(notification.data.map(Json))
        .fetch_one(conn)
        .await;

        match result {
            Ok(record) => record.try_into(),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some("23503") => Err(AppError::NotFound),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// Newest first.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn list_for_user(
        &self,
        conn: &mut PgConnection,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            r#"
            SELECT id, user_id, kind, title, body, data, is_read, read_at, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(conn)
        .await?;

        records.into_iter().map(TryInto::try_into).collect()
    }

    /// Marks one of the user's notifications read. The first read time is kept on repeat calls.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn mark_read(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Notification>> {
        let record = sqlx::query_as::<_, NotificationRecord>(
            r#"
            UPDATE notifications
            SET is_read = true, read_at = COALESCE(read_at, NOW())
            WHERE id = $1 AND user_id = $2
            RETURNING id, user_id, kind, title, body, data, is_read, read_at, created_at
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        record.map(TryInto::try_into).transpose()
    }

    /// # Errors
    /// Returns `AppError::Database` if the update fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub(crate) async fn mark_all_read(&self, conn: &mut PgConnection, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true, read_at = NOW() WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}
