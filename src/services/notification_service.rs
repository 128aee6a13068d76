use crate::adapters::database::DbPool;
use crate::adapters::database::notification_repo::NotificationRepository;
use crate::domain::notification::Notification;
use crate::domain::realtime::{RealtimeEvent, Topic};
use crate::error::{AppError, Result};
use crate::services::realtime::EventBus;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// The per-user inbox of notifications created by message sends.
#[derive(Clone, Debug)]
pub struct NotificationService {
    pool: DbPool,
    repo: NotificationRepository,
    bus: Arc<dyn EventBus>,
    list_limit: i64,
}

impl NotificationService {
    #[must_use]
    pub fn new(pool: DbPool, repo: NotificationRepository, bus: Arc<dyn EventBus>, list_limit: i64) -> Self {
        Self { pool, repo, bus, list_limit }
    }

    /// # Errors
    /// Returns `AppError::Database` if the store is unavailable.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let mut conn = self.pool.acquire().await?;
        self.repo.list_for_user(&mut conn, user_id, self.list_limit).await
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the notification does not belong to the user.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<Notification> {
        let mut conn = self.pool.acquire().await?;
        self.repo.mark_read(&mut conn, notification_id, user_id).await?.ok_or(AppError::NotFound)
    }

    /// Returns how many notifications were flipped.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the store is unavailable.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        let count = self.repo.mark_all_read(&mut conn, user_id).await?;
        tracing::debug!(count, "Notifications marked read");
        Ok(count)
    }

    #[must_use]
    pub fn subscribe(&self, user_id: Uuid) -> broadcast::Receiver<RealtimeEvent> {
        self.bus.subscribe(Topic::Notifications(user_id))
    }
}
