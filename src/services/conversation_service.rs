use crate::adapters::database::DbPool;
use crate::adapters::database::conversation_repo::ConversationRepository;
use crate::adapters::database::message_repo::{MessageRepository, NewMessage};
use crate::adapters::database::notification_repo::NotificationRepository;
use crate::adapters::database::profile_repo::ProfileRepository;
use crate::config::ChatConfig;
use crate::domain::conversation::{Conversation, ConversationStatus, Role};
use crate::domain::message::{Message, MessageBody, MessageKind};
use crate::domain::notification::NewNotification;
use crate::domain::realtime::{ChangeKind, RealtimeEvent, Topic};
use crate::domain::summary::{ConversationView, ProductSummary, UserSummary};
use crate::error::{AppError, DeliveryStep, Result};
use crate::services::attachment_service::AttachmentService;
use crate::services::realtime::{EventBus, publish_all};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use sqlx::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) created_total: Counter<u64>,
    pub(crate) sent_total: Counter<u64>,
    pub(crate) partial_deliveries_total: Counter<u64>,
    pub(crate) marked_read_total: Counter<u64>,
    pub(crate) listed_size: Histogram<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("bazaar-server");
        Self {
            created_total: meter
                .u64_counter("bazaar_conversations_created_total")
                .with_description("Conversations created by get-or-create")
                .build(),
            sent_total: meter
                .u64_counter("bazaar_messages_sent_total")
                .with_description("Message send attempts by outcome")
                .build(),
            partial_deliveries_total: meter
                .u64_counter("bazaar_messages_partial_deliveries_total")
                .with_description("Sends whose message was stored but a later step failed")
                .build(),
            marked_read_total: meter
                .u64_counter("bazaar_messages_marked_read_total")
                .with_description("Messages flipped to read")
                .build(),
            listed_size: meter
                .u64_histogram("bazaar_conversation_list_size")
                .with_description("Number of conversations returned by a single listing")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConversationService {
    pool: DbPool,
    repo: ConversationRepository,
    message_repo: MessageRepository,
    notification_repo: NotificationRepository,
    profile_repo: ProfileRepository,
    attachments: AttachmentService,
    bus: Arc<dyn EventBus>,
    config: ChatConfig,
    shutdown: watch::Receiver<bool>,
    metrics: Metrics,
}

impl ConversationService {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        repo: ConversationRepository,
        message_repo: MessageRepository,
        notification_repo: NotificationRepository,
        profile_repo: ProfileRepository,
        attachments: AttachmentService,
        bus: Arc<dyn EventBus>,
        config: ChatConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            repo,
            message_repo,
            notification_repo,
            profile_repo,
            attachments,
            bus,
            config,
            shutdown,
            metrics: Metrics::new(),
        }
    }

    /// Returns the conversation for the triple, creating it if it does not exist yet.
    ///
    /// An existing conversation is returned untouched. Concurrent callers for the same
    /// triple all end up with the same row: the loser of the insert race re-reads it.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if buyer and seller are the same user.
    /// Returns `AppError::NotFound` if a participant or the product does not exist.
    /// Returns `AppError::Database` if the store is unavailable.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn get_or_create(&self, buyer_id: Uuid, seller_id: Uuid, product_id: Uuid) -> Result<Conversation> {
        if buyer_id == seller_id {
            return Err(AppError::BadRequest("Buyer and seller must be different users".into()));
        }

        let mut conn = self.pool.acquire().await?;
        if let Some(existing) = self.repo.find_by_triple(&mut conn, buyer_id, seller_id, product_id).await? {
            return Ok(existing);
        }

        match self.repo.create(&mut conn, buyer_id, seller_id, product_id).await {
            Ok(conversation) => {
                tracing::info!(conversation_id = %conversation.id, "Conversation created");
                self.metrics.created_total.add(1, &[]);
                self.publish_change(ChangeKind::Created, &conversation).await;
                Ok(conversation)
            }
            Err(AppError::Conflict(_)) => {
                tracing::debug!("Lost creation race, re-reading conversation");
                self.repo.find_by_triple(&mut conn, buyer_id, seller_id, product_id).await?.ok_or(AppError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Fetches a conversation the user takes part in. Strangers get `NotFound`.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if it does not exist or the user is not a participant.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn get_conversation(&self, conversation_id: Uuid, user_id: Uuid) -> Result<Conversation> {
        let mut conn = self.pool.acquire().await?;
        self.repo
            .find_by_id(&mut conn, conversation_id)
            .await?
            .filter(|c| c.is_participant(user_id))
            .ok_or(AppError::NotFound)
    }

    /// Appends a message and runs the follow-up bookkeeping.
    ///
    /// The image (if any) is stored before the message row, so a failed upload leaves
    /// nothing behind. Once the row exists it is never rolled back: the first failing
    /// follow-up step is reported as `AppError::PartialDelivery`.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if the body or the participant pair is invalid.
    /// Returns `AppError::NotFound` if the conversation does not exist.
    /// Returns `AppError::Upload` if the image cannot be stored.
    /// Returns `AppError::PartialDelivery` if a step after the insert fails.
    #[tracing::instrument(
        err(level = "warn"),
        skip(self, body),
        fields(has_image = body.image.is_some(), message_id = tracing::field::Empty)
    )]
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        receiver_id: Uuid,
        body: MessageBody,
    ) -> Result<Message> {
        let conversation = {
            let mut conn = self.pool.acquire().await?;
            self.repo.find_by_id(&mut conn, conversation_id).await?.ok_or(AppError::NotFound)?
        };
        let receiver_role = conversation.receiver_role(sender_id, receiver_id)?;
        body.validate(self.config.max_message_chars, self.config.max_image_bytes)?;

        // 1. Image first; nothing is written if it fails.
        let image_url = match &body.image {
            Some(image) => Some(self.attachments.upload_image(conversation_id, image).await.inspect_err(|_| {
                self.metrics.sent_total.add(1, &[KeyValue::new("status", "upload_failed")]);
            })?),
            None => None,
        };

        // 2. The message row.
        let mut conn = self.pool.acquire().await?;
        let kind = if image_url.is_some() { MessageKind::Image } else { MessageKind::Text };
        let message = self
            .message_repo
            .create(
                &mut conn,
                NewMessage {
                    conversation_id,
                    sender_id,
                    receiver_id,
                    body: &body.text,
                    kind,
                    image_url: image_url.as_deref(),
                },
            )
            .await
            .inspect_err(|_| {
                self.metrics.sent_total.add(1, &[KeyValue::new("status", "failure")]);
            })?;

        tracing::Span::current().record("message_id", tracing::field::display(message.id));
        self.bus
            .publish(Topic::Conversation(conversation_id), RealtimeEvent::MessageInserted { message: message.clone() })
            .await;

        if let Err(e) = self.deliver(&mut conn, &message, receiver_role, &body).await {
            self.metrics.sent_total.add(1, &[KeyValue::new("status", "partial")]);
            if let AppError::PartialDelivery { step, .. } = &e {
                self.metrics.partial_deliveries_total.add(1, &[KeyValue::new("step", step.as_str())]);
            }
            return Err(e);
        }

        self.metrics.sent_total.add(1, &[KeyValue::new("status", "success")]);
        Ok(message)
    }

    /// Steps 3 to 5 of a send. Stops at the first failure.
    async fn deliver(
        &self,
        conn: &mut sqlx::PgConnection,
        message: &Message,
        receiver_role: Role,
        body: &MessageBody,
    ) -> Result<()> {
        // 3. Snapshot; an older timestamp never overwrites a newer one.
        self.repo
            .update_snapshot(conn, message.conversation_id, &body.snapshot_text(), message.created_at)
            .await
            .map_err(|e| AppError::partial(message.id, DeliveryStep::Snapshot, &e))?;

        // 4. Receiver's unread counter, recounted under the conversation row lock so it
        // cannot drift from concurrent read-marking.
        let updated = self
            .refresh_unread(conn, message.conversation_id, receiver_role)
            .await
            .map_err(|e| AppError::partial(message.id, DeliveryStep::UnreadCounter, &e))?;
        self.publish_change(ChangeKind::Updated, &updated).await;

        // 5. Notification for the receiver.
        let notification = self
            .notification_repo
            .create(conn, &NewNotification::new_message(message.receiver_id, message.conversation_id, message.id))
            .await
            .map_err(|e| AppError::partial(message.id, DeliveryStep::Notification, &e))?;
        self.bus
            .publish(Topic::Notifications(message.receiver_id), RealtimeEvent::NotificationCreated { notification })
            .await;

        Ok(())
    }

    async fn refresh_unread(
        &self,
        conn: &mut sqlx::PgConnection,
        conversation_id: Uuid,
        role: Role,
    ) -> Result<Conversation> {
        let mut tx = conn.begin().await?;
        self.repo.lock(&mut *tx, conversation_id).await?.ok_or(AppError::NotFound)?;
        let updated = self.repo.refresh_unread(&mut *tx, conversation_id, role).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Lists the user's conversations, most recently updated first, with nested summaries
    /// and a preview of the latest messages.
    ///
    /// The returned counters are the ones read before any reset. When read-marking on list
    /// is enabled, every listed conversation with unread messages for the user is marked read
    /// in the background; failures there are only logged.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the store is unavailable.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationView>> {
        let mut conn = self.pool.acquire().await?;
        let conversations = self.repo.list_for_user(&mut conn, user_id).await?;
        self.metrics.listed_size.record(conversations.len() as u64, &[]);
        if conversations.is_empty() {
            return Ok(Vec::new());
        }

        let conversation_ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();
        let mut previews: HashMap<Uuid, Vec<Message>> = HashMap::new();
        for message in self
            .message_repo
            .recent_for_conversations(&mut conn, &conversation_ids, self.config.preview_messages)
            .await?
        {
            previews.entry(message.conversation_id).or_default().push(message);
        }

        let mut user_ids: Vec<Uuid> = conversations.iter().flat_map(Conversation::participants).collect();
        user_ids.sort_unstable();
        user_ids.dedup();
        let users: HashMap<Uuid, UserSummary> =
            self.profile_repo.users_by_ids(&mut conn, &user_ids).await?.into_iter().map(|u| (u.id, u)).collect();

        let mut product_ids: Vec<Uuid> = conversations.iter().map(|c| c.product_id).collect();
        product_ids.sort_unstable();
        product_ids.dedup();
        let products: HashMap<Uuid, ProductSummary> =
            self.profile_repo.products_by_ids(&mut conn, &product_ids).await?.into_iter().map(|p| (p.id, p)).collect();
        drop(conn);

        let unread: Vec<Uuid> = conversations
            .iter()
            .filter(|c| c.role_of(user_id).is_some_and(|role| c.unread_for(role) > 0))
            .map(|c| c.id)
            .collect();

        let views = conversations
            .into_iter()
            .map(|conversation| ConversationView {
                buyer: users.get(&conversation.buyer_id).cloned(),
                seller: users.get(&conversation.seller_id).cloned(),
                product: products.get(&conversation.product_id).cloned(),
                messages: previews.remove(&conversation.id).unwrap_or_default(),
                conversation,
            })
            .collect();

        if self.config.mark_read_on_list && !unread.is_empty() {
            self.spawn_mark_listed_read(user_id, unread);
        }

        Ok(views)
    }

    fn spawn_mark_listed_read(&self, user_id: Uuid, conversation_ids: Vec<Uuid>) {
        if *self.shutdown.borrow() {
            tracing::debug!("Shutting down, skipping read-marking");
            return;
        }

        let service = self.clone();
        let span = tracing::info_span!("mark_listed_read", %user_id, count = conversation_ids.len());
        tokio::spawn(
            async move {
                for conversation_id in conversation_ids {
                    if let Err(e) = service.mark_read(conversation_id, user_id).await {
                        tracing::error!(error = %e, %conversation_id, "Failed to mark listed conversation read");
                    }
                }
            }
            .instrument(span),
        );
    }

    /// Messages of a conversation in creation order. Pure read.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the store is unavailable.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let mut conn = self.pool.acquire().await?;
        self.message_repo.list_for_conversation(&mut conn, conversation_id).await
    }

    /// Like [`Self::list_messages`], restricted to participants.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the user is not a participant.
    pub async fn list_messages_for(&self, conversation_id: Uuid, user_id: Uuid) -> Result<Vec<Message>> {
        self.get_conversation(conversation_id, user_id).await?;
        self.list_messages(conversation_id).await
    }

    /// Marks the messages addressed to the user as read and brings their unread counter in
    /// line, in one transaction holding the conversation row lock. Messages committed after
    /// the flip stay unread and counted. Returns how many messages were flipped.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the user is not a participant.
    /// Returns `AppError::Database` if the store is unavailable.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn mark_read(&self, conversation_id: Uuid, user_id: Uuid) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let conversation = self.repo.lock(&mut *tx, conversation_id).await?.ok_or(AppError::NotFound)?;
        let role = conversation.role_of(user_id).ok_or(AppError::NotFound)?;

        let marked = self.message_repo.mark_read_for_receiver(&mut *tx, conversation_id, user_id).await?;
        let updated = self.repo.refresh_unread(&mut *tx, conversation_id, role).await?;
        tx.commit().await?;

        if marked > 0 {
            self.metrics.marked_read_total.add(marked, &[]);
        }
        if updated.unread_for(role) != conversation.unread_for(role) {
            self.publish_change(ChangeKind::Updated, &updated).await;
        }

        Ok(marked)
    }

    /// # Errors
    /// Returns `AppError::NotFound` if the user is not a participant.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn set_status(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        status: ConversationStatus,
    ) -> Result<Conversation> {
        self.get_conversation(conversation_id, user_id).await?;

        let mut conn = self.pool.acquire().await?;
        let updated = self.repo.set_status(&mut conn, conversation_id, status).await?.ok_or(AppError::NotFound)?;
        self.publish_change(ChangeKind::Updated, &updated).await;
        Ok(updated)
    }

    /// Deletes the conversation together with its messages.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the user is not a participant.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn delete_conversation(&self, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        self.get_conversation(conversation_id, user_id).await?;

        let mut conn = self.pool.acquire().await?;
        let deleted = self.repo.delete(&mut conn, conversation_id).await?.ok_or(AppError::NotFound)?;
        tracing::info!("Conversation deleted");
        self.publish_change(ChangeKind::Deleted, &deleted).await;
        Ok(())
    }

    /// Live feed of messages inserted into a conversation the user takes part in.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the user is not a participant.
    pub async fn subscribe_messages(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<broadcast::Receiver<RealtimeEvent>> {
        self.get_conversation(conversation_id, user_id).await?;
        Ok(self.bus.subscribe(Topic::Conversation(conversation_id)))
    }

    /// Live feed of create/update/delete events on the user's conversations.
    #[must_use]
    pub fn subscribe_conversations(&self, user_id: Uuid) -> broadcast::Receiver<RealtimeEvent> {
        self.bus.subscribe(Topic::UserConversations(user_id))
    }

    async fn publish_change(&self, change: ChangeKind, conversation: &Conversation) {
        let topics = conversation.participants().map(Topic::UserConversations);
        let event = RealtimeEvent::ConversationChanged { change, conversation: conversation.clone() };
        publish_all(self.bus.as_ref(), &topics, &event).await;
    }
}
