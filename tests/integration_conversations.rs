#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, clippy::similar_names, unreachable_pub)]
mod common;

use bazaar_server::domain::conversation::ConversationStatus;
use bazaar_server::domain::message::MessageBody;
use bazaar_server::error::AppError;
use common::TestServices;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn test_get_or_create_returns_existing_untouched() {
    let services = TestServices::new().await;
    let (buyer, seller, product) = common::create_parties(&services.pool).await;

    let created = services.conversations.get_or_create(buyer, seller, product).await.unwrap();
    assert_eq!(created.buyer_unread_count, 0);
    assert_eq!(created.seller_unread_count, 0);
    assert_eq!(created.status, ConversationStatus::Active);

    services.conversations.send_message(created.id, buyer, seller, MessageBody::text("hello")).await.unwrap();

    let again = services.conversations.get_or_create(buyer, seller, product).await.unwrap();
    assert_eq!(again.id, created.id);
    assert_eq!(again.seller_unread_count, 1, "an existing conversation must not be reset");
}

#[tokio::test]
async fn test_concurrent_get_or_create_yields_single_row() {
    let services = TestServices::new().await;
    let (buyer, seller, product) = common::create_parties(&services.pool).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let svc = services.conversations.clone();
        handles.push(tokio::spawn(async move { svc.get_or_create(buyer, seller, product).await }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "all callers must observe the same conversation");

    let rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM conversations WHERE buyer_id = $1 AND seller_id = $2 AND product_id = $3",
    )
    .bind(buyer)
    .bind(seller)
    .bind(product)
    .fetch_one(&services.pool)
    .await
    .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_get_or_create_rejects_invalid_parties() {
    let services = TestServices::new().await;
    let (buyer, seller, product) = common::create_parties(&services.pool).await;

    let same = services.conversations.get_or_create(seller, seller, product).await;
    assert!(matches!(same, Err(AppError::BadRequest(_))));

    let unknown_product = services.conversations.get_or_create(buyer, seller, Uuid::new_v4()).await;
    assert!(matches!(unknown_product, Err(AppError::NotFound)));

    let unknown_buyer = services.conversations.get_or_create(Uuid::new_v4(), seller, product).await;
    assert!(matches!(unknown_buyer, Err(AppError::NotFound)));
}

#[tokio::test]
async fn test_buyer_seller_product_scenario() {
    let services = TestServices::new().await;
    let (buyer, seller, product) = common::create_parties(&services.pool).await;
    let svc = &services.conversations;

    let conversation = svc.get_or_create(buyer, seller, product).await.unwrap();
    assert_eq!((conversation.buyer_unread_count, conversation.seller_unread_count), (0, 0));

    svc.send_message(conversation.id, buyer, seller, MessageBody::text("hello")).await.unwrap();
    let after_first = svc.get_conversation(conversation.id, buyer).await.unwrap();
    assert_eq!(after_first.seller_unread_count, 1);
    assert_eq!(after_first.buyer_unread_count, 0);

    svc.send_message(conversation.id, seller, buyer, MessageBody::text("hi back")).await.unwrap();
    let after_reply = svc.get_conversation(conversation.id, buyer).await.unwrap();
    assert_eq!(after_reply.buyer_unread_count, 1);
    assert_eq!(after_reply.seller_unread_count, 1);
    assert_eq!(after_reply.last_message.as_deref(), Some("hi back"));

    let listed = svc.list_conversations(buyer).await.unwrap();
    let view = listed.iter().find(|v| v.conversation.id == conversation.id).unwrap();
    assert_eq!(view.conversation.buyer_unread_count, 1, "listing reflects pre-reset counts");

    let conversation_id = conversation.id;
    let reset = common::eventually(Duration::from_secs(5), || async move {
        let c = svc.get_conversation(conversation_id, buyer).await.unwrap();
        c.buyer_unread_count == 0
    })
    .await;
    assert!(reset, "buyer counter should be reset after listing");

    let messages = svc.list_messages(conversation.id).await.unwrap();
    let reply = messages.iter().find(|m| m.sender_id == seller).unwrap();
    assert!(reply.is_read);
    assert!(reply.read_at.is_some());
    let hello = messages.iter().find(|m| m.sender_id == buyer).unwrap();
    assert!(!hello.is_read, "the seller has not read anything yet");

    let c = svc.get_conversation(conversation.id, seller).await.unwrap();
    assert_eq!(c.seller_unread_count, 1);
}

#[tokio::test]
async fn test_list_conversations_only_returns_participant_rows() {
    let services = TestServices::new().await;
    let (buyer, seller, product) = common::create_parties(&services.pool).await;
    let stranger = common::create_user(&services.pool, "Sid Stranger").await;
    let other_product = common::create_product(&services.pool, stranger, "Lamp").await;

    let mine = services.conversations.get_or_create(buyer, seller, product).await.unwrap();
    let theirs = services.conversations.get_or_create(buyer, stranger, other_product).await.unwrap();

    let seller_view = services.conversations.list_conversations(seller).await.unwrap();
    assert_eq!(seller_view.len(), 1);
    assert_eq!(seller_view[0].conversation.id, mine.id);
    for view in &seller_view {
        assert!(view.conversation.buyer_id == seller || view.conversation.seller_id == seller);
    }

    let buyer_view = services.conversations.list_conversations(buyer).await.unwrap();
    let ids: Vec<Uuid> = buyer_view.iter().map(|v| v.conversation.id).collect();
    assert!(ids.contains(&mine.id));
    assert!(ids.contains(&theirs.id));

    let lonely = common::create_user(&services.pool, "Nobody").await;
    assert!(services.conversations.list_conversations(lonely).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_conversations_nests_summaries_and_preview() {
    let mut config = common::get_test_config();
    config.chat.preview_messages = 2;
    config.chat.mark_read_on_list = false;
    let services = TestServices::with(config, std::sync::Arc::new(common::MemoryStorage::default())).await;
    let (buyer, seller, product) = common::create_parties(&services.pool).await;

    let conversation = services.conversations.get_or_create(buyer, seller, product).await.unwrap();
    for text in ["one", "two", "three"] {
        services.conversations.send_message(conversation.id, buyer, seller, MessageBody::text(text)).await.unwrap();
    }

    let views = services.conversations.list_conversations(seller).await.unwrap();
    let view = &views[0];
    assert_eq!(view.buyer.as_ref().unwrap().full_name, "Bea Buyer");
    assert_eq!(view.seller.as_ref().unwrap().full_name, "Sam Seller");
    let summary = view.product.as_ref().unwrap();
    assert_eq!(summary.name, "Road bike");
    assert!((summary.price - 149.5).abs() < f64::EPSILON);
    assert!(summary.primary_image_url.as_deref().unwrap().ends_with(".jpg"));

    let bodies: Vec<&str> = view.messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, ["two", "three"], "preview keeps the newest messages in ascending order");
}

#[tokio::test]
async fn test_list_conversations_most_recent_first() {
    let services = TestServices::new().await;
    let (buyer, seller, product) = common::create_parties(&services.pool).await;
    let second_product = common::create_product(&services.pool, seller, "Helmet").await;

    let older = services.conversations.get_or_create(buyer, seller, product).await.unwrap();
    let newer = services.conversations.get_or_create(buyer, seller, second_product).await.unwrap();

    let views = services.conversations.list_conversations(buyer).await.unwrap();
    assert_eq!(views[0].conversation.id, newer.id);

    services.conversations.send_message(older.id, seller, buyer, MessageBody::text("still available")).await.unwrap();
    let views = services.conversations.list_conversations(seller).await.unwrap();
    assert_eq!(views[0].conversation.id, older.id, "activity moves a conversation to the top");
}

#[tokio::test]
async fn test_strangers_cannot_see_or_touch_a_conversation() {
    let services = TestServices::new().await;
    let (buyer, seller, product) = common::create_parties(&services.pool).await;
    let stranger = common::create_user(&services.pool, "Eve").await;
    let conversation = services.conversations.get_or_create(buyer, seller, product).await.unwrap();
    let svc = &services.conversations;

    assert!(matches!(svc.get_conversation(conversation.id, stranger).await, Err(AppError::NotFound)));
    assert!(matches!(svc.list_messages_for(conversation.id, stranger).await, Err(AppError::NotFound)));
    assert!(matches!(svc.mark_read(conversation.id, stranger).await, Err(AppError::NotFound)));
    assert!(matches!(
        svc.set_status(conversation.id, stranger, ConversationStatus::Archived).await,
        Err(AppError::NotFound)
    ));
    assert!(matches!(svc.delete_conversation(conversation.id, stranger).await, Err(AppError::NotFound)));
    assert!(matches!(svc.subscribe_messages(conversation.id, stranger).await, Err(AppError::NotFound)));
}

#[tokio::test]
async fn test_set_status_archives_and_restores() {
    let services = TestServices::new().await;
    let (buyer, seller, product) = common::create_parties(&services.pool).await;
    let conversation = services.conversations.get_or_create(buyer, seller, product).await.unwrap();

    let archived =
        services.conversations.set_status(conversation.id, seller, ConversationStatus::Archived).await.unwrap();
    assert_eq!(archived.status, ConversationStatus::Archived);

    let restored = services.conversations.set_status(conversation.id, buyer, ConversationStatus::Active).await.unwrap();
    assert_eq!(restored.status, ConversationStatus::Active);
}

#[tokio::test]
async fn test_delete_conversation_cascades_messages() {
    let services = TestServices::new().await;
    let (buyer, seller, product) = common::create_parties(&services.pool).await;
    let conversation = services.conversations.get_or_create(buyer, seller, product).await.unwrap();
    services.conversations.send_message(conversation.id, buyer, seller, MessageBody::text("bye")).await.unwrap();

    services.conversations.delete_conversation(conversation.id, buyer).await.unwrap();

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = $1")
        .bind(conversation.id)
        .fetch_one(&services.pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
    assert!(matches!(services.conversations.get_conversation(conversation.id, buyer).await, Err(AppError::NotFound)));
    assert!(matches!(services.conversations.delete_conversation(conversation.id, buyer).await, Err(AppError::NotFound)));

    // Notifications outlive the conversation they point at.
    let inbox = services.notifications.list(seller).await.unwrap();
    assert_eq!(inbox.len(), 1);
}
