#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, unreachable_pub)]
mod common;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use common::{FailingStorage, TestApp};
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::sync::Arc;

#[tokio::test]
async fn test_requires_bearer_token() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(format!("{}/v1/conversations", app.server_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .client
        .get(format!("{}/v1/conversations", app.server_url))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_conversation_flow_over_http() {
    let app = TestApp::spawn().await;
    let (buyer, seller, product) = common::create_parties(&app.pool).await;
    let buyer_token = app.token(buyer);
    let seller_token = app.token(seller);

    let resp = app
        .client
        .post(format!("{}/v1/conversations", app.server_url))
        .bearer_auth(&buyer_token)
        .json(&json!({ "sellerId": seller, "productId": product }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let conversation: Value = resp.json().await.unwrap();
    let id = conversation["id"].as_str().unwrap().to_string();
    assert_eq!(conversation["buyerUnreadCount"], 0);
    assert_eq!(conversation["status"], "active");

    let resp = app
        .client
        .post(format!("{}/v1/conversations/{id}/messages", app.server_url))
        .bearer_auth(&buyer_token)
        .json(&json!({ "text": "still for sale?", "image": { "fileName": "me.jpg", "contentType": "image/jpeg", "data": "aGk=" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let message: Value = resp.json().await.unwrap();
    assert_eq!(message["kind"], "image");
    assert_eq!(message["receiverId"], seller.to_string());

    let resp = app
        .client
        .get(format!("{}/v1/conversations/{id}/messages", app.server_url))
        .bearer_auth(&seller_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let messages: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(messages.len(), 1);

    let resp = app
        .client
        .post(format!("{}/v1/conversations/{id}/read", app.server_url))
        .bearer_auth(&seller_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["marked"], 1);

    let resp = app
        .client
        .get(format!("{}/v1/conversations", app.server_url))
        .bearer_auth(&seller_token)
        .send()
        .await
        .unwrap();
    let views: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0]["product"]["name"], "Road bike");
    assert_eq!(views[0]["buyer"]["fullName"], "Bea Buyer");
    assert_eq!(views[0]["messages"].as_array().unwrap().len(), 1);

    let resp = app
        .client
        .get(format!("{}/v1/notifications", app.server_url))
        .bearer_auth(&seller_token)
        .send()
        .await
        .unwrap();
    let notifications: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["kind"], "new_message");

    let resp = app
        .client
        .post(format!("{}/v1/notifications/read", app.server_url))
        .bearer_auth(&seller_token)
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["updated"], 1);

    let resp = app
        .client
        .patch(format!("{}/v1/conversations/{id}", app.server_url))
        .bearer_auth(&seller_token)
        .json(&json!({ "status": "archived" }))
        .send()
        .await
        .unwrap();
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["status"], "archived");

    let resp = app
        .client
        .delete(format!("{}/v1/conversations/{id}", app.server_url))
        .bearer_auth(&buyer_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app
        .client
        .get(format!("{}/v1/conversations/{id}", app.server_url))
        .bearer_auth(&buyer_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_error_mapping() {
    let app = TestApp::spawn_with(common::get_test_config(), Arc::new(FailingStorage)).await;
    let (buyer, seller, product) = common::create_parties(&app.pool).await;
    let stranger = common::create_user(&app.pool, "Outsider").await;
    let token = app.token(buyer);

    let resp = app
        .client
        .post(format!("{}/v1/conversations", app.server_url))
        .bearer_auth(&token)
        .json(&json!({ "sellerId": buyer, "productId": product }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .client
        .post(format!("{}/v1/conversations", app.server_url))
        .bearer_auth(&token)
        .json(&json!({ "sellerId": seller, "productId": product }))
        .send()
        .await
        .unwrap();
    let conversation: Value = resp.json().await.unwrap();
    let id = conversation["id"].as_str().unwrap().to_string();

    let resp = app
        .client
        .post(format!("{}/v1/conversations/{id}/messages", app.server_url))
        .bearer_auth(&token)
        .json(&json!({ "text": "pic", "image": { "fileName": "a.png", "data": "aGk=" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

    let resp = app
        .client
        .post(format!("{}/v1/conversations/{id}/messages", app.server_url))
        .bearer_auth(&token)
        .json(&json!({ "text": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app
        .client
        .get(format!("{}/v1/conversations/{id}/messages", app.server_url))
        .bearer_auth(app.token(stranger))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(format!("{}/livez", app.mgmt_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.client.get(format!("{}/readyz", app.mgmt_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["database"], "ok");
    assert_eq!(body["storage"], "ok");
    assert_eq!(body["pubsub"], "ok");

    let failing = TestApp::spawn_with(common::get_test_config(), Arc::new(FailingStorage)).await;
    let resp = failing.client.get(format!("{}/readyz", failing.mgmt_url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["storage"], "error");
    assert_eq!(body["database"], "ok");
}

#[tokio::test]
async fn test_image_size_limit_is_reachable_over_http() {
    let app = TestApp::spawn().await;
    let (buyer, seller, product) = common::create_parties(&app.pool).await;
    let token = app.token(buyer);
    let max = app.config.chat.max_image_bytes;

    let resp = app
        .client
        .post(format!("{}/v1/conversations", app.server_url))
        .bearer_auth(&token)
        .json(&json!({ "sellerId": seller, "productId": product }))
        .send()
        .await
        .unwrap();
    let conversation: Value = resp.json().await.unwrap();
    let url = format!("{}/v1/conversations/{}/messages", app.server_url, conversation["id"].as_str().unwrap());

    let send = |size: usize| {
        let body = json!({
            "image": { "fileName": "big.jpg", "contentType": "image/jpeg", "data": STANDARD.encode(vec![7u8; size]) }
        });
        app.client.post(&url).bearer_auth(&token).json(&body).send()
    };

    // Larger than axum's default 2 MiB body limit once encoded.
    let resp = send(3 * 1024 * 1024).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = send(max).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = send(max + 1).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
