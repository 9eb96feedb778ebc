use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::{Body, to_bytes};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Request, StatusCode};
use domus_domain::chat::ChatService;
use domus_domain::listing::{PropertyRef, PropertyStatus, UserRef};
use domus_infra::config::AppConfig;
use domus_infra::repositories::memory::{
    InMemoryAuditSink, InMemoryChatRepository, InMemoryDealSink, InMemoryPropertyDirectory,
    InMemoryReadMarkStore, InMemoryUserDirectory,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::routes;
use crate::state::AppState;

#[derive(Serialize)]
struct Claims {
    sub: String,
    name: String,
    exp: usize,
}

fn test_config() -> AppConfig {
    AppConfig {
        app_env: "test".to_string(),
        port: 0,
        log_level: "info".to_string(),
        data_backend: "memory".to_string(),
        sqlite_path: ":memory:".to_string(),
        jwt_secret: "test-secret".to_string(),
        fallback_seller_id: String::new(),
    }
}

fn test_token(sub: &str) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_secs();
    let claims = Claims {
        sub: sub.to_string(),
        name: format!("{sub}-name"),
        exp: (now + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(test_config().jwt_secret.as_bytes()),
    )
    .expect("token")
}

struct TestApp {
    app: axum::Router,
    deals: Arc<InMemoryDealSink>,
}

async fn test_app() -> TestApp {
    let properties = Arc::new(InMemoryPropertyDirectory::new());
    let users = Arc::new(InMemoryUserDirectory::new());
    let deals = Arc::new(InMemoryDealSink::new());

    properties
        .upsert(PropertyRef {
            property_id: "prop-1".to_string(),
            owner_id: Some("seller-1".to_string()),
            realtor_id: None,
            status: PropertyStatus::Active,
            address: "12 Elm Street".to_string(),
        })
        .await;
    properties
        .upsert(PropertyRef {
            property_id: "prop-sold".to_string(),
            owner_id: Some("seller-1".to_string()),
            realtor_id: None,
            status: PropertyStatus::Sold,
            address: "99 Closed Lane".to_string(),
        })
        .await;
    users
        .upsert(UserRef {
            user_id: "buyer-1".to_string(),
            email: "buyer@example.com".to_string(),
            first_name: Some("Bea".to_string()),
            last_name: None,
        })
        .await;
    users
        .upsert(UserRef {
            user_id: "seller-1".to_string(),
            email: "seller@example.com".to_string(),
            first_name: Some("Sam".to_string()),
            last_name: None,
        })
        .await;

    let chat = ChatService::new(
        Arc::new(InMemoryChatRepository::new()),
        Arc::new(InMemoryReadMarkStore::new()),
        properties,
        users,
        deals.clone(),
        Arc::new(InMemoryAuditSink::new()),
    );
    let state = AppState::with_chat_service(test_config(), chat);
    TestApp {
        app: routes::router(state),
        deals,
    }
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    request("GET", uri, token, None)
}

fn post(uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    request("POST", uri, token, body)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn open_chat(app: &axum::Router, token: &str, property_id: &str) -> String {
    let response = app
        .clone()
        .oneshot(post(
            "/v1/chat/create",
            Some(token),
            Some(json!({ "property_id": property_id })),
        ))
        .await
        .expect("response");
    assert!(response.status().is_success());
    let body = body_json(response).await;
    body["chat_id"].as_str().expect("chat_id").to_string()
}

async fn send_text(app: &axum::Router, token: &str, chat_id: &str, text: &str) {
    let response = app
        .clone()
        .oneshot(post(
            &format!("/v1/chat/{chat_id}/messages"),
            Some(token),
            Some(json!({ "message_text": text })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn health_is_public() {
    let fixture = test_app().await;
    let response = fixture
        .app
        .oneshot(get("/health", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "memory");
}

#[tokio::test]
async fn chat_routes_require_auth() {
    let fixture = test_app().await;
    let response = fixture
        .app
        .clone()
        .oneshot(post(
            "/v1/chat/create",
            None,
            Some(json!({ "property_id": "prop-1" })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = fixture
        .app
        .oneshot(get("/v1/chat/my-chats", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_chat_is_idempotent() {
    let fixture = test_app().await;
    let token = test_token("buyer-1");

    let first = fixture
        .app
        .clone()
        .oneshot(post(
            "/v1/chat/create",
            Some(&token),
            Some(json!({ "property_id": "prop-1" })),
        ))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = body_json(first).await;
    assert_eq!(first_body["created"], true);

    let second = fixture
        .app
        .oneshot(post(
            "/v1/chat/create",
            Some(&token),
            Some(json!({ "property_id": "prop-1" })),
        ))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::OK);
    let second_body = body_json(second).await;
    assert_eq!(second_body["created"], false);
    assert_eq!(second_body["chat_id"], first_body["chat_id"]);
}

#[tokio::test]
async fn owner_cannot_open_chat_on_own_listing() {
    let fixture = test_app().await;
    let response = fixture
        .app
        .oneshot(post(
            "/v1/chat/create",
            Some(&test_token("seller-1")),
            Some(json!({ "property_id": "prop-1" })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_property_is_not_found() {
    let fixture = test_app().await;
    let response = fixture
        .app
        .oneshot(post(
            "/v1/chat/create",
            Some(&test_token("buyer-1")),
            Some(json!({ "property_id": "prop-missing" })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn message_flow_updates_unread_counts() {
    let fixture = test_app().await;
    let buyer = test_token("buyer-1");
    let seller = test_token("seller-1");
    let chat_id = open_chat(&fixture.app, &buyer, "prop-1").await;

    send_text(&fixture.app, &buyer, &chat_id, "Interested?").await;

    let response = fixture
        .app
        .clone()
        .oneshot(get("/v1/chat/unread-count", Some(&seller)))
        .await
        .expect("response");
    let body = body_json(response).await;
    assert_eq!(body["unread_count"], 1);

    // Viewing the thread marks it read for the seller.
    let response = fixture
        .app
        .clone()
        .oneshot(get(&format!("/v1/chat/{chat_id}/messages"), Some(&seller)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let views = body_json(response).await;
    assert_eq!(views.as_array().expect("array").len(), 1);
    assert_eq!(views[0]["body"], "Interested?");
    assert_eq!(views[0]["read"], true);

    let response = fixture
        .app
        .oneshot(get(
            &format!("/v1/chat/{chat_id}/unread-count"),
            Some(&seller),
        ))
        .await
        .expect("response");
    let body = body_json(response).await;
    assert_eq!(body["unread_count"], 0);
}

#[tokio::test]
async fn mark_read_returns_no_content() {
    let fixture = test_app().await;
    let buyer = test_token("buyer-1");
    let seller = test_token("seller-1");
    let chat_id = open_chat(&fixture.app, &buyer, "prop-1").await;
    send_text(&fixture.app, &buyer, &chat_id, "ping").await;

    let response = fixture
        .app
        .clone()
        .oneshot(post(
            &format!("/v1/chat/{chat_id}/mark-read"),
            Some(&seller),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = fixture
        .app
        .oneshot(get(
            &format!("/v1/chat/{chat_id}/unread-count"),
            Some(&seller),
        ))
        .await
        .expect("response");
    let body = body_json(response).await;
    assert_eq!(body["unread_count"], 0);
}

#[tokio::test]
async fn blank_message_is_rejected() {
    let fixture = test_app().await;
    let buyer = test_token("buyer-1");
    let chat_id = open_chat(&fixture.app, &buyer, "prop-1").await;

    let response = fixture
        .app
        .oneshot(post(
            &format!("/v1/chat/{chat_id}/messages"),
            Some(&buyer),
            Some(json!({ "message_text": "   " })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn stranger_cannot_read_the_thread() {
    let fixture = test_app().await;
    let buyer = test_token("buyer-1");
    let chat_id = open_chat(&fixture.app, &buyer, "prop-1").await;

    let response = fixture
        .app
        .oneshot(get(
            &format!("/v1/chat/{chat_id}/messages"),
            Some(&test_token("stranger-1")),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn my_chats_lists_active_threads() {
    let fixture = test_app().await;
    let buyer = test_token("buyer-1");
    let chat_id = open_chat(&fixture.app, &buyer, "prop-1").await;
    send_text(&fixture.app, &buyer, &chat_id, "hello").await;

    let response = fixture
        .app
        .oneshot(get("/v1/chat/my-chats", Some(&buyer)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let summaries = body.as_array().expect("array");
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0]["thread"]["thread_id"], chat_id.as_str());
    assert_eq!(summaries[0]["property_address"], "12 Elm Street");
    assert_eq!(summaries[0]["other_user"]["email"], "seller@example.com");
    assert_eq!(summaries[0]["last_message"]["body"], "hello");
}

#[tokio::test]
async fn delete_rules_are_enforced() {
    let fixture = test_app().await;
    let buyer = test_token("buyer-1");
    let chat_id = open_chat(&fixture.app, &buyer, "prop-1").await;
    send_text(&fixture.app, &buyer, &chat_id, "hello").await;

    let response = fixture
        .app
        .clone()
        .oneshot(request(
            "DELETE",
            &format!("/v1/chat/{chat_id}"),
            Some(&buyer),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let empty_chat = open_chat(&fixture.app, &buyer, "prop-sold").await;
    let response = fixture
        .app
        .clone()
        .oneshot(request(
            "DELETE",
            &format!("/v1/chat/{empty_chat}"),
            Some(&buyer),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = fixture
        .app
        .oneshot(get(&format!("/v1/chat/{empty_chat}"), Some(&buyer)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn contract_handoff_is_seller_only_and_idempotent() {
    let fixture = test_app().await;
    let buyer = test_token("buyer-1");
    let seller = test_token("seller-1");
    let chat_id = open_chat(&fixture.app, &buyer, "prop-1").await;

    let response = fixture
        .app
        .clone()
        .oneshot(post(
            &format!("/v1/chat/{chat_id}/send-contract"),
            Some(&buyer),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let first = fixture
        .app
        .clone()
        .oneshot(post(
            &format!("/v1/chat/{chat_id}/send-contract"),
            Some(&seller),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = body_json(first).await;
    let deal_id = first_body["deal_id"].as_str().expect("deal_id").to_string();

    let second = fixture
        .app
        .clone()
        .oneshot(post(
            &format!("/v1/chat/{chat_id}/send-contract"),
            Some(&seller),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::OK);
    let second_body = body_json(second).await;
    assert_eq!(second_body["deal_id"], deal_id.as_str());
    assert_eq!(fixture.deals.created_count().await, 1);

    // The pointer message lands in the chat.
    let response = fixture
        .app
        .oneshot(get(&format!("/v1/chat/{chat_id}/messages"), Some(&buyer)))
        .await
        .expect("response");
    let views = body_json(response).await;
    let bodies: Vec<String> = views
        .as_array()
        .expect("array")
        .iter()
        .map(|view| view["body"].as_str().unwrap_or_default().to_string())
        .collect();
    assert!(bodies.contains(&format!("Contract sent: /deal/{deal_id}")));
}

#[tokio::test]
async fn contract_rejected_for_sold_property() {
    let fixture = test_app().await;
    let buyer = test_token("buyer-1");
    let seller = test_token("seller-1");
    let chat_id = open_chat(&fixture.app, &buyer, "prop-sold").await;

    let response = fixture
        .app
        .oneshot(post(
            &format!("/v1/chat/{chat_id}/send-contract"),
            Some(&seller),
            None,
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn expired_token_is_anonymous() {
    let fixture = test_app().await;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_secs();
    let claims = Claims {
        sub: "buyer-1".to_string(),
        name: "buyer-1-name".to_string(),
        exp: (now - 3600) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(test_config().jwt_secret.as_bytes()),
    )
    .expect("token");

    let response = fixture
        .app
        .oneshot(get("/v1/chat/my-chats", Some(&token)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
