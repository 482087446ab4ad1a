use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use super::{AppState, build_router};
use crate::service::NotifierService;
use crate::storage::NotifierDatabase;
use crate::subscription::SubscriptionConfig;
use crate::test_helpers::{MockPush, MockTransport, TEST_NPUB, push_subscription};

async fn app() -> (Router, NotifierService, MockTransport) {
    let db = NotifierDatabase::open_in_memory().await.unwrap();
    let transport = MockTransport::new();
    let service = NotifierService::new(
        db,
        Arc::new(transport.clone()),
        Arc::new(MockPush::new()),
        SubscriptionConfig::default(),
        "Kontakt",
    );
    let router = build_router(AppState {
        service: service.clone(),
    });
    (router, service, transport)
}

async fn call(router: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = router.oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// POST `body` verbatim, optionally labelled as JSON.
async fn post_raw(router: Router, uri: &str, json_content_type: bool, body: &str) -> (StatusCode, Value) {
    let mut request = Request::builder().method(Method::POST).uri(uri);
    if json_content_type {
        request = request.header("content-type", "application/json");
    }
    let response = router
        .oneshot(request.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn subscription_json() -> Value {
    serde_json::to_value(push_subscription()).unwrap()
}

#[tokio::test]
async fn health_reports_ok() {
    let (router, _, _) = app().await;

    let (status, body) = call(router, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn subscribe_registers_user() {
    let (router, service, transport) = app().await;

    let (status, body) = call(
        router,
        Method::POST,
        "/subscribe",
        Some(json!({
            "npub": TEST_NPUB,
            "subscription": subscription_json(),
            "relays": ["wss://a.example", 42, "https://nope", " wss://b.example "]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));

    let stored = service.db().get_subscription(TEST_NPUB).await.unwrap().unwrap();
    assert_eq!(
        stored.relays,
        vec!["wss://a.example".to_string(), "wss://b.example".to_string()]
    );
    assert_eq!(stored.push.endpoint, "https://push.example/send/abc");
    assert_eq!(transport.next_open().await.relays, stored.relays);
}

#[tokio::test]
async fn subscribe_with_non_array_relays_uses_defaults() {
    let (router, service, transport) = app().await;

    let (status, _) = call(
        router,
        Method::POST,
        "/subscribe",
        Some(json!({
            "npub": TEST_NPUB,
            "subscription": subscription_json(),
            "relays": "wss://a.example"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let stored = service.db().get_subscription(TEST_NPUB).await.unwrap().unwrap();
    assert!(stored.relays.is_empty());
    assert_eq!(
        transport.next_open().await.relays,
        linky_core::relays::default_relays()
    );
}

#[tokio::test]
async fn subscribe_rejects_missing_npub() {
    let (router, _, _) = app().await;

    let (status, body) = call(
        router,
        Method::POST,
        "/subscribe",
        Some(json!({ "subscription": subscription_json() })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid npub" }));
}

#[tokio::test]
async fn subscribe_rejects_undecodable_npub() {
    let (router, service, transport) = app().await;

    let (status, body) = call(
        router,
        Method::POST,
        "/subscribe",
        Some(json!({ "npub": "npub1notreallyakeyatall", "subscription": subscription_json() })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid npub" }));
    assert!(service.db().list_subscriptions().await.unwrap().is_empty());
    assert_eq!(transport.open_count(), 0);
}

#[tokio::test]
async fn subscribe_rejects_missing_endpoint() {
    let (router, _, _) = app().await;

    let (status, body) = call(
        router,
        Method::POST,
        "/subscribe",
        Some(json!({ "npub": TEST_NPUB, "subscription": { "keys": { "p256dh": "a", "auth": "b" } } })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid subscription" }));
}

#[tokio::test]
async fn subscribe_rejects_empty_endpoint() {
    let (router, _, _) = app().await;
    let mut subscription = subscription_json();
    subscription["endpoint"] = json!("");

    let (status, body) = call(
        router,
        Method::POST,
        "/subscribe",
        Some(json!({ "npub": TEST_NPUB, "subscription": subscription })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid subscription" }));
}

#[tokio::test]
async fn subscribe_rejects_undecodable_push_keys() {
    let (router, service, _) = app().await;
    let mut subscription = subscription_json();
    subscription["keys"]["p256dh"] = json!("BKey");

    let (status, body) = call(
        router,
        Method::POST,
        "/subscribe",
        Some(json!({ "npub": TEST_NPUB, "subscription": subscription })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid subscription" }));
    assert!(service.db().list_subscriptions().await.unwrap().is_empty());
}

#[tokio::test]
async fn subscribe_rejects_malformed_bodies_as_bad_request() {
    let (router, service, _) = app().await;

    for (json_content_type, body) in [
        (true, "{not json"),
        (true, r#"{"npub": 42}"#),
        (true, "[]"),
        (false, r#"{"npub": "npub1abc"}"#),
    ] {
        let (status, response) = post_raw(router.clone(), "/subscribe", json_content_type, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(response, json!({ "error": "Invalid npub" }), "body: {body}");
    }
    assert!(service.db().list_subscriptions().await.unwrap().is_empty());
}

#[tokio::test]
async fn subscribe_store_failure_is_internal_error() {
    let (router, service, _) = app().await;
    service.db().close().await;

    let (status, body) = call(
        router,
        Method::POST,
        "/subscribe",
        Some(json!({ "npub": TEST_NPUB, "subscription": subscription_json() })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Internal server error" }));
}

#[tokio::test]
async fn unsubscribe_removes_user() {
    let (router, service, transport) = app().await;
    let (status, _) = call(
        router.clone(),
        Method::POST,
        "/subscribe",
        Some(json!({ "npub": TEST_NPUB, "subscription": subscription_json() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let opened = transport.next_open().await;

    let (status, body) = call(
        router,
        Method::POST,
        "/unsubscribe",
        Some(json!({ "npub": TEST_NPUB })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
    assert!(service.db().get_subscription(TEST_NPUB).await.unwrap().is_none());
    assert_eq!(service.manager().active_count().await, 0);
    tokio::time::timeout(std::time::Duration::from_secs(1), opened.cancel.cancelled())
        .await
        .unwrap();
}

#[tokio::test]
async fn unsubscribe_unknown_user_succeeds() {
    let (router, _, _) = app().await;

    let (status, body) = call(
        router,
        Method::POST,
        "/unsubscribe",
        Some(json!({ "npub": TEST_NPUB })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
}

#[tokio::test]
async fn unsubscribe_requires_npub() {
    let (router, _, _) = app().await;

    let (status, body) = call(router, Method::POST, "/unsubscribe", Some(json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid npub" }));
}

#[tokio::test]
async fn unsubscribe_rejects_malformed_bodies_as_bad_request() {
    let (router, _, _) = app().await;

    for (json_content_type, body) in [(true, "npub"), (true, r#"{"npub": []}"#), (false, "{}")] {
        let (status, response) =
            post_raw(router.clone(), "/unsubscribe", json_content_type, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
        assert_eq!(response, json!({ "error": "Invalid npub" }), "body: {body}");
    }
}

#[tokio::test]
async fn cors_preflight_is_allowed() {
    let (router, _, _) = app().await;

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/subscribe")
                .header("origin", "https://app.example")
                .header("access-control-request-method", "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}
