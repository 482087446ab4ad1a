use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use linky_core::db::unix_timestamp;
use linky_core::relays::normalize_relays_json;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, instrument, warn};

use crate::service::{NotifierService, ServiceError};
use crate::storage::PushSubscription;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub service: NotifierService,
}

/// Body of `POST /subscribe`. Every field is optional so that missing
/// values produce the API's own error messages.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubscribeRequest {
    pub npub: Option<String>,
    pub subscription: Option<Value>,
    pub relays: Option<Value>,
}

/// Body of `POST /unsubscribe`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UnsubscribeRequest {
    pub npub: Option<String>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// Malformed bodies get the same answer as a missing npub.
fn rejected_body(rejection: &JsonRejection) -> Response {
    warn!(status = %rejection.status(), reason = %rejection.body_text(), "Rejected request body");
    error_response(StatusCode::BAD_REQUEST, "Invalid npub")
}

fn success() -> Response {
    Json(json!({ "success": true })).into_response()
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "timestamp": unix_timestamp() }))
}

/// `POST /subscribe`: register a device for DM notifications.
#[instrument(skip_all, fields(npub))]
pub async fn subscribe(
    State(state): State<AppState>,
    body: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return rejected_body(&rejection),
    };
    let Some(npub) = body.npub.filter(|n| !n.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid npub");
    };
    tracing::Span::current().record("npub", npub.as_str());

    let Some(push) = body
        .subscription
        .and_then(|value| serde_json::from_value::<PushSubscription>(value).ok())
    else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid subscription");
    };
    let relays = body
        .relays
        .as_ref()
        .map(normalize_relays_json)
        .unwrap_or_default();

    match state.service.register(&npub, push, &relays).await {
        Ok(_) => success(),
        Err(ServiceError::InvalidNpub(reason)) => {
            warn!(reason = %reason, "Rejected subscription with invalid npub");
            error_response(StatusCode::BAD_REQUEST, "Invalid npub")
        }
        Err(ServiceError::InvalidSubscription(reason)) => {
            warn!(reason = %reason, "Rejected invalid push subscription");
            error_response(StatusCode::BAD_REQUEST, "Invalid subscription")
        }
        Err(e) => {
            error!(error = %e, "Subscribe failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// `POST /unsubscribe`: stop notifications for a user.
#[instrument(skip_all, fields(npub))]
pub async fn unsubscribe(
    State(state): State<AppState>,
    body: Result<Json<UnsubscribeRequest>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => return rejected_body(&rejection),
    };
    let Some(npub) = body.npub.filter(|n| !n.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid npub");
    };
    tracing::Span::current().record("npub", npub.as_str());

    match state.service.deregister(&npub).await {
        Ok(_) => success(),
        Err(e) => {
            error!(error = %e, "Unsubscribe failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
