//! Web Push protocol (RFC 8030) client.

use std::time::Duration;

use async_trait::async_trait;
use linky_core::db::unix_timestamp;
use reqwest::Url;
use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use tracing::{debug, warn};

use super::vapid::VapidSigner;
use super::{PushError, PushTransport, ece};
use crate::storage::PushSubscription;

/// Default time the push service keeps an undelivered message.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Delivers encrypted payloads to browser push services.
#[derive(Debug, Clone)]
pub struct WebPushClient {
    http: reqwest::Client,
    vapid: Option<VapidSigner>,
    ttl: Duration,
}

impl WebPushClient {
    /// Without a signer every send fails with [`PushError::NotConfigured`].
    pub const fn new(http: reqwest::Client, vapid: Option<VapidSigner>, ttl: Duration) -> Self {
        Self { http, vapid, ttl }
    }

    pub fn vapid_public_key(&self) -> Option<&str> {
        self.vapid.as_ref().map(VapidSigner::public_key)
    }
}

#[async_trait]
impl PushTransport for WebPushClient {
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<(), PushError> {
        let vapid = self.vapid.as_ref().ok_or(PushError::NotConfigured)?;
        let endpoint = Url::parse(&subscription.endpoint)
            .map_err(|e| PushError::InvalidSubscription(format!("endpoint: {e}")))?;

        let body = ece::encrypt(payload, &subscription.keys.p256dh, &subscription.keys.auth)?;
        let authorization = vapid.authorization(&endpoint, unix_timestamp())?;

        let response = self
            .http
            .post(endpoint)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_ENCODING, "aes128gcm")
            .header(CONTENT_TYPE, "application/octet-stream")
            .header("TTL", self.ttl.as_secs())
            .header("Urgency", "high")
            .body(body)
            .send()
            .await
            .map_err(|e| PushError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Push notification accepted");
            Ok(())
        } else {
            let status_code = status.as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(status = status_code, body = %body, "Push service returned error");
            Err(PushError::Rejected {
                status: status_code,
                body,
            })
        }
    }
}
