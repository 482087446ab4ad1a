//! Web Push delivery.
//!
//! Provides:
//! - [`PushTransport`], the delivery seam used by the dispatcher
//! - [`WebPushClient`], an RFC 8030 client with RFC 8291 payload encryption
//!   and RFC 8292 (VAPID) authentication
//! - [`NotificationPayload`], the JSON shown by the service worker

pub mod ece;
pub mod payload;
pub mod vapid;
pub mod webpush;

use async_trait::async_trait;

pub use payload::NotificationPayload;
pub use vapid::VapidSigner;
pub use webpush::WebPushClient;

use crate::storage::PushSubscription;

/// Errors that can occur while delivering a push notification.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// The push service answered with a non-success status code.
    #[error("Push service error (status {status}): {body}")]
    Rejected {
        /// HTTP status code returned by the push service.
        status: u16,
        /// Response body from the push service.
        body: String,
    },

    /// HTTP request to the push service failed.
    #[error("Push request error: {0}")]
    Request(String),

    /// Payload encryption or VAPID signing failed.
    #[error("Push crypto error: {0}")]
    Crypto(String),

    /// The stored subscription is unusable (bad endpoint or keys).
    #[error("Invalid push subscription: {0}")]
    InvalidSubscription(String),

    /// No VAPID key pair was configured.
    #[error("Web Push is not configured")]
    NotConfigured,
}

impl PushError {
    /// HTTP status returned by the push service, if any.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the push service reported the subscription as gone
    /// (404 Not Found or 410 Gone). Such subscriptions never recover.
    pub const fn is_subscription_expired(&self) -> bool {
        matches!(self, Self::Rejected { status: 404 | 410, .. })
    }
}

/// Sends an opaque payload to a browser push subscription.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(&self, subscription: &PushSubscription, payload: &[u8])
    -> Result<(), PushError>;
}
