//! Turns incoming direct-message events into push notifications.

use std::sync::Arc;

use async_trait::async_trait;
use linky_core::db::unix_timestamp;
use linky_core::nostr::{Event, encode_npub, profile_label};
use tracing::{debug, error, info, instrument, warn};

use crate::push::{NotificationPayload, PushTransport};
use crate::storage::{DatabaseError, NotifierDatabase};
use crate::subscription::{EventHandler, SubscriptionManager};

/// Title used when the sender has no usable profile name.
pub const DEFAULT_FALLBACK_LABEL: &str = "Kontakt";

/// Errors that abort handling of a single event.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Payload encoding error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// What happened to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The push service accepted the notification.
    Delivered,
    /// The user was no longer registered; nothing was sent.
    Dropped,
    /// The push subscription is gone; the user was removed.
    Expired,
    /// Delivery failed for a reason that may not recur.
    TransientFailure,
}

/// Event handler that notifies the recipient's device.
pub struct NotificationDispatcher {
    db: NotifierDatabase,
    manager: SubscriptionManager,
    push: Arc<dyn PushTransport>,
    fallback_label: String,
}

impl NotificationDispatcher {
    pub fn new(
        db: NotifierDatabase,
        manager: SubscriptionManager,
        push: Arc<dyn PushTransport>,
    ) -> Self {
        Self {
            db,
            manager,
            push,
            fallback_label: DEFAULT_FALLBACK_LABEL.to_string(),
        }
    }

    #[must_use]
    pub fn with_fallback_label(mut self, label: impl Into<String>) -> Self {
        self.fallback_label = label.into();
        self
    }

    /// Notify `npub` about `event`.
    ///
    /// Expired push subscriptions remove the user entirely. On delivery or
    /// transient failure the user's watermark advances to now.
    #[instrument(skip(self, event), fields(event_id = %event.id, kind = event.kind.as_u16()))]
    pub async fn dispatch(
        &self,
        npub: &str,
        event: &Event,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(record) = self.db.get_subscription(npub).await? else {
            debug!("Recipient no longer registered, dropping event");
            return Ok(DispatchOutcome::Dropped);
        };

        let label = self
            .manager
            .fetch_sender_metadata(&event.pubkey, &record.relays)
            .await
            .and_then(|metadata| profile_label(&metadata).map(str::to_string))
            .unwrap_or_else(|| self.fallback_label.clone());
        let sender_npub = encode_npub(&event.pubkey);

        let payload = NotificationPayload::direct_message(label, sender_npub).to_bytes()?;

        let outcome = match self.push.send(&record.push, &payload).await {
            Ok(()) => {
                info!("Notification delivered");
                DispatchOutcome::Delivered
            }
            Err(e) if e.is_subscription_expired() => {
                warn!(error = %e, "Push subscription expired, removing user");
                let deleted = self.db.delete_subscription(npub).await;
                self.manager.unsubscribe(npub).await;
                deleted?;
                return Ok(DispatchOutcome::Expired);
            }
            Err(e) => {
                warn!(error = %e, "Notification delivery failed");
                DispatchOutcome::TransientFailure
            }
        };

        let now = unix_timestamp();
        self.db.update_last_check(npub, now).await?;
        self.manager.advance_watermark(npub, now).await;

        Ok(outcome)
    }
}

#[async_trait]
impl EventHandler for NotificationDispatcher {
    async fn handle_event(&self, npub: &str, event: Event) {
        if let Err(e) = self.dispatch(npub, &event).await {
            error!(npub = %npub, event_id = %event.id, error = %e, "Failed to dispatch notification");
        }
    }
}
