//! Service root: wires storage, subscriptions and push delivery together.

use std::sync::Arc;

use linky_core::nostr::decode_npub;
use linky_core::relays::normalize_relays;
use tracing::{info, warn};

use crate::dispatch::NotificationDispatcher;
use crate::push::{PushTransport, ece};
use crate::storage::{DatabaseError, NotifierDatabase, PushSubscription, SubscriptionRecord};
use crate::subscription::{
    EventHandler, SubscriptionConfig, SubscriptionError, SubscriptionManager,
};
use crate::transport::RelayTransport;

/// Errors surfaced to callers of [`NotifierService`].
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid npub: {0}")]
    InvalidNpub(String),

    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}

/// Owns every long-lived component of the notifier.
#[derive(Clone)]
pub struct NotifierService {
    db: NotifierDatabase,
    manager: SubscriptionManager,
    dispatcher: Arc<NotificationDispatcher>,
}

impl NotifierService {
    pub fn new(
        db: NotifierDatabase,
        transport: Arc<dyn RelayTransport>,
        push: Arc<dyn PushTransport>,
        config: SubscriptionConfig,
        fallback_label: &str,
    ) -> Self {
        let manager = SubscriptionManager::new(transport, config);
        let dispatcher = Arc::new(
            NotificationDispatcher::new(db.clone(), manager.clone(), push)
                .with_fallback_label(fallback_label),
        );
        Self {
            db,
            manager,
            dispatcher,
        }
    }

    pub const fn db(&self) -> &NotifierDatabase {
        &self.db
    }

    pub const fn manager(&self) -> &SubscriptionManager {
        &self.manager
    }

    fn handler(&self) -> Arc<dyn EventHandler> {
        Arc::clone(&self.dispatcher) as Arc<dyn EventHandler>
    }

    /// Register (or re-register) a user and start watching their relays.
    ///
    /// The watermark starts at the current time, so only messages arriving
    /// from now on are notified.
    pub async fn register(
        &self,
        npub: &str,
        push: PushSubscription,
        relays: &[String],
    ) -> Result<SubscriptionRecord, ServiceError> {
        let npub = npub.trim();
        decode_npub(npub).map_err(|e| ServiceError::InvalidNpub(e.to_string()))?;
        validate_push_subscription(&push)?;

        let record = SubscriptionRecord::new(npub, push, normalize_relays(relays));
        self.db.put_subscription(&record).await?;
        self.manager.subscribe(&record, self.handler()).await?;

        info!(npub = %npub, relays = record.relays.len(), "User registered");
        Ok(record)
    }

    /// Remove a user and stop watching their relays.
    ///
    /// Returns `true` if the user was known.
    pub async fn deregister(&self, npub: &str) -> Result<bool, ServiceError> {
        let npub = npub.trim();
        let deleted = self.db.delete_subscription(npub).await;
        let unsubscribed = self.manager.unsubscribe(npub).await;
        let existed = deleted? || unsubscribed;
        if existed {
            info!(npub = %npub, "User deregistered");
        }
        Ok(existed)
    }

    /// Resubscribe every stored user. Returns the number of users restored.
    pub async fn restore(&self) -> Result<usize, ServiceError> {
        let records = self.db.list_subscriptions().await?;
        let total = records.len();
        let mut restored = 0;
        for record in &records {
            match self.manager.subscribe(record, self.handler()).await {
                Ok(()) => restored += 1,
                Err(e) => warn!(npub = %record.npub, error = %e, "Skipping stored subscription"),
            }
        }
        info!(restored, total, "Loaded existing subscriptions");
        Ok(restored)
    }

    /// Stop every subscription and close the database.
    pub async fn shutdown(&self) {
        self.manager.close().await;
        self.db.close().await;
        info!("Notifier service stopped");
    }
}

fn validate_push_subscription(push: &PushSubscription) -> Result<(), ServiceError> {
    if push.endpoint.trim().is_empty() {
        return Err(ServiceError::InvalidSubscription("missing endpoint".into()));
    }
    ece::validate_keys(&push.keys.p256dh, &push.keys.auth)
        .map_err(|e| ServiceError::InvalidSubscription(e.to_string()))
}
