//! Subscription lifecycle and reconnect loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use linky_core::nostr::{
    Event, Metadata, PublicKey, decode_npub, direct_message_filter, metadata_filter,
    parse_metadata,
};
use linky_core::relays::effective_relays;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SubscriptionConfig;
use super::error::SubscriptionError;
use super::registry::{SubscriptionHandle, SubscriptionRegistry, SubscriptionState};
use crate::storage::SubscriptionRecord;
use crate::transport::{EventStream, RelayTransport};

/// Slack added on top of the transport's own query deadline.
const METADATA_GRACE: Duration = Duration::from_millis(500);

/// Receives every event delivered on a user's stream.
///
/// Each event is handled on its own task, so implementations may await
/// network calls without holding up the stream.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, npub: &str, event: Event);
}

struct Inner {
    transport: Arc<dyn RelayTransport>,
    registry: SubscriptionRegistry,
    config: SubscriptionConfig,
    shutdown: CancellationToken,
}

/// Owns one reconnecting relay stream per registered user.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<Inner>,
}

impl SubscriptionManager {
    pub fn new(transport: Arc<dyn RelayTransport>, config: SubscriptionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                registry: SubscriptionRegistry::new(),
                config,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Start watching `record.npub` for direct messages from
    /// `record.last_check` onward.
    ///
    /// A user that is already subscribed has its previous stream cancelled
    /// and replaced.
    pub async fn subscribe(
        &self,
        record: &SubscriptionRecord,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), SubscriptionError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SubscriptionError::Closed);
        }

        let pubkey = decode_npub(&record.npub).map_err(|e| {
            warn!(npub = %record.npub, error = %e, "Cannot subscribe: invalid npub");
            SubscriptionError::InvalidIdentifier {
                npub: record.npub.clone(),
                reason: e.to_string(),
            }
        })?;

        let relays = effective_relays(&record.relays, &self.inner.config.default_relays);
        let handle = Arc::new(SubscriptionHandle::new(
            record.npub.clone(),
            relays,
            record.last_check,
            self.inner.shutdown.child_token(),
        ));

        if let Some(previous) = self.inner.registry.put(Arc::clone(&handle)).await {
            previous.cancel();
            debug!(npub = %record.npub, "Replaced existing subscription");
        }

        let stream = self.inner.open(&handle, &pubkey).await;
        if stream.is_some() {
            handle.set_state(SubscriptionState::Active);
        } else {
            handle.set_state(SubscriptionState::Reconnecting);
        }

        info!(
            npub = %record.npub,
            relays = ?handle.relays(),
            since = record.last_check,
            "Subscribed to direct messages"
        );

        tokio::spawn(Arc::clone(&self.inner).run(handle, pubkey, handler, stream));
        Ok(())
    }

    /// Stop watching `npub`. Unknown users are ignored.
    ///
    /// Returns `true` if a subscription was removed.
    pub async fn unsubscribe(&self, npub: &str) -> bool {
        match self.inner.registry.remove(npub).await {
            Some(handle) => {
                handle.cancel();
                info!(npub = %npub, "Unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Raise the watermark used by the next reconnect for `npub`.
    ///
    /// The currently open stream is not affected. Returns the resulting
    /// watermark, or `None` if the user is not subscribed.
    pub async fn advance_watermark(&self, npub: &str, timestamp: i64) -> Option<i64> {
        let handle = self.inner.registry.get(npub).await?;
        Some(handle.advance_watermark(timestamp))
    }

    pub async fn watermark(&self, npub: &str) -> Option<i64> {
        self.inner
            .registry
            .get(npub)
            .await
            .map(|handle| handle.watermark())
    }

    pub async fn state(&self, npub: &str) -> SubscriptionState {
        self.inner
            .registry
            .get(npub)
            .await
            .map_or(SubscriptionState::Idle, |handle| handle.state())
    }

    /// Number of registered users.
    pub async fn active_count(&self) -> usize {
        self.inner.registry.len().await
    }

    /// Best-effort lookup of the newest profile metadata published by
    /// `author`. Failures and timeouts yield `None`.
    pub async fn fetch_sender_metadata(
        &self,
        author: &PublicKey,
        relays: &[String],
    ) -> Option<Metadata> {
        let config = &self.inner.config;
        let relays = effective_relays(relays, &config.default_relays);
        let query = self.inner.transport.query(
            &relays,
            metadata_filter(author),
            config.metadata_timeout,
        );

        let events = match tokio::time::timeout(config.metadata_timeout + METADATA_GRACE, query)
            .await
        {
            Ok(Ok(events)) => events,
            Ok(Err(e)) => {
                debug!(author = %author, error = %e, "Metadata lookup failed");
                return None;
            }
            Err(_) => {
                debug!(author = %author, "Metadata lookup timed out");
                return None;
            }
        };

        let newest = events.into_iter().max_by_key(|event| event.created_at)?;
        parse_metadata(&newest)
            .map_err(|e| debug!(author = %author, error = %e, "Unreadable profile metadata"))
            .ok()
    }

    /// Cancel every stream and pending reconnect. Later subscribes fail.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        let handles = self.inner.registry.drain().await;
        info!(count = handles.len(), "Subscription manager closed");
    }
}

impl Inner {
    async fn open(&self, handle: &SubscriptionHandle, pubkey: &PublicKey) -> Option<EventStream> {
        let filter = direct_message_filter(pubkey, handle.watermark());
        match self.transport.open_stream(handle.relays(), filter).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(npub = %handle.npub(), error = %e, "Failed to open relay stream");
                None
            }
        }
    }

    /// Whether a closed stream for `handle` should be reopened.
    async fn should_reconnect(&self, handle: &Arc<SubscriptionHandle>) -> bool {
        !handle.is_cancelled() && self.registry.is_current(handle).await
    }

    async fn run(
        self: Arc<Self>,
        handle: Arc<SubscriptionHandle>,
        pubkey: PublicKey,
        handler: Arc<dyn EventHandler>,
        mut stream: Option<EventStream>,
    ) {
        loop {
            if let Some(mut events) = stream.take() {
                handle.set_state(SubscriptionState::Active);
                loop {
                    tokio::select! {
                        biased;
                        () = handle.cancelled() => return,
                        next = events.next() => match next {
                            Some(event) => {
                                let handler = Arc::clone(&handler);
                                let npub = handle.npub().to_string();
                                tokio::spawn(async move {
                                    handler.handle_event(&npub, event).await;
                                });
                            }
                            None => break,
                        },
                    }
                }
                debug!(npub = %handle.npub(), "Relay stream closed");
            }

            if !self.should_reconnect(&handle).await {
                return;
            }
            handle.set_state(SubscriptionState::Reconnecting);
            info!(
                npub = %handle.npub(),
                delay = ?self.config.reconnect_delay,
                "Reconnecting relay stream"
            );

            tokio::select! {
                biased;
                () = handle.cancelled() => return,
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
            }

            if !self.should_reconnect(&handle).await {
                return;
            }
            stream = self.open(&handle, &pubkey).await;
        }
    }
}
