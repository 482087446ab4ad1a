//! Relay pool backed by `nostr-sdk`.
//!
//! Every stream and every query gets its own [`Client`], so dropping a
//! stream tears down exactly the connections it opened.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use linky_core::nostr::{Event, Filter};
use nostr_sdk::prelude::{Client, RelayMessage, RelayPoolNotification, RelayStatus};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EventStream, RelayTransport, TransportError};

/// Events buffered between the pool task and the stream consumer.
const EVENT_BUFFER: usize = 64;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How often a live stream checks whether any relay is still connected.
const HEALTH_INTERVAL: Duration = Duration::from_secs(2);

/// Relay transport that opens a `nostr-sdk` client per stream or query.
#[derive(Debug, Clone)]
pub struct RelayPoolTransport {
    connect_timeout: Duration,
    health_interval: Duration,
}

impl Default for RelayPoolTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayPoolTransport {
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            health_interval: HEALTH_INTERVAL,
        }
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Build a client for `relays` and wait up to `timeout` for connections.
    ///
    /// Unparseable relay URLs are skipped. Fails unless at least one relay
    /// ends up connected.
    async fn connect(&self, relays: &[String], timeout: Duration) -> Result<Client, TransportError> {
        if relays.is_empty() {
            return Err(TransportError::NoRelays);
        }

        let client = Client::default();
        let mut added = 0_usize;
        for relay in relays {
            match client.add_relay(relay.as_str()).await {
                Ok(_) => added += 1,
                Err(e) => warn!(relay = %relay, error = %e, "Skipping relay"),
            }
        }
        if added == 0 {
            return Err(TransportError::Connection("no usable relay URL".into()));
        }

        client.connect_with_timeout(timeout).await;
        if !any_connected(&client).await {
            let _ = client.shutdown().await;
            return Err(TransportError::Connection(format!(
                "no relay reachable within {timeout:?}"
            )));
        }
        Ok(client)
    }
}

async fn any_connected(client: &Client) -> bool {
    client
        .relays()
        .await
        .values()
        .any(|relay| relay.status() == RelayStatus::Connected)
}

/// Forward pool notifications into `events` until the subscription is over.
///
/// The subscription is over when `cancel` fires, the consumer goes away,
/// every relay sent `CLOSED`, or no relay is connected any more.
async fn forward_events(
    client: Client,
    mut notifications: broadcast::Receiver<RelayPoolNotification>,
    relay_count: usize,
    health_interval: Duration,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
) {
    let mut closed = HashSet::new();
    let mut health = tokio::time::interval(health_interval);
    health.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!("Relay subscription cancelled");
                break;
            }
            _ = health.tick() => {
                if !any_connected(&client).await {
                    info!("Lost every relay connection");
                    break;
                }
            }
            notification = notifications.recv() => match notification {
                Ok(RelayPoolNotification::Event { event, .. }) => {
                    if events.send(*event).await.is_err() {
                        break;
                    }
                }
                Ok(RelayPoolNotification::Message {
                    relay_url,
                    message: RelayMessage::Closed { message, .. },
                }) => {
                    info!(relay = %relay_url, reason = %message, "Relay closed subscription");
                    closed.insert(relay_url.to_string());
                    if closed.len() >= relay_count {
                        break;
                    }
                }
                Ok(RelayPoolNotification::Shutdown) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Relay notifications lagged");
                }
            }
        }
    }

    let _ = client.shutdown().await;
}

#[async_trait]
impl RelayTransport for RelayPoolTransport {
    async fn open_stream(
        &self,
        relays: &[String],
        filter: Filter,
    ) -> Result<EventStream, TransportError> {
        let client = self.connect(relays, self.connect_timeout).await?;

        // Listen before subscribing so no stored event slips past.
        let notifications = client.notifications();
        if let Err(e) = client.subscribe(filter, None).await {
            let _ = client.shutdown().await;
            return Err(TransportError::Protocol(e.to_string()));
        }
        let relay_count = client.relays().await.len();
        debug!(relays = relay_count, "Relay subscription opened");

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let token = CancellationToken::new();
        tokio::spawn(forward_events(
            client,
            notifications,
            relay_count,
            self.health_interval,
            tx,
            token.child_token(),
        ));

        Ok(EventStream::new(rx, token))
    }

    async fn query(
        &self,
        relays: &[String],
        filter: Filter,
        timeout: Duration,
    ) -> Result<Vec<Event>, TransportError> {
        // Connecting and fetching share one budget.
        let deadline = Instant::now() + timeout;
        let client = self
            .connect(relays, timeout.min(self.connect_timeout))
            .await?;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let fetched = client.fetch_events(filter, remaining).await;
        let _ = client.shutdown().await;

        let events = fetched.map_err(|e| TransportError::Connection(e.to_string()))?;
        Ok(events.into_iter().collect())
    }
}
