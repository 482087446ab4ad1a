//! Connections to Nostr relays.
//!
//! The subscription core only sees [`RelayTransport`]: a long-lived event
//! stream per user plus a one-shot query used for profile lookups. The
//! production implementation is a `nostr-sdk` relay pool.

mod pool;

use std::time::Duration;

use async_trait::async_trait;
use linky_core::nostr::{Event, Filter};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

pub use pool::RelayPoolTransport;

/// Errors raised while talking to relays.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No relays to connect to")]
    NoRelays,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Live stream of events matching a filter across a set of relays.
///
/// The stream ends once no relay connection is left. Dropping it closes
/// the subscription on every relay.
pub struct EventStream {
    events: mpsc::Receiver<Event>,
    _guard: DropGuard,
}

impl EventStream {
    /// Wrap a receiver; `token` is cancelled when the stream is dropped.
    pub fn new(events: mpsc::Receiver<Event>, token: CancellationToken) -> Self {
        Self {
            events,
            _guard: token.drop_guard(),
        }
    }

    /// Next matching event, or `None` once the relays are gone.
    pub async fn next(&mut self) -> Option<Event> {
        self.events.recv().await
    }
}

/// A pool of relay connections.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Open a persistent subscription for `filter` on every relay in `relays`.
    async fn open_stream(
        &self,
        relays: &[String],
        filter: Filter,
    ) -> Result<EventStream, TransportError>;

    /// Collect stored events matching `filter`, waiting at most `timeout`.
    ///
    /// Relays that fail or time out contribute nothing; the call itself
    /// fails when no relay can be reached.
    async fn query(
        &self,
        relays: &[String],
        filter: Filter,
        timeout: Duration,
    ) -> Result<Vec<Event>, TransportError>;
}
