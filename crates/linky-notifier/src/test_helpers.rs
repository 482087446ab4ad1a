//! In-process relay and push doubles for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use linky_core::nostr::{Event, Filter, Kind, PublicKey, timestamp};
use nostr_sdk::prelude::{EventBuilder, Keys, SecretKey, Tag};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::push::ece::BASE64_URL;
use crate::push::{PushError, PushTransport};
use crate::storage::{PushKeys, PushSubscription, SubscriptionRecord};
use crate::transport::{EventStream, RelayTransport, TransportError};

/// NIP-19 test vector.
pub const TEST_NPUB: &str = "npub10elfcs4fr0l0r8af98jlmgdh9c8tcxjvz9qkw038js35mp4dma8qzvjptg";

/// A stream handed out by [`MockTransport::open_stream`].
///
/// Dropping `events` ends the stream as if every relay disconnected.
pub struct OpenedStream {
    pub relays: Vec<String>,
    pub filter: Filter,
    pub events: mpsc::Sender<Event>,
    pub cancel: CancellationToken,
}

impl OpenedStream {
    /// Simulate every relay closing the stream. Returns the stream's
    /// cancellation token.
    pub fn close(self) -> CancellationToken {
        self.cancel
    }

    /// The filter's `since`, in unix seconds.
    pub fn since(&self) -> Option<i64> {
        self.filter.since.and_then(|t| i64::try_from(t.as_u64()).ok())
    }
}

/// Relay transport that records every stream and query.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockTransportInner>,
}

struct MockTransportInner {
    opened_tx: mpsc::UnboundedSender<OpenedStream>,
    opened_rx: AsyncMutex<mpsc::UnboundedReceiver<OpenedStream>>,
    open_count: AtomicUsize,
    fail_opens: AtomicBool,
    query_results: Mutex<Vec<Event>>,
    queries: Mutex<Vec<(Vec<String>, Filter)>>,
    query_delay: Mutex<Option<Duration>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockTransportInner {
                opened_tx,
                opened_rx: AsyncMutex::new(opened_rx),
                open_count: AtomicUsize::new(0),
                fail_opens: AtomicBool::new(false),
                query_results: Mutex::new(Vec::new()),
                queries: Mutex::new(Vec::new()),
                query_delay: Mutex::new(None),
            }),
        }
    }

    /// Wait for the next stream to be opened.
    #[allow(clippy::expect_used)]
    pub async fn next_open(&self) -> OpenedStream {
        let mut rx = self.inner.opened_rx.lock().await;
        tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("timed out waiting for a stream to open")
            .expect("transport dropped")
    }

    /// A stream opened since the last call, without waiting.
    pub fn try_next_open(&self) -> Option<OpenedStream> {
        self.inner.opened_rx.try_lock().ok()?.try_recv().ok()
    }

    pub fn open_count(&self) -> usize {
        self.inner.open_count.load(Ordering::SeqCst)
    }

    pub fn fail_opens(&self, fail: bool) {
        self.inner.fail_opens.store(fail, Ordering::SeqCst);
    }

    #[allow(clippy::unwrap_used)]
    pub fn set_query_results(&self, events: Vec<Event>) {
        *self.inner.query_results.lock().unwrap() = events;
    }

    #[allow(clippy::unwrap_used)]
    pub fn set_query_delay(&self, delay: Duration) {
        *self.inner.query_delay.lock().unwrap() = Some(delay);
    }

    #[allow(clippy::unwrap_used)]
    pub fn queries(&self) -> Vec<(Vec<String>, Filter)> {
        self.inner.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl RelayTransport for MockTransport {
    async fn open_stream(
        &self,
        relays: &[String],
        filter: Filter,
    ) -> Result<EventStream, TransportError> {
        self.inner.open_count.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_opens.load(Ordering::SeqCst) {
            return Err(TransportError::Connection("mock refused".into()));
        }

        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let _ = self.inner.opened_tx.send(OpenedStream {
            relays: relays.to_vec(),
            filter,
            events: tx,
            cancel: cancel.clone(),
        });
        Ok(EventStream::new(rx, cancel))
    }

    #[allow(clippy::unwrap_used)]
    async fn query(
        &self,
        relays: &[String],
        filter: Filter,
        _timeout: Duration,
    ) -> Result<Vec<Event>, TransportError> {
        self.inner
            .queries
            .lock()
            .unwrap()
            .push((relays.to_vec(), filter));
        let delay = *self.inner.query_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.inner.query_results.lock().unwrap().clone())
    }
}

/// Push transport that records payloads and replays scripted results.
#[derive(Default)]
pub struct MockPush {
    responses: Mutex<VecDeque<Result<(), PushError>>>,
    sent: Mutex<Vec<(PushSubscription, Vec<u8>)>>,
}

impl MockPush {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a rejection with `status` for the next send.
    #[allow(clippy::unwrap_used)]
    pub fn reject_next(&self, status: u16) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(PushError::Rejected {
                status,
                body: String::new(),
            }));
    }

    #[allow(clippy::unwrap_used)]
    pub fn sent(&self) -> Vec<(PushSubscription, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    /// Payloads sent so far, parsed as JSON.
    #[allow(clippy::unwrap_used)]
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent()
            .iter()
            .map(|(_, bytes)| serde_json::from_slice(bytes).unwrap())
            .collect()
    }
}

#[async_trait]
impl PushTransport for MockPush {
    #[allow(clippy::unwrap_used)]
    async fn send(
        &self,
        subscription: &PushSubscription,
        payload: &[u8],
    ) -> Result<(), PushError> {
        self.sent
            .lock()
            .unwrap()
            .push((subscription.clone(), payload.to_vec()));
        self.responses.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Browser-style subscription with a real P-256 key and 16-byte auth secret.
#[allow(clippy::unwrap_used)]
pub fn push_subscription() -> PushSubscription {
    let secret = p256::SecretKey::from_slice(&[7; 32]).unwrap();
    PushSubscription {
        endpoint: "https://push.example/send/abc".to_string(),
        expiration_time: None,
        keys: PushKeys {
            p256dh: BASE64_URL.encode(secret.public_key().to_encoded_point(false).as_bytes()),
            auth: BASE64_URL.encode([9u8; 16]),
        },
    }
}

pub fn record(npub: &str, relays: &[&str], last_check: i64) -> SubscriptionRecord {
    SubscriptionRecord {
        npub: npub.to_string(),
        push: push_subscription(),
        relays: relays.iter().map(|r| (*r).to_string()).collect(),
        last_check,
        updated_at: last_check,
    }
}

/// Deterministic signing keys for test senders.
#[allow(clippy::unwrap_used)]
pub fn sender_keys(byte: u8) -> Keys {
    Keys::new(SecretKey::from_slice(&[byte; 32]).unwrap())
}

pub fn sender_key(byte: u8) -> PublicKey {
    sender_keys(byte).public_key()
}

/// A signed direct message addressed to `recipient`.
#[allow(clippy::unwrap_used)]
pub fn direct_message(sender: &Keys, recipient: &PublicKey, secs: i64) -> Event {
    EventBuilder::new(Kind::EncryptedDirectMessage, "ciphertext?iv=abc")
        .tag(Tag::public_key(*recipient))
        .custom_created_at(timestamp(secs))
        .sign_with_keys(sender)
        .unwrap()
}

/// A signed kind-0 profile event.
#[allow(clippy::unwrap_used)]
pub fn metadata_event(author: &Keys, secs: i64, content: &serde_json::Value) -> Event {
    EventBuilder::new(Kind::Metadata, content.to_string())
        .custom_created_at(timestamp(secs))
        .sign_with_keys(author)
        .unwrap()
}
