//! In-memory registry of active subscription handles.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a user's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubscriptionState {
    /// Not subscribed.
    Idle = 0,
    /// A stream is open.
    Active = 1,
    /// The stream closed; a reopen is pending.
    Reconnecting = 2,
}

impl SubscriptionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Active,
            2 => Self::Reconnecting,
            _ => Self::Idle,
        }
    }
}

/// Live state of one user's subscription.
///
/// Owned by the registry and the user's stream task. Cancelling the handle
/// stops the task, which drops (and thereby closes) its stream.
#[derive(Debug)]
pub struct SubscriptionHandle {
    npub: String,
    relays: Vec<String>,
    cancel: CancellationToken,
    watermark: AtomicI64,
    state: AtomicU8,
}

impl SubscriptionHandle {
    pub fn new(
        npub: impl Into<String>,
        relays: Vec<String>,
        watermark: i64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            npub: npub.into(),
            relays,
            cancel,
            watermark: AtomicI64::new(watermark),
            state: AtomicU8::new(SubscriptionState::Idle as u8),
        }
    }

    pub fn npub(&self) -> &str {
        &self.npub
    }

    /// Effective relay set, fixed for the handle's lifetime.
    pub fn relays(&self) -> &[String] {
        &self.relays
    }

    /// `since` bound for the next stream opened for this user.
    pub fn watermark(&self) -> i64 {
        self.watermark.load(Ordering::Acquire)
    }

    /// Raise the watermark to `timestamp`; lower values are ignored.
    /// Returns the resulting watermark.
    pub fn advance_watermark(&self, timestamp: i64) -> i64 {
        self.watermark
            .fetch_max(timestamp, Ordering::AcqRel)
            .max(timestamp)
    }

    pub fn state(&self) -> SubscriptionState {
        SubscriptionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SubscriptionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the handle is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// Thread-safe map from user identifier to its subscription handle.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    handles: Arc<RwLock<HashMap<String, Arc<SubscriptionHandle>>>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `handle` under its user, returning the handle it replaced.
    pub async fn put(&self, handle: Arc<SubscriptionHandle>) -> Option<Arc<SubscriptionHandle>> {
        self.handles
            .write()
            .await
            .insert(handle.npub().to_string(), handle)
    }

    pub async fn get(&self, npub: &str) -> Option<Arc<SubscriptionHandle>> {
        self.handles.read().await.get(npub).cloned()
    }

    pub async fn remove(&self, npub: &str) -> Option<Arc<SubscriptionHandle>> {
        self.handles.write().await.remove(npub)
    }

    /// Whether `handle` is still the registered handle for its user.
    pub async fn is_current(&self, handle: &Arc<SubscriptionHandle>) -> bool {
        self.handles
            .read()
            .await
            .get(handle.npub())
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    pub async fn list(&self) -> Vec<Arc<SubscriptionHandle>> {
        self.handles.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.handles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.read().await.is_empty()
    }

    /// Remove and return every handle.
    pub async fn drain(&self) -> Vec<Arc<SubscriptionHandle>> {
        self.handles.write().await.drain().map(|(_, h)| h).collect()
    }
}
