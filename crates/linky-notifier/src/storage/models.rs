//! Data models for notifier storage.

use serde::{Deserialize, Serialize};

use linky_core::db::{DatabaseError, unix_timestamp};

/// Web Push subscription as produced by the browser's `PushManager`.
///
/// Opaque to the subscription core; only the push client reads the keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default)]
    pub expiration_time: Option<i64>,
    pub keys: PushKeys,
}

/// Client key material for RFC 8291 message encryption (base64url).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A registered user: where to push, which relays to watch, and the
/// watermark below which events are considered already handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub npub: String,
    pub push: PushSubscription,
    pub relays: Vec<String>,
    /// Unix seconds; never decreases.
    pub last_check: i64,
    /// Unix seconds of the last write.
    pub updated_at: i64,
}

impl SubscriptionRecord {
    /// A fresh registration whose watermark starts now.
    pub fn new(npub: impl Into<String>, push: PushSubscription, relays: Vec<String>) -> Self {
        let now = unix_timestamp();
        Self {
            npub: npub.into(),
            push,
            relays,
            last_check: now,
            updated_at: now,
        }
    }
}

/// Raw row of the `subscriptions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(super) struct SubscriptionRow {
    pub npub: String,
    pub subscription: String,
    pub relays: String,
    pub last_check: i64,
    pub updated_at: i64,
}

impl TryFrom<SubscriptionRow> for SubscriptionRecord {
    type Error = DatabaseError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let push = serde_json::from_str(&row.subscription).map_err(|e| {
            DatabaseError::Corrupt(format!("subscription for {}: {e}", row.npub))
        })?;
        let relays = serde_json::from_str(&row.relays)
            .map_err(|e| DatabaseError::Corrupt(format!("relays for {}: {e}", row.npub)))?;
        Ok(Self {
            npub: row.npub,
            push,
            relays,
            last_check: row.last_check,
            updated_at: row.updated_at,
        })
    }
}
