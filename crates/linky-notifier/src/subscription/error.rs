//! Subscription manager error types.

/// Errors returned by [`SubscriptionManager::subscribe`](super::SubscriptionManager::subscribe).
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// The user identifier does not decode to a public key. Not retried.
    #[error("Invalid identifier {npub}: {reason}")]
    InvalidIdentifier { npub: String, reason: String },

    /// The manager has been closed.
    #[error("Subscription manager is closed")]
    Closed,
}
