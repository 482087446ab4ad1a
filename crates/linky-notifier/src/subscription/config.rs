//! Subscription manager configuration.

use std::time::Duration;

use linky_core::relays::default_relays;

/// Runtime knobs of the subscription manager.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Fixed delay between a stream closing and the reconnect attempt.
    pub reconnect_delay: Duration,

    /// Upper bound for the one-shot sender metadata lookup.
    pub metadata_timeout: Duration,

    /// Relays used when a user has none of their own.
    pub default_relays: Vec<String>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            metadata_timeout: Duration::from_secs(2),
            default_relays: default_relays(),
        }
    }
}
