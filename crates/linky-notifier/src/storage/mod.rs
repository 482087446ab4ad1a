//! SQLite storage for the Linky notifier.
//!
//! Persists one push subscription record per user (npub), including the
//! user's relay list and the `last_check` watermark.

mod models;
mod queries;


pub use linky_core::db::DatabaseError;
pub use models::{PushKeys, PushSubscription, SubscriptionRecord};

linky_core::define_database!(NotifierDatabase, "Notifier database migrations complete");
