//! Per-user relay subscriptions.
//!
//! Each registered user owns exactly one live event stream over their relay
//! set. Streams that close are reopened after a fixed delay from the latest
//! watermark until the user is unsubscribed.

pub mod config;
pub mod error;
pub mod manager;
pub mod registry;


pub use config::SubscriptionConfig;
pub use error::SubscriptionError;
pub use manager::{EventHandler, SubscriptionManager};
pub use registry::{SubscriptionHandle, SubscriptionRegistry, SubscriptionState};
