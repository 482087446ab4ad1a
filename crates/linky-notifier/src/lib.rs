//! Linky Notifier Library
//!
//! Core functionality for the Linky notification relay:
//! - `SQLite` storage for push subscription records
//! - Nostr relay transport (a `nostr-sdk` relay pool)
//! - Per-user subscription manager with reconnect and watermark tracking
//! - Web Push delivery (RFC 8291 encryption, VAPID)
//! - Notification dispatch and the HTTP registration API

pub mod dispatch;
pub mod push;
pub mod server;
pub mod service;
pub mod storage;
pub mod subscription;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_helpers;
