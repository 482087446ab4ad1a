//! Linky Core Library
//!
//! Shared functionality for the Linky notification relay:
//! - Nostr identifiers (NIP-19 `npub`) and subscription filters
//! - Relay list normalisation and default relay substitution
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Tracing initialisation
//! - Common error types

pub mod db;
pub mod error;
pub mod nostr;
pub mod relays;
pub mod tracing_init;

pub use error::{Error, Result};
pub use self::nostr::{Event, Filter, PublicKey};
