//! Nostr helpers shared by the notifier.
//!
//! Wire types come from the `nostr` crate; this module only adds the
//! identifiers and filters Linky works with.

pub use nostr::{Event, Filter, Kind, Metadata, PublicKey, Timestamp};

use nostr::{FromBech32, ToBech32};

use crate::error::{Error, Result};

/// Kinds that signal an incoming direct message: NIP-04 encrypted DMs and
/// NIP-59 gift wraps (NIP-17).
pub const DIRECT_MESSAGE_KINDS: [Kind; 2] = [Kind::EncryptedDirectMessage, Kind::GiftWrap];

/// Decode a human-readable `npub1...` identifier. Surrounding whitespace is
/// ignored.
pub fn decode_npub(npub: &str) -> Result<PublicKey> {
    PublicKey::from_bech32(npub.trim()).map_err(|e| Error::InvalidKey(e.to_string()))
}

/// Bech32 `npub` form of `key`, falling back to hex.
pub fn encode_npub(key: &PublicKey) -> String {
    key.to_bech32().unwrap_or_else(|_| key.to_hex())
}

/// Convert a watermark in unix seconds to a Nostr timestamp. Negative
/// values clamp to the epoch.
pub fn timestamp(secs: i64) -> Timestamp {
    Timestamp::from(u64::try_from(secs).unwrap_or_default())
}

/// Direct messages addressed to `recipient` created at or after `since`.
pub fn direct_message_filter(recipient: &PublicKey, since: i64) -> Filter {
    Filter::new()
        .kinds(DIRECT_MESSAGE_KINDS)
        .pubkey(*recipient)
        .since(timestamp(since))
}

/// The latest profile metadata event published by `author`.
pub fn metadata_filter(author: &PublicKey) -> Filter {
    Filter::new().author(*author).kind(Kind::Metadata).limit(1)
}

/// Parse the JSON content of a kind-0 event.
pub fn parse_metadata(event: &Event) -> Result<Metadata> {
    Ok(serde_json::from_str(&event.content)?)
}

/// Preferred human-readable label: display name, then name. Blank values
/// are skipped.
pub fn profile_label(metadata: &Metadata) -> Option<&str> {
    [metadata.display_name.as_deref(), metadata.name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
}
