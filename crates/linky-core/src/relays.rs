//! Relay list resolution.
//!
//! Users may register up to [`MAX_USER_RELAYS`] relays of their own. Input is
//! untrusted: anything that is not a `ws://`/`wss://` URI is dropped without
//! error. When nothing usable remains, subscriptions fall back to
//! [`DEFAULT_RELAYS`].

use serde_json::Value;

/// Maximum number of relays kept per user.
pub const MAX_USER_RELAYS: usize = 3;

/// Relays queried when a user did not register any usable relay.
pub const DEFAULT_RELAYS: [&str; 3] = [
    "wss://nos.lol",
    "wss://relay.damus.io",
    "wss://relay.nostr.band",
];

/// Whether `candidate` (already trimmed) is an acceptable relay address.
pub fn is_relay_uri(candidate: &str) -> bool {
    candidate.starts_with("wss://") || candidate.starts_with("ws://")
}

/// Trim, validate and cap a list of candidate relay addresses.
///
/// Order is preserved; at most [`MAX_USER_RELAYS`] entries are returned.
pub fn normalize_relays<I, S>(candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    candidates
        .into_iter()
        .filter_map(|relay| {
            let relay = relay.as_ref().trim();
            is_relay_uri(relay).then(|| relay.to_string())
        })
        .take(MAX_USER_RELAYS)
        .collect()
}

/// Normalise relays from an arbitrary JSON value as received over HTTP.
///
/// Non-arrays yield an empty list; non-string elements are skipped.
pub fn normalize_relays_json(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| normalize_relays(items.iter().filter_map(Value::as_str)))
        .unwrap_or_default()
}

/// [`DEFAULT_RELAYS`] as owned strings.
pub fn default_relays() -> Vec<String> {
    DEFAULT_RELAYS.iter().map(|r| (*r).to_string()).collect()
}

/// The relay set actually used for a subscription: the user's relays after
/// normalisation, or `defaults` when none of them is usable.
pub fn effective_relays(user_relays: &[String], defaults: &[String]) -> Vec<String> {
    let relays = normalize_relays(user_relays);
    if relays.is_empty() {
        defaults.to_vec()
    } else {
        relays
    }
}
