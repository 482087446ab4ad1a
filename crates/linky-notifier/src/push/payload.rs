//! Notification payload shown by the client's service worker.

use serde::Serialize;

/// Generic body text; message content is encrypted end-to-end and never
/// visible to the notifier.
pub const DIRECT_MESSAGE_BODY: &str = "New message";

/// Notification type tag for direct messages.
pub const DIRECT_MESSAGE_TYPE: &str = "dm";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub data: NotificationData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationData {
    #[serde(rename = "type")]
    pub kind: String,
    /// Sender npub.
    pub sender: String,
    /// Sender npub under the key the web client uses to open the chat.
    #[serde(rename = "contactNpub")]
    pub contact_npub: String,
}

impl NotificationPayload {
    /// Payload announcing a direct message from `sender_npub`, titled with
    /// the sender's display label.
    pub fn direct_message(label: impl Into<String>, sender_npub: impl Into<String>) -> Self {
        let sender = sender_npub.into();
        Self {
            title: label.into(),
            body: DIRECT_MESSAGE_BODY.to_string(),
            data: NotificationData {
                kind: DIRECT_MESSAGE_TYPE.to_string(),
                contact_npub: sender.clone(),
                sender,
            },
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
