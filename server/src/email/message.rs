use chrono::{DateTime, Utc};
use lib_email_clients::graph::types::GraphMessage;
use serde::Serialize;

const NO_SUBJECT: &str = "(No Subject)";
const UNKNOWN_SENDER: &str = "unknown@example.com";

/// A mail item as the reconciliation cycle sees it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Provider-local id, used for mutation calls only
    pub id: String,
    /// Globally stable id, the only key trusted for deduplication
    pub internet_message_id: Option<String>,
    pub subject: String,
    pub body_preview: String,
    pub sender_address: String,
    pub received_at: Option<DateTime<Utc>>,
}

impl Message {
    /// The deduplication key, if the message carries a usable one
    pub fn stable_id(&self) -> Option<&str> {
        self.internet_message_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Whether this message is strictly newer than `watermark`.
    /// Messages without a received time are never considered newer.
    pub fn is_newer_than(&self, watermark: DateTime<Utc>) -> bool {
        self.received_at.is_some_and(|received| received > watermark)
    }
}

impl From<GraphMessage> for Message {
    fn from(msg: GraphMessage) -> Self {
        let sender_address = msg.sender_address().unwrap_or(UNKNOWN_SENDER).to_string();
        Self {
            id: msg.id,
            internet_message_id: msg.internet_message_id,
            subject: msg.subject.unwrap_or_else(|| NO_SUBJECT.to_string()),
            body_preview: msg.body_preview.unwrap_or_default(),
            sender_address,
            received_at: msg.received_date_time,
        }
    }
}
