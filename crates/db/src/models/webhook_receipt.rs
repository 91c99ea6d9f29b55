use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// Marker that a webhook delivery was processed. Expires via a TTL index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookReceipt {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub key: String,
    pub event_type: String,
    pub room_name: String,
    pub received_at: DateTime,
}

impl WebhookReceipt {
    pub const COLLECTION: &'static str = "webhook_receipts";
    pub const RETENTION_SECS: u64 = 7 * 24 * 3600;

    pub fn new(key: &str, event_type: &str, room_name: &str) -> Self {
        Self {
            id: None,
            key: key.to_string(),
            event_type: event_type.to_string(),
            room_name: room_name.to_string(),
            received_at: DateTime::now(),
        }
    }
}
