//! Conferencing service integration.
//!
//! Everything the engine needs from the real-time video service goes through
//! [`ConferencingClient`]. [`client::LiveKitClient`] talks to a LiveKit
//! compatible server; [`mock::MockConferencingClient`] keeps rooms in memory.

pub mod client;
pub mod mock;
pub mod token;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use client::LiveKitClient;
pub use token::VideoGrants;

#[derive(Debug, Error)]
pub enum ConferencingError {
    #[error("Conferencing service unavailable: {0}")]
    Unavailable(String),
    #[error("Room not found: {0}")]
    NotFound(String),
    #[error("Conferencing service rejected the request: {0}")]
    Rejected(String),
    #[error("Token signing failed: {0}")]
    Token(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomOptions {
    pub name: String,
    pub empty_timeout_secs: u32,
    pub max_participants: u32,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomInfo {
    pub sid: String,
    pub name: String,
    pub num_participants: u32,
    pub creation_time: i64,
    pub active_recording: bool,
    pub metadata: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantInfo {
    pub sid: String,
    pub identity: String,
    pub name: String,
    pub joined_at: i64,
    pub is_publisher: bool,
}

/// Everything needed to mint a participant token.
#[derive(Debug, Clone)]
pub struct AccessTokenRequest {
    pub identity: String,
    pub name: String,
    pub metadata: String,
    pub grants: VideoGrants,
    pub ttl_secs: u64,
}

#[async_trait]
pub trait ConferencingClient: Send + Sync {
    /// Creates the room, or returns it unchanged if it already exists.
    async fn create_room(&self, options: &RoomOptions) -> Result<RoomInfo, ConferencingError>;

    /// `Ok(None)` when the service has no room by that name.
    async fn get_room_info(&self, room_name: &str) -> Result<Option<RoomInfo>, ConferencingError>;

    async fn list_participants(
        &self,
        room_name: &str,
    ) -> Result<Vec<ParticipantInfo>, ConferencingError>;

    async fn mute_track(
        &self,
        room_name: &str,
        identity: &str,
        track_sid: &str,
        muted: bool,
    ) -> Result<(), ConferencingError>;

    /// Removing a room that does not exist is not an error.
    async fn delete_room(&self, room_name: &str) -> Result<(), ConferencingError>;

    fn issue_access_token(&self, request: &AccessTokenRequest) -> Result<String, ConferencingError>;

    /// URL participants connect to.
    fn server_url(&self) -> &str;
}

/// Protobuf JSON encodes 64-bit integers as strings; accept both forms.
pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Ok(0),
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| D::Error::custom("integer out of range")),
        serde_json::Value::String(s) if s.is_empty() => Ok(0),
        serde_json::Value::String(s) => s.parse().map_err(D::Error::custom),
        other => Err(D::Error::custom(format!("expected integer, got {other}"))),
    }
}
