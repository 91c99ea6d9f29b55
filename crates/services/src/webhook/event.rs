//! Typed webhook events.
//!
//! Accepts LiveKit's camelCase payloads (`createdAt`, `egressInfo`,
//! `numParticipants`, string encoded integers) as well as the plain
//! snake_case form. Everything is validated here so handlers only ever see
//! well-formed events.

use bson::DateTime;
use classmeet_db::time;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::MeetingError;
use crate::livekit::lenient_i64;

// ---- Raw payload ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default, alias = "createdAt", deserialize_with = "lenient_i64")]
    created_at: i64,
    #[serde(default)]
    room: Option<RawRoom>,
    #[serde(default)]
    participant: Option<RawParticipant>,
    #[serde(default, alias = "egressInfo")]
    egress: Option<RawEgress>,
    #[serde(default)]
    track: Option<RawTrack>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRoom {
    name: String,
    #[serde(alias = "numParticipants")]
    num_participants: Option<u32>,
    #[serde(alias = "durationSeconds")]
    duration_seconds: Option<i64>,
    #[serde(alias = "creationTime", deserialize_with = "lenient_i64")]
    creation_time: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawParticipant {
    identity: String,
    name: Option<String>,
    #[serde(alias = "joinedAt", deserialize_with = "lenient_i64")]
    joined_at: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEgress {
    #[serde(alias = "egressId")]
    egress_id: String,
    #[serde(alias = "roomName")]
    room_name: Option<String>,
    file: Option<RawFile>,
    #[serde(alias = "fileResults")]
    file_results: Vec<RawFile>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFile {
    #[serde(alias = "location")]
    download_url: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    size: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTrack {
    sid: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    source: Option<String>,
}

// ---- Typed event ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    RoomStarted,
    RoomFinished {
        duration_secs: Option<i64>,
        room_created_at: Option<DateTime>,
    },
    ParticipantJoined {
        identity: String,
        name: Option<String>,
        joined_at: Option<DateTime>,
        num_participants: Option<u32>,
    },
    ParticipantLeft {
        identity: String,
        num_participants: Option<u32>,
    },
    RecordingStarted {
        egress_id: String,
    },
    RecordingFinished {
        egress_id: String,
        download_url: Option<String>,
        size_bytes: Option<i64>,
    },
    TrackPublished {
        identity: String,
        track_sid: String,
        track: TrackKind,
    },
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    /// Event name as delivered.
    pub event_type: String,
    pub room_name: String,
    pub identity: Option<String>,
    /// Server timestamp, or receipt time when the payload has none.
    pub occurred_at: DateTime,
    /// Hex sha256 idempotency key.
    pub key: String,
    pub kind: EventKind,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, MeetingError> {
        let raw: RawEvent = serde_json::from_slice(body)
            .map_err(|e| MeetingError::MalformedEvent(e.to_string()))?;
        let event_type = raw.event.trim().to_string();
        if event_type.is_empty() {
            return Err(malformed("missing event type"));
        }

        let room_name = raw
            .room
            .as_ref()
            .map(|r| r.name.clone())
            .filter(|n| !n.is_empty())
            .or_else(|| raw.egress.as_ref().and_then(|e| e.room_name.clone()))
            .unwrap_or_default();
        let identity = raw
            .participant
            .as_ref()
            .map(|p| p.identity.clone())
            .filter(|i| !i.is_empty());

        let kind = match event_type.as_str() {
            "room_started" => EventKind::RoomStarted,
            "room_finished" => {
                let room = raw.room.as_ref();
                EventKind::RoomFinished {
                    duration_secs: room.and_then(|r| r.duration_seconds),
                    room_created_at: room
                        .map(|r| r.creation_time)
                        .filter(|t| *t > 0)
                        .map(time::from_unix_seconds),
                }
            }
            "participant_joined" => EventKind::ParticipantJoined {
                identity: identity.clone().ok_or_else(|| malformed("missing participant identity"))?,
                name: raw.participant.as_ref().and_then(|p| p.name.clone()),
                joined_at: raw
                    .participant
                    .as_ref()
                    .map(|p| p.joined_at)
                    .filter(|t| *t > 0)
                    .map(time::from_unix_seconds),
                num_participants: raw.room.as_ref().and_then(|r| r.num_participants),
            },
            "participant_left" => EventKind::ParticipantLeft {
                identity: identity.clone().ok_or_else(|| malformed("missing participant identity"))?,
                num_participants: raw.room.as_ref().and_then(|r| r.num_participants),
            },
            "recording_started" | "egress_started" => EventKind::RecordingStarted {
                egress_id: egress_id(&raw)?,
            },
            "recording_finished" | "egress_ended" => {
                let file = raw.egress.as_ref().and_then(|e| {
                    e.file
                        .as_ref()
                        .or_else(|| e.file_results.first())
                });
                EventKind::RecordingFinished {
                    egress_id: egress_id(&raw)?,
                    download_url: file.and_then(|f| f.download_url.clone()),
                    size_bytes: file.map(|f| f.size).filter(|s| *s > 0),
                }
            }
            "track_published" => {
                let track = raw
                    .track
                    .as_ref()
                    .filter(|t| !t.sid.is_empty())
                    .ok_or_else(|| malformed("missing track"))?;
                EventKind::TrackPublished {
                    identity: identity.clone().ok_or_else(|| malformed("missing participant identity"))?,
                    track_sid: track.sid.clone(),
                    track: track_kind(track),
                }
            }
            _ => EventKind::Unsupported,
        };

        if kind != EventKind::Unsupported && room_name.is_empty() {
            return Err(malformed("missing room name"));
        }

        let occurred_at = if raw.created_at > 0 {
            time::from_unix_seconds(raw.created_at)
        } else {
            DateTime::now()
        };

        // Prefer the server timestamp, then the delivery id, then the body.
        let discriminator = if raw.created_at > 0 {
            raw.created_at.to_string()
        } else if let Some(id) = raw.id.as_deref().filter(|id| !id.is_empty()) {
            id.to_string()
        } else {
            hex::encode(Sha256::digest(body))
        };
        let key = idempotency_key(
            &event_type,
            &room_name,
            identity.as_deref().unwrap_or_default(),
            &discriminator,
        );

        Ok(Self {
            event_type,
            room_name,
            identity,
            occurred_at,
            key,
            kind,
        })
    }
}

/// `sha256(event_type | room_name | identity | timestamp)`, hex encoded.
pub fn idempotency_key(event_type: &str, room_name: &str, identity: &str, timestamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{event_type}|{room_name}|{identity}|{timestamp}"));
    hex::encode(hasher.finalize())
}

fn egress_id(raw: &RawEvent) -> Result<String, MeetingError> {
    raw.egress
        .as_ref()
        .map(|e| e.egress_id.clone())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed("missing egress id"))
}

fn track_kind(track: &RawTrack) -> TrackKind {
    let kind = track.kind.as_deref().unwrap_or_default().to_ascii_uppercase();
    let source = track.source.as_deref().unwrap_or_default().to_ascii_uppercase();
    match (kind.as_str(), source.as_str()) {
        ("AUDIO", _) | (_, "MICROPHONE") => TrackKind::Audio,
        ("VIDEO", "SCREEN_SHARE") => TrackKind::Other,
        ("VIDEO", _) | (_, "CAMERA") => TrackKind::Video,
        _ => TrackKind::Other,
    }
}

fn malformed(reason: &str) -> MeetingError {
    MeetingError::MalformedEvent(reason.to_string())
}
