use std::time::Duration;

use async_trait::async_trait;
use classmeet_config::LiveKitSettings;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    AccessTokenRequest, ConferencingClient, ConferencingError, ParticipantInfo, RoomInfo,
    RoomOptions, lenient_i64, token,
};

// ---- Twirp wire types ----------------------------------------------------

#[derive(Debug, Serialize)]
struct CreateRoomRequest<'a> {
    name: &'a str,
    empty_timeout: u32,
    max_participants: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ListRoomsRequest<'a> {
    names: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct RoomRequest<'a> {
    room: &'a str,
}

#[derive(Debug, Serialize)]
struct MuteTrackRequest<'a> {
    room: &'a str,
    identity: &'a str,
    track_sid: &'a str,
    muted: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireRoom {
    sid: String,
    name: String,
    #[serde(alias = "numParticipants")]
    num_participants: u32,
    #[serde(alias = "creationTime", deserialize_with = "lenient_i64")]
    creation_time: i64,
    #[serde(alias = "activeRecording")]
    active_recording: bool,
    metadata: String,
}

impl From<WireRoom> for RoomInfo {
    fn from(room: WireRoom) -> Self {
        Self {
            sid: room.sid,
            name: room.name,
            num_participants: room.num_participants,
            creation_time: room.creation_time,
            active_recording: room.active_recording,
            metadata: room.metadata,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListRoomsResponse {
    rooms: Vec<WireRoom>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireParticipant {
    sid: String,
    identity: String,
    name: String,
    #[serde(alias = "joinedAt", deserialize_with = "lenient_i64")]
    joined_at: i64,
    #[serde(alias = "isPublisher")]
    is_publisher: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListParticipantsResponse {
    participants: Vec<WireParticipant>,
}

#[derive(Debug, Default, Deserialize)]
struct Empty {}

// ---- Client --------------------------------------------------------------

pub struct LiveKitClient {
    settings: LiveKitSettings,
    http: reqwest::Client,
}

impl LiveKitClient {
    pub fn new(settings: &LiveKitSettings) -> Result<Self, ConferencingError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| ConferencingError::Unavailable(e.to_string()))?;
        Ok(Self {
            settings: settings.clone(),
            http,
        })
    }

    async fn twirp<Req, Resp>(
        &self,
        method: &str,
        room: Option<&str>,
        body: &Req,
    ) -> Result<Resp, ConferencingError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let token = token::server_token(&self.settings.api_key, &self.settings.api_secret, room)?;
        let url = format!(
            "{}/twirp/livekit.RoomService/{}",
            self.settings.api_url.trim_end_matches('/'),
            method
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!(method, error = %e, "Conferencing API call failed");
                ConferencingError::Unavailable(e.to_string())
            })?;

        let status = resp.status();
        if status.is_success() {
            debug!(method, "Conferencing API call succeeded");
            return resp
                .json::<Resp>()
                .await
                .map_err(|e| ConferencingError::Unavailable(format!("invalid response: {e}")));
        }

        let text = resp.text().await.unwrap_or_default();
        warn!(method, %status, body = %text, "Conferencing API returned an error");
        Err(match status {
            StatusCode::NOT_FOUND => ConferencingError::NotFound(text),
            s if s.is_server_error() => ConferencingError::Unavailable(format!("{s}: {text}")),
            s => ConferencingError::Rejected(format!("{s}: {text}")),
        })
    }
}

#[async_trait]
impl ConferencingClient for LiveKitClient {
    async fn create_room(&self, options: &RoomOptions) -> Result<RoomInfo, ConferencingError> {
        let room: WireRoom = self
            .twirp(
                "CreateRoom",
                None,
                &CreateRoomRequest {
                    name: &options.name,
                    empty_timeout: options.empty_timeout_secs,
                    max_participants: options.max_participants,
                    metadata: options.metadata.as_deref(),
                },
            )
            .await?;
        Ok(room.into())
    }

    async fn get_room_info(&self, room_name: &str) -> Result<Option<RoomInfo>, ConferencingError> {
        let resp: ListRoomsResponse = self
            .twirp(
                "ListRooms",
                None,
                &ListRoomsRequest {
                    names: vec![room_name],
                },
            )
            .await?;
        Ok(resp
            .rooms
            .into_iter()
            .find(|r| r.name == room_name)
            .map(RoomInfo::from))
    }

    async fn list_participants(
        &self,
        room_name: &str,
    ) -> Result<Vec<ParticipantInfo>, ConferencingError> {
        let resp: ListParticipantsResponse = self
            .twirp(
                "ListParticipants",
                Some(room_name),
                &RoomRequest { room: room_name },
            )
            .await?;
        Ok(resp
            .participants
            .into_iter()
            .map(|p| ParticipantInfo {
                sid: p.sid,
                identity: p.identity,
                name: p.name,
                joined_at: p.joined_at,
                is_publisher: p.is_publisher,
            })
            .collect())
    }

    async fn mute_track(
        &self,
        room_name: &str,
        identity: &str,
        track_sid: &str,
        muted: bool,
    ) -> Result<(), ConferencingError> {
        let _: serde_json::Value = self
            .twirp(
                "MutePublishedTrack",
                Some(room_name),
                &MuteTrackRequest {
                    room: room_name,
                    identity,
                    track_sid,
                    muted,
                },
            )
            .await?;
        Ok(())
    }

    async fn delete_room(&self, room_name: &str) -> Result<(), ConferencingError> {
        match self
            .twirp::<_, Empty>("DeleteRoom", Some(room_name), &RoomRequest { room: room_name })
            .await
        {
            Ok(_) | Err(ConferencingError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn issue_access_token(&self, request: &AccessTokenRequest) -> Result<String, ConferencingError> {
        token::participant_token(&self.settings.api_key, &self.settings.api_secret, request)
    }

    fn server_url(&self) -> &str {
        &self.settings.server_url
    }
}
