use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

use super::{AccessTokenRequest, ConferencingError};

/// LiveKit video grant. Field names follow the server's JSON claim format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoGrants {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub room: String,
    pub room_join: bool,
    pub room_create: bool,
    pub room_list: bool,
    pub room_admin: bool,
    pub room_record: bool,
    pub can_publish: bool,
    pub can_subscribe: bool,
    pub can_publish_data: bool,
}

impl VideoGrants {
    pub fn participant(room: &str, can_publish: bool, can_subscribe: bool) -> Self {
        Self {
            room: room.to_string(),
            room_join: true,
            can_publish,
            can_subscribe,
            can_publish_data: true,
            ..Default::default()
        }
    }

    /// Moderation rights granted to teachers and administrators.
    pub fn with_moderation(mut self) -> Self {
        self.room_admin = true;
        self.room_record = true;
        self
    }

    pub fn server(room: Option<&str>) -> Self {
        Self {
            room: room.unwrap_or_default().to_string(),
            room_create: true,
            room_list: true,
            room_admin: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata: String,
    pub nbf: i64,
    pub exp: i64,
    pub video: VideoGrants,
}

pub fn participant_token(
    api_key: &str,
    api_secret: &str,
    request: &AccessTokenRequest,
) -> Result<String, ConferencingError> {
    let now = Utc::now().timestamp();
    let claims = AccessTokenClaims {
        iss: api_key.to_string(),
        sub: request.identity.clone(),
        name: request.name.clone(),
        metadata: request.metadata.clone(),
        nbf: now,
        exp: now + request.ttl_secs as i64,
        video: request.grants.clone(),
    };
    sign(api_secret, &claims)
}

/// Short-lived token the backend uses for room management calls.
pub fn server_token(
    api_key: &str,
    api_secret: &str,
    room: Option<&str>,
) -> Result<String, ConferencingError> {
    let now = Utc::now().timestamp();
    let claims = AccessTokenClaims {
        iss: api_key.to_string(),
        sub: String::new(),
        name: String::new(),
        metadata: String::new(),
        nbf: now,
        exp: now + 600,
        video: VideoGrants::server(room),
    };
    sign(api_secret, &claims)
}

fn sign(api_secret: &str, claims: &AccessTokenClaims) -> Result<String, ConferencingError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(api_secret.as_bytes()),
    )
    .map_err(|e| ConferencingError::Token(e.to_string()))
}
